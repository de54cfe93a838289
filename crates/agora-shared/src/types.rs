use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declares a `Uuid`-backed identifier newtype.
///
/// Every row id in the platform is a v4 UUID; wrapping each one keeps a
/// channel id from being passed where a conversation id is expected.
macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                Uuid::parse_str(s).map(Self)
            }

            pub fn short(&self) -> String {
                self.0.to_string()[..8].to_string()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

uuid_id!(
    /// Identity id, shared by the auth account and its profile row.
    UserId
);
uuid_id!(CommunityId);
uuid_id!(ChannelId);
uuid_id!(MessageId);
uuid_id!(ConversationId);
uuid_id!(DirectMessageId);
uuid_id!(ReactionId);
uuid_id!(NotificationId);
uuid_id!(JobId);
uuid_id!(ResourceId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_display() {
        let id = ChannelId::new();
        assert_eq!(ChannelId::parse(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn serializes_as_bare_uuid() {
        let id = UserId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.0));
    }

    #[test]
    fn short_is_eight_chars() {
        assert_eq!(CommunityId::new().short().len(), 8);
    }
}
