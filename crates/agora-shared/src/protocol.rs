//! Change-feed protocol.
//!
//! A [`Topic`] names one (collection, equality filter) pair. Every committed
//! insert matching a topic is delivered to its subscribers as a
//! [`ChangeEvent`] carrying the raw row as JSON, without any denormalized
//! join fields.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::constants::{COLLECTION_DIRECT_MESSAGES, COLLECTION_MESSAGES, COLLECTION_NOTIFICATIONS};
use crate::types::{ChannelId, ConversationId, UserId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "collection", content = "key", rename_all = "snake_case")]
pub enum Topic {
    /// `messages` where `channel_id = key`
    ChannelMessages(ChannelId),
    /// `direct_messages` where `conversation_id = key`
    ConversationMessages(ConversationId),
    /// `notifications` where `user_id = key`
    UserNotifications(UserId),
}

impl Topic {
    pub fn collection(&self) -> &'static str {
        match self {
            Topic::ChannelMessages(_) => COLLECTION_MESSAGES,
            Topic::ConversationMessages(_) => COLLECTION_DIRECT_MESSAGES,
            Topic::UserNotifications(_) => COLLECTION_NOTIFICATIONS,
        }
    }

    /// Equality filter in `column=eq.value` form.
    pub fn filter(&self) -> String {
        match self {
            Topic::ChannelMessages(id) => format!("channel_id=eq.{id}"),
            Topic::ConversationMessages(id) => format!("conversation_id=eq.{id}"),
            Topic::UserNotifications(id) => format!("user_id=eq.{id}"),
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.collection(), self.filter())
    }
}

/// One committed insert, as pushed by the change feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeEvent {
    pub topic: Topic,
    pub record: serde_json::Value,
    pub committed_at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new<T: Serialize>(topic: Topic, row: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            topic,
            record: serde_json::to_value(row)?,
            committed_at: Utc::now(),
        })
    }

    /// Decode the pushed row into its model type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_display_matches_filter_form() {
        let channel = ChannelId::new();
        let topic = Topic::ChannelMessages(channel);
        assert_eq!(topic.to_string(), format!("messages:channel_id=eq.{channel}"));
        assert_eq!(
            Topic::UserNotifications(UserId::new()).collection(),
            "notifications"
        );
    }
}
