//! Domain models exchanged between the gateway, the state containers and
//! the view layer.
//!
//! Every struct derives `Serialize` and `Deserialize`: change-feed records
//! arrive as JSON and are decoded straight into these types.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::*;

/// Error returned when a stored enum tag is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} tag: {value}")]
pub struct UnknownTag {
    pub kind: &'static str,
    pub value: String,
}

/// Implements `as_str` / `FromStr` for a fieldless enum stored as text.
macro_rules! text_enum {
    ($name:ident, $label:literal { $($variant:ident => $tag:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $tag,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = UnknownTag;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($tag => Ok(Self::$variant),)+
                    other => Err(UnknownTag { kind: $label, value: other.to_string() }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// An authenticated session issued by the auth capability.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    /// Opaque bearer token.
    pub access_token: String,
    pub user_id: UserId,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Public profile of a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub id: UserId,
    pub email: String,
    pub username: String,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub website: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_seen: Option<DateTime<Utc>>,
}

impl Profile {
    /// Shallow-merge the fields present in `patch`.
    pub fn apply(&mut self, patch: &ProfilePatch) {
        if let Some(username) = &patch.username {
            self.username = username.clone();
        }
        if let Some(full_name) = &patch.full_name {
            self.full_name = Some(full_name.clone());
        }
        if let Some(avatar_url) = &patch.avatar_url {
            self.avatar_url = Some(avatar_url.clone());
        }
        if let Some(bio) = &patch.bio {
            self.bio = Some(bio.clone());
        }
        if let Some(website) = &patch.website {
            self.website = Some(website.clone());
        }
    }

    pub fn summary(&self) -> AuthorSummary {
        AuthorSummary {
            id: self.id,
            username: self.username.clone(),
            avatar_url: self.avatar_url.clone(),
        }
    }
}

/// Fields written when a profile row is first created at sign-up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewProfile {
    pub id: UserId,
    pub email: String,
    pub username: String,
    pub full_name: Option<String>,
}

/// Partial profile update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProfilePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

/// Read-only copy of an author's public fields, attached to rows at fetch
/// time. Never refreshed afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthorSummary {
    pub id: UserId,
    pub username: String,
    pub avatar_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Communities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Community {
    pub id: CommunityId,
    pub name: String,
    pub description: String,
    pub image_url: Option<String>,
    pub created_by: UserId,
    /// Maintained by the backend counter RPCs only.
    pub member_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewCommunity {
    pub name: String,
    pub description: String,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Member,
    Moderator,
    Admin,
}

text_enum!(MemberRole, "member role" {
    Member => "member",
    Moderator => "moderator",
    Admin => "admin",
});

/// A (community, user) membership row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Membership {
    pub community_id: CommunityId,
    pub user_id: UserId,
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,
    /// Member profile, attached when memberships are listed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Profile>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    pub description: Option<String>,
    pub community_id: CommunityId,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewChannel {
    pub name: String,
    pub description: Option<String>,
    pub community_id: CommunityId,
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reaction {
    pub id: ReactionId,
    pub emoji: String,
    pub message_id: Option<MessageId>,
    pub direct_message_id: Option<DirectMessageId>,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

/// A message posted in a community channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub content: String,
    pub channel_id: ChannelId,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Absent on rows delivered by the change feed.
    #[serde(default)]
    pub author: Option<AuthorSummary>,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DirectMessage {
    pub id: DirectMessageId,
    pub content: String,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sender: Option<AuthorSummary>,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    pub id: ConversationId,
    pub created_at: DateTime<Utc>,
    pub participants: Vec<Profile>,
    pub last_message: Option<DirectMessage>,
}

impl Conversation {
    pub fn has_participant(&self, user: UserId) -> bool {
        self.participants.iter().any(|p| p.id == user)
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Message,
    Mention,
    Reaction,
    CommunityInvite,
    JobPost,
}

text_enum!(NotificationKind, "notification kind" {
    Message => "message",
    Mention => "mention",
    Reaction => "reaction",
    CommunityInvite => "community_invite",
    JobPost => "job_post",
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Message,
    DirectMessage,
    Community,
    JobPost,
}

text_enum!(ReferenceKind, "reference kind" {
    Message => "message",
    DirectMessage => "direct_message",
    Community => "community",
    JobPost => "job_post",
});

/// Polymorphic pointer from a notification to the row it is about.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationRef {
    pub kind: ReferenceKind,
    pub id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub content: String,
    pub reference: Option<NotificationRef>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewNotification {
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub content: String,
    pub reference: Option<NotificationRef>,
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobPost {
    pub id: JobId,
    pub title: String,
    pub company: String,
    pub location: String,
    pub description: String,
    pub requirements: Option<String>,
    pub salary_range: Option<String>,
    pub application_url: Option<String>,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub author: Option<AuthorSummary>,
}

impl JobPost {
    pub fn apply(&mut self, patch: &JobPatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(company) = &patch.company {
            self.company = company.clone();
        }
        if let Some(location) = &patch.location {
            self.location = location.clone();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(requirements) = &patch.requirements {
            self.requirements = Some(requirements.clone());
        }
        if let Some(salary_range) = &patch.salary_range {
            self.salary_range = Some(salary_range.clone());
        }
        if let Some(application_url) = &patch.application_url {
            self.application_url = Some(application_url.clone());
        }
        if let Some(expires_at) = patch.expires_at {
            self.expires_at = Some(expires_at);
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewJob {
    pub title: String,
    pub company: String,
    pub location: String,
    pub description: String,
    pub requirements: Option<String>,
    pub salary_range: Option<String>,
    pub application_url: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirements: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salary_range: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Article,
    Video,
    Tool,
    Other,
}

text_enum!(ResourceKind, "resource kind" {
    Article => "article",
    Video => "video",
    Tool => "tool",
    Other => "other",
});

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Resource {
    pub id: ResourceId,
    pub title: String,
    pub description: String,
    pub url: String,
    #[serde(rename = "type")]
    pub kind: ResourceKind,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub author: Option<AuthorSummary>,
}

impl Resource {
    pub fn apply(&mut self, patch: &ResourcePatch) {
        if let Some(title) = &patch.title {
            self.title = title.clone();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(url) = &patch.url {
            self.url = url.clone();
        }
        if let Some(kind) = patch.kind {
            self.kind = kind;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewResource {
    pub title: String,
    pub description: String,
    pub url: String,
    #[serde(rename = "type")]
    pub kind: ResourceKind,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourcePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<ResourceKind>,
}
