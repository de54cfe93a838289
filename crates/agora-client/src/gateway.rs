//! Boundary capabilities the state containers are written against.
//!
//! [`Gateway`] is the remote data service: auth, the row store and the
//! member counter RPCs. [`ChangeFeed`] is its publish/subscribe side. Both
//! are trait objects so the containers never know which backend they talk
//! to.

use async_trait::async_trait;
use tokio::sync::mpsc;

use agora_shared::*;

/// Auth, row-store and counter capabilities.
///
/// Inserts return the stored row with its denormalized author projection
/// attached. Updates are shallow patches; callers merge the same patch into
/// their local copy after success. Deletes of absent rows succeed.
#[async_trait]
pub trait Gateway: Send + Sync {
    // -- Auth --

    async fn sign_in(&self, email: &str, password: &str) -> GatewayResult<Session>;
    async fn sign_up(&self, email: &str, password: &str) -> GatewayResult<Session>;
    async fn sign_out(&self) -> GatewayResult<()>;
    async fn get_session(&self) -> GatewayResult<Option<Session>>;

    // -- Profiles --

    async fn get_profile(&self, id: UserId) -> GatewayResult<Profile>;
    async fn get_profiles(&self, ids: &[UserId]) -> GatewayResult<Vec<Profile>>;
    async fn find_profiles_by_username(&self, username: &str) -> GatewayResult<Vec<Profile>>;
    async fn insert_profile(&self, profile: &NewProfile) -> GatewayResult<Profile>;
    async fn update_profile(&self, id: UserId, patch: &ProfilePatch) -> GatewayResult<()>;

    // -- Communities and memberships --

    async fn list_communities(&self) -> GatewayResult<Vec<Community>>;
    async fn get_community(&self, id: CommunityId) -> GatewayResult<Community>;
    async fn insert_community(&self, owner: UserId, community: &NewCommunity) -> GatewayResult<Community>;
    async fn increment_member_count(&self, id: CommunityId) -> GatewayResult<()>;
    async fn decrement_member_count(&self, id: CommunityId) -> GatewayResult<()>;

    async fn find_membership(&self, community: CommunityId, user: UserId) -> GatewayResult<Option<Membership>>;
    /// Upsert-on-conflict insert. `true` when a row was actually created.
    async fn insert_membership(&self, community: CommunityId, user: UserId, role: MemberRole) -> GatewayResult<bool>;
    /// `true` when a row was actually removed.
    async fn delete_membership(&self, community: CommunityId, user: UserId) -> GatewayResult<bool>;
    async fn list_members(&self, community: CommunityId) -> GatewayResult<Vec<Membership>>;

    // -- Channels and messages --

    async fn list_channels(&self, community: CommunityId) -> GatewayResult<Vec<Channel>>;
    async fn get_channel(&self, id: ChannelId) -> GatewayResult<Channel>;
    async fn insert_channel(&self, owner: UserId, channel: &NewChannel) -> GatewayResult<Channel>;

    async fn list_messages(&self, channel: ChannelId) -> GatewayResult<Vec<Message>>;
    async fn insert_message(&self, channel: ChannelId, author: UserId, content: &str) -> GatewayResult<Message>;

    // -- Conversations --

    async fn list_conversations(&self, user: UserId) -> GatewayResult<Vec<Conversation>>;
    async fn get_conversation(&self, id: ConversationId) -> GatewayResult<Conversation>;
    async fn find_conversations_between(&self, a: UserId, b: UserId) -> GatewayResult<Vec<Conversation>>;
    /// Create the conversation for the unordered pair `(a, b)` with both
    /// participant rows, or return the one that already exists.
    async fn create_direct_conversation(&self, a: UserId, b: UserId) -> GatewayResult<Conversation>;

    async fn list_direct_messages(&self, conversation: ConversationId) -> GatewayResult<Vec<DirectMessage>>;
    async fn insert_direct_message(
        &self,
        conversation: ConversationId,
        sender: UserId,
        content: &str,
    ) -> GatewayResult<DirectMessage>;

    // -- Notifications --

    async fn list_notifications(&self, user: UserId) -> GatewayResult<Vec<Notification>>;
    async fn mark_notification_read(&self, id: NotificationId) -> GatewayResult<()>;
    async fn mark_all_notifications_read(&self, user: UserId) -> GatewayResult<()>;

    // -- Jobs --

    async fn list_jobs(&self) -> GatewayResult<Vec<JobPost>>;
    async fn get_job(&self, id: JobId) -> GatewayResult<JobPost>;
    async fn insert_job(&self, owner: UserId, job: &NewJob) -> GatewayResult<JobPost>;
    async fn update_job(&self, id: JobId, patch: &JobPatch) -> GatewayResult<()>;
    async fn delete_job(&self, id: JobId) -> GatewayResult<()>;

    // -- Resources --

    async fn list_resources(&self) -> GatewayResult<Vec<Resource>>;
    async fn get_resource(&self, id: ResourceId) -> GatewayResult<Resource>;
    async fn insert_resource(&self, owner: UserId, resource: &NewResource) -> GatewayResult<Resource>;
    async fn update_resource(&self, id: ResourceId, patch: &ResourcePatch) -> GatewayResult<()>;
    async fn delete_resource(&self, id: ResourceId) -> GatewayResult<()>;
}

/// Subscription to committed inserts, keyed by [`Topic`].
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    async fn subscribe(&self, topic: Topic) -> GatewayResult<Subscription>;
}

/// Inbound side of one change-feed subscription.
///
/// Events arrive in commit order. Dropping the subscription or calling
/// [`Subscription::cancel`] ends delivery.
#[derive(Debug)]
pub struct Subscription {
    topic: Topic,
    rx: mpsc::Receiver<ChangeEvent>,
}

impl Subscription {
    pub fn new(topic: Topic, rx: mpsc::Receiver<ChangeEvent>) -> Self {
        Self { topic, rx }
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Next event, or `None` once the subscription is cancelled or the feed
    /// has gone away.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.rx.recv().await
    }

    /// Next buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        self.rx.try_recv().ok()
    }

    /// Stop accepting new events. Events already buffered are still
    /// returned by [`Subscription::recv`].
    pub fn cancel(&mut self) {
        self.rx.close();
    }
}
