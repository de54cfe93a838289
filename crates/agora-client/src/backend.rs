//! Embedded backend: [`Gateway`] and [`ChangeFeed`] over a local SQLite
//! database.
//!
//! Every committed insert into messages, direct messages and notifications
//! is published to the in-process [`FeedBroker`] after the write succeeds.
//! Inserting a direct message also notifies the other participants of the
//! conversation.

use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use agora_shared::constants::DEFAULT_FEED_BUFFER;
use agora_shared::*;
use agora_store::Database;

use crate::config::ClientConfig;
use crate::feed::FeedBroker;
use crate::gateway::{ChangeFeed, Gateway, Subscription};

pub struct LocalBackend {
    db: Mutex<Database>,
    feed: FeedBroker,
    feed_buffer: usize,
}

impl LocalBackend {
    pub fn new(db: Database, feed_buffer: usize) -> Self {
        Self {
            db: Mutex::new(db),
            feed: FeedBroker::new(),
            feed_buffer,
        }
    }

    /// Open the database named by `config`, or the platform default.
    pub fn open(config: &ClientConfig) -> agora_store::Result<Self> {
        let db = match &config.db_path {
            Some(path) => Database::open_at(path)?,
            None => Database::new()?,
        };
        Ok(Self::new(db, config.feed_buffer))
    }

    pub fn in_memory() -> agora_store::Result<Self> {
        Ok(Self::new(Database::open_in_memory()?, DEFAULT_FEED_BUFFER))
    }

    pub fn feed(&self) -> &FeedBroker {
        &self.feed
    }

    /// Insert a notification from outside the client (another service, a
    /// test) and push it to the owner's subscribers.
    pub fn notify(&self, notification: &NewNotification) -> GatewayResult<Notification> {
        let created = self.with_db(|db| db.insert_notification(notification))?;
        self.publish(Topic::UserNotifications(created.user_id), &created);
        Ok(created)
    }

    fn with_db<T>(&self, f: impl FnOnce(&Database) -> agora_store::Result<T>) -> GatewayResult<T> {
        let db = self
            .db
            .lock()
            .map_err(|_| GatewayError::Network("database lock poisoned".into()))?;
        f(&db).map_err(GatewayError::from)
    }

    fn publish<T: Serialize>(&self, topic: Topic, row: &T) {
        match ChangeEvent::new(topic, row) {
            Ok(event) => {
                let delivered = self.feed.publish(event);
                debug!(%topic, delivered, "change event published");
            }
            Err(e) => warn!(%topic, error = %e, "failed to encode change event"),
        }
    }
}

#[async_trait]
impl Gateway for LocalBackend {
    // -- Auth --

    async fn sign_in(&self, email: &str, password: &str) -> GatewayResult<Session> {
        self.with_db(|db| {
            let user = db.verify_credentials(email, password)?;
            db.start_session(user, email)
        })
    }

    /// Accounts are confirmed immediately, so sign-up also signs in.
    async fn sign_up(&self, email: &str, password: &str) -> GatewayResult<Session> {
        self.with_db(|db| {
            let user = db.create_account(email, password)?;
            db.start_session(user, email)
        })
    }

    async fn sign_out(&self) -> GatewayResult<()> {
        self.with_db(|db| db.end_session())
    }

    async fn get_session(&self) -> GatewayResult<Option<Session>> {
        self.with_db(|db| db.active_session())
    }

    // -- Profiles --

    async fn get_profile(&self, id: UserId) -> GatewayResult<Profile> {
        self.with_db(|db| db.get_profile(id))
    }

    async fn get_profiles(&self, ids: &[UserId]) -> GatewayResult<Vec<Profile>> {
        self.with_db(|db| db.get_profiles(ids))
    }

    async fn find_profiles_by_username(&self, username: &str) -> GatewayResult<Vec<Profile>> {
        self.with_db(|db| db.find_profiles_by_username(username))
    }

    async fn insert_profile(&self, profile: &NewProfile) -> GatewayResult<Profile> {
        self.with_db(|db| db.insert_profile(profile))
    }

    async fn update_profile(&self, id: UserId, patch: &ProfilePatch) -> GatewayResult<()> {
        self.with_db(|db| db.update_profile(id, patch))
    }

    // -- Communities and memberships --

    async fn list_communities(&self) -> GatewayResult<Vec<Community>> {
        self.with_db(|db| db.list_communities())
    }

    async fn get_community(&self, id: CommunityId) -> GatewayResult<Community> {
        self.with_db(|db| db.get_community(id))
    }

    async fn insert_community(&self, owner: UserId, community: &NewCommunity) -> GatewayResult<Community> {
        self.with_db(|db| db.create_community(owner, community))
    }

    async fn increment_member_count(&self, id: CommunityId) -> GatewayResult<()> {
        self.with_db(|db| db.increment_member_count(id))
    }

    async fn decrement_member_count(&self, id: CommunityId) -> GatewayResult<()> {
        self.with_db(|db| db.decrement_member_count(id))
    }

    async fn find_membership(&self, community: CommunityId, user: UserId) -> GatewayResult<Option<Membership>> {
        self.with_db(|db| db.find_membership(community, user))
    }

    async fn insert_membership(&self, community: CommunityId, user: UserId, role: MemberRole) -> GatewayResult<bool> {
        self.with_db(|db| db.add_membership(community, user, role))
    }

    async fn delete_membership(&self, community: CommunityId, user: UserId) -> GatewayResult<bool> {
        self.with_db(|db| db.remove_membership(community, user))
    }

    async fn list_members(&self, community: CommunityId) -> GatewayResult<Vec<Membership>> {
        self.with_db(|db| db.list_members(community))
    }

    // -- Channels and messages --

    async fn list_channels(&self, community: CommunityId) -> GatewayResult<Vec<Channel>> {
        self.with_db(|db| db.list_channels(community))
    }

    async fn get_channel(&self, id: ChannelId) -> GatewayResult<Channel> {
        self.with_db(|db| db.get_channel(id))
    }

    async fn insert_channel(&self, owner: UserId, channel: &NewChannel) -> GatewayResult<Channel> {
        self.with_db(|db| db.create_channel(owner, channel))
    }

    async fn list_messages(&self, channel: ChannelId) -> GatewayResult<Vec<Message>> {
        self.with_db(|db| db.list_messages(channel))
    }

    async fn insert_message(&self, channel: ChannelId, author: UserId, content: &str) -> GatewayResult<Message> {
        let message = self.with_db(|db| db.insert_message(channel, author, content))?;

        // Feed records carry the bare row only.
        let record = Message {
            author: None,
            reactions: Vec::new(),
            ..message.clone()
        };
        self.publish(Topic::ChannelMessages(channel), &record);
        Ok(message)
    }

    // -- Conversations --

    async fn list_conversations(&self, user: UserId) -> GatewayResult<Vec<Conversation>> {
        self.with_db(|db| db.list_conversations(user))
    }

    async fn get_conversation(&self, id: ConversationId) -> GatewayResult<Conversation> {
        self.with_db(|db| db.get_conversation(id))
    }

    async fn find_conversations_between(&self, a: UserId, b: UserId) -> GatewayResult<Vec<Conversation>> {
        self.with_db(|db| db.find_conversations_between(a, b))
    }

    async fn create_direct_conversation(&self, a: UserId, b: UserId) -> GatewayResult<Conversation> {
        self.with_db(|db| {
            let id = db.create_direct_conversation(a, b)?;
            db.get_conversation(id)
        })
    }

    async fn list_direct_messages(&self, conversation: ConversationId) -> GatewayResult<Vec<DirectMessage>> {
        self.with_db(|db| db.list_direct_messages(conversation))
    }

    async fn insert_direct_message(
        &self,
        conversation: ConversationId,
        sender: UserId,
        content: &str,
    ) -> GatewayResult<DirectMessage> {
        let (message, notifications) = self.with_db(|db| {
            let message = db.insert_direct_message(conversation, sender, content)?;

            let text = match &message.sender {
                Some(author) => format!("New message from {}", author.username),
                None => "New direct message".to_string(),
            };
            let mut notifications = Vec::new();
            for recipient in db.conversation_participant_ids(conversation)? {
                if recipient == sender {
                    continue;
                }
                notifications.push(db.insert_notification(&NewNotification {
                    user_id: recipient,
                    kind: NotificationKind::Message,
                    content: text.clone(),
                    reference: Some(NotificationRef {
                        kind: ReferenceKind::DirectMessage,
                        id: message.id.0,
                    }),
                })?);
            }
            Ok((message, notifications))
        })?;

        let record = DirectMessage {
            sender: None,
            reactions: Vec::new(),
            ..message.clone()
        };
        self.publish(Topic::ConversationMessages(conversation), &record);
        for notification in &notifications {
            self.publish(Topic::UserNotifications(notification.user_id), notification);
        }
        Ok(message)
    }

    // -- Notifications --

    async fn list_notifications(&self, user: UserId) -> GatewayResult<Vec<Notification>> {
        self.with_db(|db| db.list_notifications(user))
    }

    async fn mark_notification_read(&self, id: NotificationId) -> GatewayResult<()> {
        self.with_db(|db| db.mark_notification_read(id))
    }

    async fn mark_all_notifications_read(&self, user: UserId) -> GatewayResult<()> {
        let flipped = self.with_db(|db| db.mark_all_notifications_read(user))?;
        debug!(user = %user.short(), flipped, "notifications marked read");
        Ok(())
    }

    // -- Jobs --

    async fn list_jobs(&self) -> GatewayResult<Vec<JobPost>> {
        self.with_db(|db| db.list_jobs())
    }

    async fn get_job(&self, id: JobId) -> GatewayResult<JobPost> {
        self.with_db(|db| db.get_job(id))
    }

    async fn insert_job(&self, owner: UserId, job: &NewJob) -> GatewayResult<JobPost> {
        self.with_db(|db| db.create_job(owner, job))
    }

    async fn update_job(&self, id: JobId, patch: &JobPatch) -> GatewayResult<()> {
        self.with_db(|db| db.update_job(id, patch)).map(|_| ())
    }

    async fn delete_job(&self, id: JobId) -> GatewayResult<()> {
        if !self.with_db(|db| db.delete_job(id))? {
            debug!(job = %id.short(), "delete of absent job post");
        }
        Ok(())
    }

    // -- Resources --

    async fn list_resources(&self) -> GatewayResult<Vec<Resource>> {
        self.with_db(|db| db.list_resources())
    }

    async fn get_resource(&self, id: ResourceId) -> GatewayResult<Resource> {
        self.with_db(|db| db.get_resource(id))
    }

    async fn insert_resource(&self, owner: UserId, resource: &NewResource) -> GatewayResult<Resource> {
        self.with_db(|db| db.create_resource(owner, resource))
    }

    async fn update_resource(&self, id: ResourceId, patch: &ResourcePatch) -> GatewayResult<()> {
        self.with_db(|db| db.update_resource(id, patch)).map(|_| ())
    }

    async fn delete_resource(&self, id: ResourceId) -> GatewayResult<()> {
        if !self.with_db(|db| db.delete_resource(id))? {
            debug!(resource = %id.short(), "delete of absent resource");
        }
        Ok(())
    }
}

#[async_trait]
impl ChangeFeed for LocalBackend {
    async fn subscribe(&self, topic: Topic) -> GatewayResult<Subscription> {
        info!(%topic, "subscribing to change feed");
        Ok(self.feed.subscribe(topic, self.feed_buffer))
    }
}
