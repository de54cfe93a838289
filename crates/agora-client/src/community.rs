//! Communities, their channels, channel messages and memberships.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

use agora_shared::constants::{DEFAULT_CHANNEL_DESCRIPTION, DEFAULT_CHANNEL_NAME};
use agora_shared::{
    Channel, ChannelId, Community, CommunityId, GatewayError, MemberRole, Membership, Message,
    NewChannel, NewCommunity,
};

use crate::gateway::Gateway;
use crate::session::IdentityReader;
use crate::state::{impl_has_status, push_unique, replace_by_id, upsert_by_id, Observable, Status};

#[derive(Debug, Clone, Default)]
pub struct CommunityState {
    /// Oldest first.
    pub communities: Vec<Community>,
    pub current_community: Option<Community>,
    pub channels: Vec<Channel>,
    pub current_channel: Option<Channel>,
    /// Messages of the channel last fetched, oldest first.
    pub messages: Vec<Message>,
    pub members: Vec<Membership>,
    pub status: Status,
}
impl_has_status!(CommunityState);

pub struct CommunityStore {
    gateway: Arc<dyn Gateway>,
    identity: IdentityReader,
    state: Observable<CommunityState>,
}

impl CommunityStore {
    pub fn new(gateway: Arc<dyn Gateway>, identity: IdentityReader) -> Self {
        Self {
            gateway,
            identity,
            state: Observable::new(),
        }
    }

    pub fn snapshot(&self) -> CommunityState {
        self.state.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<CommunityState> {
        self.state.subscribe()
    }

    // ------------------------------------------------------------------
    // Fetch
    // ------------------------------------------------------------------

    pub async fn fetch_communities(&self) {
        self.state.begin();
        let result = self.gateway.list_communities().await;
        self.state.complete("fetch_communities", result, |state, rows| {
            debug!(count = rows.len(), "communities fetched");
            state.communities = rows.clone();
        });
    }

    /// Load one community as the current selection and refresh its list
    /// entry with the authoritative row.
    pub async fn fetch_community(&self, id: CommunityId) -> Option<Community> {
        self.state.begin();
        let result = self.gateway.get_community(id).await;
        self.state.complete("fetch_community", result, |state, community| {
            replace_by_id(&mut state.communities, community);
            state.current_community = Some(community.clone());
        })
    }

    pub async fn fetch_channels(&self, community: CommunityId) {
        self.state.begin();
        let result = self.gateway.list_channels(community).await;
        self.state.complete("fetch_channels", result, |state, rows| {
            state.channels = rows.clone();
        });
    }

    pub async fn fetch_channel(&self, id: ChannelId) -> Option<Channel> {
        self.state.begin();
        let result = self.gateway.get_channel(id).await;
        self.state.complete("fetch_channel", result, |state, channel| {
            state.current_channel = Some(channel.clone());
        })
    }

    pub async fn fetch_messages(&self, channel: ChannelId) {
        self.state.begin();
        let result = self.gateway.list_messages(channel).await;
        self.state.complete("fetch_messages", result, |state, rows| {
            debug!(channel = %channel.short(), count = rows.len(), "messages fetched");
            state.messages = rows.clone();
        });
    }

    pub async fn fetch_members(&self, community: CommunityId) {
        self.state.begin();
        let result = self.gateway.list_members(community).await;
        self.state.complete("fetch_members", result, |state, rows| {
            state.members = rows.clone();
        });
    }

    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Create a community owned by the signed-in user, together with the
    /// owner's admin membership and a default channel.
    pub async fn create_community(
        &self,
        name: &str,
        description: &str,
        image_url: Option<&str>,
    ) -> Option<Community> {
        let Some(owner) = self.identity.user_id() else {
            self.state.fail("create_community", GatewayError::not_authenticated());
            return None;
        };

        self.state.begin();
        let result = async {
            let community = self
                .gateway
                .insert_community(
                    owner,
                    &NewCommunity {
                        name: name.to_string(),
                        description: description.to_string(),
                        image_url: image_url.map(str::to_string),
                    },
                )
                .await?;
            self.gateway
                .insert_membership(community.id, owner, MemberRole::Admin)
                .await?;
            self.gateway
                .insert_channel(
                    owner,
                    &NewChannel {
                        name: DEFAULT_CHANNEL_NAME.to_string(),
                        description: Some(DEFAULT_CHANNEL_DESCRIPTION.to_string()),
                        community_id: community.id,
                    },
                )
                .await?;
            Ok::<_, GatewayError>(community)
        }
        .await;

        let community = self.state.complete("create_community", result, |state, community| {
            push_unique(&mut state.communities, community);
        })?;
        info!(community = %community.id.short(), name = %community.name, "community created");
        Some(community)
    }

    pub async fn create_channel(
        &self,
        name: &str,
        description: Option<&str>,
        community: CommunityId,
    ) -> Option<Channel> {
        let Some(owner) = self.identity.user_id() else {
            self.state.fail("create_channel", GatewayError::not_authenticated());
            return None;
        };

        self.state.begin();
        let result = self
            .gateway
            .insert_channel(
                owner,
                &NewChannel {
                    name: name.to_string(),
                    description: description.map(str::to_string),
                    community_id: community,
                },
            )
            .await;
        let channel = self.state.complete("create_channel", result, |state, channel| {
            push_unique(&mut state.channels, channel);
        })?;
        info!(channel = %channel.id.short(), name = %channel.name, "channel created");
        Some(channel)
    }

    /// Post `content` to `channel` as the signed-in user. The stored row is
    /// appended locally, or replaces a bare push echo that got there first.
    pub async fn send_message(&self, channel: ChannelId, content: &str) -> Option<Message> {
        let Some(author) = self.identity.user_id() else {
            self.state.fail("send_message", GatewayError::not_authenticated());
            return None;
        };

        self.state.begin();
        let result = self.gateway.insert_message(channel, author, content).await;
        let message = self.state.complete("send_message", result, |state, message| {
            upsert_by_id(&mut state.messages, message);
        })?;
        debug!(channel = %channel.short(), message = %message.id.short(), "message sent");
        Some(message)
    }

    // ------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------

    /// Join `community` as a regular member. The counter is only bumped
    /// when the membership row was actually created.
    pub async fn join_community(&self, community: CommunityId) -> Option<Community> {
        let Some(user) = self.identity.user_id() else {
            self.state.fail("join_community", GatewayError::not_authenticated());
            return None;
        };

        self.state.begin();
        let result = async {
            if self.gateway.find_membership(community, user).await?.is_none()
                && self
                    .gateway
                    .insert_membership(community, user, MemberRole::Member)
                    .await?
            {
                self.gateway.increment_member_count(community).await?;
                info!(community = %community.short(), user = %user.short(), "joined community");
            }
            self.gateway.get_community(community).await
        }
        .await;

        self.state.complete("join_community", result, |state, community| {
            replace_by_id(&mut state.communities, community);
            state.current_community = Some(community.clone());
        })
    }

    pub async fn leave_community(&self, community: CommunityId) -> Option<Community> {
        let Some(user) = self.identity.user_id() else {
            self.state.fail("leave_community", GatewayError::not_authenticated());
            return None;
        };

        self.state.begin();
        let result = async {
            if self.gateway.delete_membership(community, user).await? {
                self.gateway.decrement_member_count(community).await?;
                info!(community = %community.short(), user = %user.short(), "left community");
            }
            self.gateway.get_community(community).await
        }
        .await;

        self.state.complete("leave_community", result, |state, refreshed| {
            replace_by_id(&mut state.communities, refreshed);
            state
                .members
                .retain(|m| !(m.community_id == community && m.user_id == user));
            state.current_community = Some(refreshed.clone());
        })
    }

    // ------------------------------------------------------------------
    // Local
    // ------------------------------------------------------------------

    pub fn set_current_community(&self, community: Option<Community>) {
        self.state.update(|state| state.current_community = community);
    }

    pub fn set_current_channel(&self, channel: Option<Channel>) {
        self.state.update(|state| state.current_channel = channel);
    }

    /// Reconcile a pushed message. Ids already present are ignored.
    pub fn add_message(&self, message: Message) {
        self.state.update(|state| {
            if push_unique(&mut state.messages, &message) {
                debug!(message = %message.id.short(), "message received");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LocalBackend;
    use crate::session::SessionStore;

    struct Fixture {
        backend: Arc<LocalBackend>,
        session: SessionStore,
        store: CommunityStore,
    }

    fn fixture() -> Fixture {
        let backend = Arc::new(LocalBackend::in_memory().unwrap());
        let session = SessionStore::new(backend.clone());
        let store = CommunityStore::new(backend.clone(), session.identity());
        Fixture {
            backend,
            session,
            store,
        }
    }

    async fn signed_in(name: &str) -> Fixture {
        let f = fixture();
        f.session
            .sign_up(&format!("{name}@example.com"), "pw", name, name)
            .await
            .unwrap();
        f
    }

    #[tokio::test]
    async fn create_community_sets_up_owner_and_general() {
        let f = signed_in("owner").await;
        let owner = f.session.identity().user_id().unwrap();

        let community = f
            .store
            .create_community("Tech Talk", "Discuss tech", None)
            .await
            .unwrap();
        assert_eq!(community.member_count, 1);
        assert_eq!(f.store.snapshot().communities, vec![community.clone()]);

        f.store.fetch_members(community.id).await;
        let members = f.store.snapshot().members;
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].user_id, owner);
        assert_eq!(members[0].role, MemberRole::Admin);

        f.store.fetch_channels(community.id).await;
        let channels = f.store.snapshot().channels;
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].name, "general");
        assert_eq!(channels[0].description.as_deref(), Some("General discussion"));
    }

    #[tokio::test]
    async fn writes_without_identity_touch_nothing() {
        let f = fixture();
        assert!(f.store.create_community("x", "y", None).await.is_none());
        let state = f.store.snapshot();
        assert_eq!(state.status.error.as_deref(), Some("User not authenticated"));
        assert!(state.communities.is_empty());
        assert!(f.backend.list_communities().await.unwrap().is_empty());

        assert!(f.store.send_message(ChannelId::new(), "hi").await.is_none());
        assert!(f.store.join_community(CommunityId::new()).await.is_none());
    }

    #[tokio::test]
    async fn fetch_mirrors_gateway_and_is_idempotent() {
        let f = signed_in("owner").await;
        f.store.create_community("A", "a", None).await.unwrap();
        f.store.create_community("B", "b", Some("https://img")).await.unwrap();

        f.store.fetch_communities().await;
        let first = f.store.snapshot().communities;
        f.store.fetch_communities().await;
        let second = f.store.snapshot().communities;

        assert_eq!(first, f.backend.list_communities().await.unwrap());
        assert_eq!(first, second);
        assert_eq!(
            first.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            vec!["A", "B"]
        );
    }

    #[tokio::test]
    async fn repeated_join_counts_once() {
        let owner = signed_in("owner").await;
        let community = owner
            .store
            .create_community("Rust", "Crabs", None)
            .await
            .unwrap();

        // A second user on the same backend.
        let session = SessionStore::new(owner.backend.clone());
        session.sign_up("bob@example.com", "pw", "bob", "Bob").await.unwrap();
        let store = CommunityStore::new(owner.backend.clone(), session.identity());

        let joined = store.join_community(community.id).await.unwrap();
        assert_eq!(joined.member_count, 2);
        let again = store.join_community(community.id).await.unwrap();
        assert_eq!(again.member_count, 2);
        assert_eq!(owner.backend.list_members(community.id).await.unwrap().len(), 2);
        assert_eq!(store.snapshot().current_community, Some(again));

        let left = store.leave_community(community.id).await.unwrap();
        assert_eq!(left.member_count, 1);
        let left_again = store.leave_community(community.id).await.unwrap();
        assert_eq!(left_again.member_count, 1);
    }

    #[tokio::test]
    async fn sent_message_is_not_duplicated_by_echo() {
        let f = signed_in("u").await;
        let user = f.session.identity().user_id().unwrap();
        let community = f.store.create_community("c", "d", None).await.unwrap();
        f.store.fetch_channels(community.id).await;
        let channel = f.store.snapshot().channels[0].id;

        let sent = f.store.send_message(channel, "hello").await.unwrap();
        let mut echo = sent.clone();
        echo.author = None;
        f.store.add_message(echo);

        let messages = f.store.snapshot().messages;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "hello");
        assert_eq!(messages[0].user_id, user);
        assert!(messages[0].author.is_some());

        f.store.fetch_messages(channel).await;
        assert_eq!(f.store.snapshot().messages, vec![sent]);
    }

    #[tokio::test]
    async fn rejected_create_leaves_channels_untouched() {
        let f = signed_in("u").await;
        let community = f.store.create_community("c", "d", None).await.unwrap();
        f.store.fetch_channels(community.id).await;
        let before = f.store.snapshot().channels;
        assert_eq!(before.len(), 1);

        let orphan = f.store.create_channel("lost", None, CommunityId::new()).await;
        assert!(orphan.is_none());

        let state = f.store.snapshot();
        assert_eq!(state.channels, before);
        assert!(state.status.error.is_some());
        assert!(!state.status.loading);
        assert_eq!(f.backend.list_channels(community.id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn failed_fetch_keeps_previous_list() {
        let f = signed_in("u").await;
        f.store.create_community("c", "d", None).await.unwrap();
        f.store.fetch_communities().await;
        let before = f.store.snapshot().communities;

        assert!(f.store.fetch_community(CommunityId::new()).await.is_none());
        let state = f.store.snapshot();
        assert_eq!(state.communities, before);
        assert!(state.status.error.unwrap().starts_with("Not found"));
        assert!(!state.status.loading);
    }
}
