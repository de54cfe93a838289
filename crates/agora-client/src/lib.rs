//! # agora-client
//!
//! Client core of the Agora community platform. A set of state containers
//! proxies CRUD calls to a [`Gateway`] and reconciles pushes from a
//! [`ChangeFeed`], so that local state stays consistent with a remote,
//! multi-writer store. The view layer reads container snapshots, observes
//! them through `watch` receivers and calls container operations; nothing
//! else mutates state.

pub mod backend;
pub mod community;
pub mod config;
pub mod direct;
pub mod feed;
pub mod gateway;
pub mod jobs;
pub mod notifications;
pub mod realtime;
pub mod resources;
pub mod session;
pub mod state;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use agora_shared::{ChannelId, ConversationId, GatewayResult, UserId};

pub use backend::LocalBackend;
pub use community::{CommunityState, CommunityStore};
pub use config::ClientConfig;
pub use direct::{DirectMessageState, DirectMessageStore};
pub use gateway::{ChangeFeed, Gateway, Subscription};
pub use jobs::{JobState, JobStore};
pub use notifications::{NotificationState, NotificationStore};
pub use realtime::LiveSubscription;
pub use resources::{ResourceState, ResourceStore};
pub use session::{IdentityReader, SessionState, SessionStore};
pub use state::Status;

/// Install the global `tracing` subscriber. `RUST_LOG` wins over the
/// configured filter. Calling it twice is harmless.
pub fn init_tracing(config: &ClientConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}

/// Application context: one container per entity category, all sharing the
/// same gateway and reading identity from the session container.
pub struct App {
    pub session: Arc<SessionStore>,
    pub communities: Arc<CommunityStore>,
    pub direct: Arc<DirectMessageStore>,
    pub notifications: Arc<NotificationStore>,
    pub jobs: Arc<JobStore>,
    pub resources: Arc<ResourceStore>,
    feed: Arc<dyn ChangeFeed>,
}

impl App {
    pub fn new(gateway: Arc<dyn Gateway>, feed: Arc<dyn ChangeFeed>) -> Self {
        let session = Arc::new(SessionStore::new(gateway.clone()));
        let identity = session.identity();

        Self {
            communities: Arc::new(CommunityStore::new(gateway.clone(), identity.clone())),
            direct: Arc::new(DirectMessageStore::new(gateway.clone(), identity.clone())),
            notifications: Arc::new(NotificationStore::new(gateway.clone())),
            jobs: Arc::new(JobStore::new(gateway.clone(), identity.clone())),
            resources: Arc::new(ResourceStore::new(gateway, identity)),
            session,
            feed,
        }
    }

    /// Wire every container to one embedded backend.
    pub fn with_backend(backend: Arc<LocalBackend>) -> Self {
        Self::new(backend.clone(), backend)
    }

    /// Open the embedded backend described by `config` and restore any
    /// persisted session.
    pub async fn open(config: &ClientConfig) -> agora_store::Result<Self> {
        info!("Starting {} client v{}", agora_shared::constants::APP_NAME, env!("CARGO_PKG_VERSION"));
        let app = Self::with_backend(Arc::new(LocalBackend::open(config)?));
        app.session.initialize().await;
        Ok(app)
    }

    pub async fn follow_channel(&self, channel: ChannelId) -> GatewayResult<LiveSubscription> {
        realtime::follow_channel(&*self.feed, self.communities.clone(), channel).await
    }

    pub async fn follow_conversation(&self, conversation: ConversationId) -> GatewayResult<LiveSubscription> {
        realtime::follow_conversation(&*self.feed, self.direct.clone(), conversation).await
    }

    pub async fn follow_notifications(&self, user: UserId) -> GatewayResult<LiveSubscription> {
        realtime::follow_notifications(&*self.feed, self.notifications.clone(), user).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn open_restores_persisted_session() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig {
            db_path: Some(dir.path().join("agora.db")),
            ..ClientConfig::default()
        };

        let user = {
            let app = App::open(&config).await.unwrap();
            assert!(app.session.snapshot().initialized);
            app.session
                .sign_up("ada@example.com", "pw", "ada", "Ada")
                .await
                .unwrap()
                .id
        };

        let app = App::open(&config).await.unwrap();
        assert_eq!(app.session.identity().user_id(), Some(user));
    }

    #[tokio::test]
    async fn direct_message_notifies_recipient_live() {
        let backend = Arc::new(LocalBackend::in_memory().unwrap());
        let ada = App::with_backend(backend.clone());
        let bob = App::with_backend(backend.clone());

        let ada_id = ada
            .session
            .sign_up("ada@example.com", "pw", "ada", "Ada")
            .await
            .unwrap()
            .id;
        let bob_id = bob
            .session
            .sign_up("bob@example.com", "pw", "bob", "Bob")
            .await
            .unwrap()
            .id;

        let conversation = ada
            .direct
            .get_or_create_conversation(ada_id, bob_id)
            .await
            .unwrap();
        let _bob_dms = bob.follow_conversation(conversation.id).await.unwrap();
        let _bob_inbox = bob.follow_notifications(bob_id).await.unwrap();

        let sent = ada
            .direct
            .send_direct_message(conversation.id, "hi bob")
            .await
            .unwrap();

        let mut dms = bob.direct.subscribe();
        timeout(WAIT, dms.wait_for(|s| s.direct_messages.iter().any(|m| m.id == sent.id)))
            .await
            .unwrap()
            .unwrap();

        let mut inbox = bob.notifications.subscribe();
        let state = timeout(WAIT, inbox.wait_for(|s| s.unread_count == 1))
            .await
            .unwrap()
            .unwrap()
            .clone();
        assert_eq!(state.notifications[0].content, "New message from ada");

        let id = state.notifications[0].id;
        assert!(bob.notifications.mark_as_read(id).await);
        assert_eq!(bob.notifications.snapshot().unread_count, 0);
    }
}
