//! Two-party conversations and their direct messages.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

use agora_shared::{Conversation, ConversationId, DirectMessage, GatewayError, GatewayResult, UserId};

use crate::gateway::Gateway;
use crate::session::IdentityReader;
use crate::state::{impl_has_status, prepend_unique, push_unique, upsert_by_id, Observable, Status};

#[derive(Debug, Clone, Default)]
pub struct DirectMessageState {
    /// Newest first.
    pub conversations: Vec<Conversation>,
    pub current_conversation: Option<Conversation>,
    /// Messages of the conversation last fetched, oldest first.
    pub direct_messages: Vec<DirectMessage>,
    pub status: Status,
}
impl_has_status!(DirectMessageState);

pub struct DirectMessageStore {
    gateway: Arc<dyn Gateway>,
    identity: IdentityReader,
    state: Observable<DirectMessageState>,
}

impl DirectMessageStore {
    pub fn new(gateway: Arc<dyn Gateway>, identity: IdentityReader) -> Self {
        Self {
            gateway,
            identity,
            state: Observable::new(),
        }
    }

    pub fn snapshot(&self) -> DirectMessageState {
        self.state.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<DirectMessageState> {
        self.state.subscribe()
    }

    pub async fn fetch_conversations(&self, user: UserId) {
        self.state.begin();
        let result = self.gateway.list_conversations(user).await;
        self.state.complete("fetch_conversations", result, |state, rows| {
            debug!(user = %user.short(), count = rows.len(), "conversations fetched");
            state.conversations = rows.clone();
        });
    }

    pub async fn fetch_conversation(&self, id: ConversationId) -> Option<Conversation> {
        self.state.begin();
        let result = self.gateway.get_conversation(id).await;
        self.state.complete("fetch_conversation", result, |state, conversation| {
            state.current_conversation = Some(conversation.clone());
        })
    }

    pub async fn fetch_direct_messages(&self, conversation: ConversationId) {
        self.state.begin();
        let result = self.gateway.list_direct_messages(conversation).await;
        self.state.complete("fetch_direct_messages", result, |state, rows| {
            state.direct_messages = rows.clone();
        });
    }

    /// Create (or resolve) the conversation between `user` and `other` and
    /// make it current.
    pub async fn create_conversation(&self, user: UserId, other: UserId) -> Option<Conversation> {
        if self.identity.user_id().is_none() {
            self.state.fail("create_conversation", GatewayError::not_authenticated());
            return None;
        }

        self.state.begin();
        let result = self.open_conversation(user, other).await;
        self.state.complete("create_conversation", result, Self::select_new)
    }

    /// Make the existing conversation between `user` and `other` current,
    /// creating it first when there is none.
    pub async fn get_or_create_conversation(&self, user: UserId, other: UserId) -> Option<Conversation> {
        if self.identity.user_id().is_none() {
            self.state.fail("get_or_create_conversation", GatewayError::not_authenticated());
            return None;
        }

        self.state.begin();
        let result = async {
            let existing = self.gateway.find_conversations_between(user, other).await?;
            match existing.into_iter().next() {
                Some(conversation) => Ok::<_, GatewayError>((conversation, false)),
                None => Ok((self.open_conversation(user, other).await?, true)),
            }
        }
        .await;

        // A found conversation is only selected; the list keeps its order.
        let (conversation, _) =
            self.state
                .complete("get_or_create_conversation", result, |state, resolved| {
                    let (conversation, created) = resolved;
                    if *created {
                        Self::select_new(state, conversation);
                    } else {
                        state.current_conversation = Some(conversation.clone());
                    }
                })?;
        Some(conversation)
    }

    /// One keyed call creates the conversation and both participant rows;
    /// the participant list is then rebuilt from fresh profiles.
    async fn open_conversation(&self, user: UserId, other: UserId) -> GatewayResult<Conversation> {
        let mut conversation = self.gateway.create_direct_conversation(user, other).await?;
        conversation.participants = self.gateway.get_profiles(&[user, other]).await?;
        info!(conversation = %conversation.id.short(), "conversation opened");
        Ok(conversation)
    }

    fn select_new(state: &mut DirectMessageState, conversation: &Conversation) {
        prepend_unique(&mut state.conversations, conversation);
        state.current_conversation = Some(conversation.clone());
    }

    pub async fn send_direct_message(
        &self,
        conversation: ConversationId,
        content: &str,
    ) -> Option<DirectMessage> {
        let Some(sender) = self.identity.user_id() else {
            self.state.fail("send_direct_message", GatewayError::not_authenticated());
            return None;
        };

        self.state.begin();
        let result = self
            .gateway
            .insert_direct_message(conversation, sender, content)
            .await;
        self.state.complete("send_direct_message", result, |state, message| {
            upsert_by_id(&mut state.direct_messages, message);
        })
    }

    pub fn set_current_conversation(&self, conversation: Option<Conversation>) {
        self.state.update(|state| state.current_conversation = conversation);
    }

    /// Reconcile a pushed direct message. Ids already present are ignored.
    pub fn add_direct_message(&self, message: DirectMessage) {
        self.state.update(|state| {
            if push_unique(&mut state.direct_messages, &message) {
                debug!(message = %message.id.short(), "direct message received");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LocalBackend;
    use crate::session::SessionStore;

    async fn signed_in(backend: &Arc<LocalBackend>, name: &str) -> (SessionStore, UserId) {
        let session = SessionStore::new(backend.clone());
        let profile = session
            .sign_up(&format!("{name}@example.com"), "pw", name, name)
            .await
            .unwrap();
        (session, profile.id)
    }

    #[tokio::test]
    async fn get_or_create_resolves_the_same_conversation() {
        let backend = Arc::new(LocalBackend::in_memory().unwrap());
        let (session, ada) = signed_in(&backend, "ada").await;
        let (_, bob) = signed_in(&backend, "bob").await;
        let store = DirectMessageStore::new(backend.clone(), session.identity());

        let first = store.get_or_create_conversation(ada, bob).await.unwrap();
        let second = store.get_or_create_conversation(bob, ada).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.participants.len(), 2);

        let state = store.snapshot();
        assert_eq!(state.conversations.len(), 1);
        assert_eq!(state.current_conversation.map(|c| c.id), Some(first.id));

        // Creating explicitly still lands on the pair's conversation.
        let created = store.create_conversation(ada, bob).await.unwrap();
        assert_eq!(created.id, first.id);
        assert_eq!(store.snapshot().conversations.len(), 1);
    }

    #[tokio::test]
    async fn found_conversation_is_selected_not_listed() {
        let backend = Arc::new(LocalBackend::in_memory().unwrap());
        let (session, ada) = signed_in(&backend, "ada").await;
        let (_, bob) = signed_in(&backend, "bob").await;
        let (_, cy) = signed_in(&backend, "cy").await;
        let existing = backend.create_direct_conversation(ada, bob).await.unwrap();

        let store = DirectMessageStore::new(backend.clone(), session.identity());
        let newer = store.get_or_create_conversation(ada, cy).await.unwrap();
        let found = store.get_or_create_conversation(ada, bob).await.unwrap();
        assert_eq!(found.id, existing.id);

        let state = store.snapshot();
        assert_eq!(
            state.conversations.iter().map(|c| c.id).collect::<Vec<_>>(),
            vec![newer.id]
        );
        assert_eq!(state.current_conversation.map(|c| c.id), Some(existing.id));
    }

    #[tokio::test]
    async fn send_appends_once_and_fetch_matches() {
        let backend = Arc::new(LocalBackend::in_memory().unwrap());
        let (session, ada) = signed_in(&backend, "ada").await;
        let (_, bob) = signed_in(&backend, "bob").await;
        let store = DirectMessageStore::new(backend.clone(), session.identity());
        let conversation = store.get_or_create_conversation(ada, bob).await.unwrap();

        let sent = store.send_direct_message(conversation.id, "hi").await.unwrap();
        store.add_direct_message(sent.clone());
        assert_eq!(store.snapshot().direct_messages, vec![sent.clone()]);

        store.fetch_direct_messages(conversation.id).await;
        assert_eq!(store.snapshot().direct_messages, vec![sent.clone()]);

        store.fetch_conversations(ada).await;
        let listed = store.snapshot().conversations;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].last_message.as_ref().map(|m| m.id), Some(sent.id));

        store.set_current_conversation(None);
        let fetched = store.fetch_conversation(conversation.id).await.unwrap();
        assert_eq!(store.snapshot().current_conversation, Some(fetched));
    }

    #[tokio::test]
    async fn requires_identity() {
        let backend = Arc::new(LocalBackend::in_memory().unwrap());
        let session = SessionStore::new(backend.clone());
        let store = DirectMessageStore::new(backend.clone(), session.identity());

        let (a, b) = (UserId::new(), UserId::new());
        assert!(store.get_or_create_conversation(a, b).await.is_none());
        assert!(store.send_direct_message(ConversationId::new(), "x").await.is_none());
        assert!(backend.find_conversations_between(a, b).await.unwrap().is_empty());
        assert_eq!(
            store.snapshot().status.error.as_deref(),
            Some("User not authenticated")
        );
    }
}
