//! Change-feed wiring.
//!
//! Each live subscription gets its own task that drains the subscription
//! and hands every decoded row to the owning container's `add_x`. Rows that
//! fail to decode are logged and skipped.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use agora_shared::{ChannelId, ConversationId, DirectMessage, GatewayResult, Message, Notification, Topic, UserId};

use crate::community::CommunityStore;
use crate::direct::DirectMessageStore;
use crate::gateway::{ChangeFeed, Subscription};
use crate::notifications::NotificationStore;

/// Handle to a running follower task. Cancelling or dropping it stops the
/// task, which drops the underlying [`Subscription`].
pub struct LiveSubscription {
    topic: Topic,
    task: JoinHandle<()>,
}

impl LiveSubscription {
    pub fn topic(&self) -> Topic {
        self.topic
    }

    pub fn cancel(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for LiveSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn spawn_follower<T, F>(mut subscription: Subscription, mut apply: F) -> LiveSubscription
where
    T: DeserializeOwned + Send + 'static,
    F: FnMut(T) + Send + 'static,
{
    let topic = subscription.topic();
    let task = tokio::spawn(async move {
        while let Some(event) = subscription.recv().await {
            match event.decode::<T>() {
                Ok(row) => apply(row),
                Err(e) => warn!(%topic, error = %e, "skipping undecodable change event"),
            }
        }
        debug!(%topic, "change feed closed");
    });
    LiveSubscription { topic, task }
}

/// Push new messages of `channel` into `store`.
pub async fn follow_channel(
    feed: &dyn ChangeFeed,
    store: Arc<CommunityStore>,
    channel: ChannelId,
) -> GatewayResult<LiveSubscription> {
    let subscription = feed.subscribe(Topic::ChannelMessages(channel)).await?;
    Ok(spawn_follower(subscription, move |message: Message| {
        store.add_message(message)
    }))
}

pub async fn follow_conversation(
    feed: &dyn ChangeFeed,
    store: Arc<DirectMessageStore>,
    conversation: ConversationId,
) -> GatewayResult<LiveSubscription> {
    let subscription = feed
        .subscribe(Topic::ConversationMessages(conversation))
        .await?;
    Ok(spawn_follower(subscription, move |message: DirectMessage| {
        store.add_direct_message(message)
    }))
}

pub async fn follow_notifications(
    feed: &dyn ChangeFeed,
    store: Arc<NotificationStore>,
    user: UserId,
) -> GatewayResult<LiveSubscription> {
    let subscription = feed.subscribe(Topic::UserNotifications(user)).await?;
    Ok(spawn_follower(subscription, move |notification: Notification| {
        store.add_notification(notification)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::time::timeout;

    use crate::backend::LocalBackend;
    use crate::gateway::Gateway;
    use crate::session::SessionStore;
    use agora_shared::ChangeEvent;

    const WAIT: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn pushed_message_reaches_container_once() {
        let backend = Arc::new(LocalBackend::in_memory().unwrap());
        let session = SessionStore::new(backend.clone());
        session.sign_up("u@example.com", "pw", "u", "U").await.unwrap();
        let store = Arc::new(CommunityStore::new(backend.clone(), session.identity()));
        let community = store.create_community("c", "d", None).await.unwrap();
        store.fetch_channels(community.id).await;
        let channel = store.snapshot().channels[0].id;

        let live = follow_channel(&*backend, store.clone(), channel).await.unwrap();
        assert_eq!(live.topic(), Topic::ChannelMessages(channel));

        // Someone else posts.
        let other = UserId::new();
        let pushed = backend.insert_message(channel, other, "from afar").await.unwrap();
        let mut rx = store.subscribe();
        timeout(WAIT, rx.wait_for(|s| s.messages.iter().any(|m| m.id == pushed.id)))
            .await
            .unwrap()
            .unwrap();

        // Our own send and its echo converge on one entry. Delivery is
        // ordered, so once a later row shows up the echo has been handled.
        let sent = store.send_message(channel, "hello").await.unwrap();
        let marker = backend.insert_message(channel, other, "after").await.unwrap();
        timeout(WAIT, rx.wait_for(|s| s.messages.iter().any(|m| m.id == marker.id)))
            .await
            .unwrap()
            .unwrap();

        let ids: Vec<_> = store.snapshot().messages.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![pushed.id, sent.id, marker.id]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn sent_rows_keep_their_joins_when_the_echo_lands_first() {
        let backend = Arc::new(LocalBackend::in_memory().unwrap());
        let session = SessionStore::new(backend.clone());
        session.sign_up("u@example.com", "pw", "u", "U").await.unwrap();
        let me = session.identity().user_id().unwrap();

        let store = Arc::new(CommunityStore::new(backend.clone(), session.identity()));
        let community = store.create_community("c", "d", None).await.unwrap();
        store.fetch_channels(community.id).await;
        let channel = store.snapshot().channels[0].id;
        let _live = follow_channel(&*backend, store.clone(), channel).await.unwrap();

        let mut sent = Vec::new();
        for i in 0..100 {
            sent.push(store.send_message(channel, &format!("m{i}")).await.unwrap().id);
        }
        let marker = backend.insert_message(channel, UserId::new(), "done").await.unwrap();
        let mut rx = store.subscribe();
        timeout(WAIT, rx.wait_for(|s| s.messages.iter().any(|m| m.id == marker.id)))
            .await
            .unwrap()
            .unwrap();

        let messages = store.snapshot().messages;
        let mine: Vec<_> = messages.iter().filter(|m| m.user_id == me).collect();
        assert_eq!(mine.iter().map(|m| m.id).collect::<Vec<_>>(), sent);
        assert!(mine.iter().all(|m| m.author.as_ref().is_some_and(|a| a.username == "u")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn sent_direct_messages_keep_their_sender() {
        let backend = Arc::new(LocalBackend::in_memory().unwrap());
        let session = SessionStore::new(backend.clone());
        session.sign_up("a@example.com", "pw", "ada", "Ada").await.unwrap();
        let ada = session.identity().user_id().unwrap();
        let bob = UserId::new();

        let store = Arc::new(DirectMessageStore::new(backend.clone(), session.identity()));
        let conversation = backend.create_direct_conversation(ada, bob).await.unwrap();
        let _live = follow_conversation(&*backend, store.clone(), conversation.id)
            .await
            .unwrap();

        for i in 0..100 {
            store
                .send_direct_message(conversation.id, &format!("m{i}"))
                .await
                .unwrap();
        }
        let marker = backend
            .insert_direct_message(conversation.id, bob, "done")
            .await
            .unwrap();
        let mut rx = store.subscribe();
        timeout(WAIT, rx.wait_for(|s| s.direct_messages.iter().any(|m| m.id == marker.id)))
            .await
            .unwrap()
            .unwrap();

        let messages = store.snapshot().direct_messages;
        assert_eq!(messages.len(), 101);
        assert!(messages
            .iter()
            .filter(|m| m.sender_id == ada)
            .all(|m| m.sender.is_some()));
    }

    #[tokio::test]
    async fn undecodable_events_are_skipped() {
        let backend = Arc::new(LocalBackend::in_memory().unwrap());
        let store = Arc::new(NotificationStore::new(backend.clone()));
        let user = UserId::new();
        let _live = follow_notifications(&*backend, store.clone(), user).await.unwrap();

        let topic = Topic::UserNotifications(user);
        backend
            .feed()
            .publish(ChangeEvent::new(topic, &serde_json::json!({ "bogus": true })).unwrap());
        let notification = backend
            .notify(&agora_shared::NewNotification {
                user_id: user,
                kind: agora_shared::NotificationKind::JobPost,
                content: "New job".into(),
                reference: None,
            })
            .unwrap();

        let mut rx = store.subscribe();
        let state = timeout(WAIT, rx.wait_for(|s| s.unread_count == 1))
            .await
            .unwrap()
            .unwrap()
            .clone();
        assert_eq!(state.notifications, vec![notification]);
    }

    #[tokio::test]
    async fn cancel_stops_delivery() {
        let backend = Arc::new(LocalBackend::in_memory().unwrap());
        let session = SessionStore::new(backend.clone());
        session.sign_up("a@example.com", "pw", "a", "A").await.unwrap();
        let ada = session.identity().user_id().unwrap();
        let bob = UserId::new();
        let store = Arc::new(DirectMessageStore::new(backend.clone(), session.identity()));
        let conversation = backend.create_direct_conversation(ada, bob).await.unwrap();

        let live = follow_conversation(&*backend, store.clone(), conversation.id)
            .await
            .unwrap();
        live.cancel();
        timeout(WAIT, async {
            while !live.is_finished() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        backend
            .insert_direct_message(conversation.id, bob, "anyone?")
            .await
            .unwrap();
        assert_eq!(backend.feed().subscriber_count(), 0);
        assert!(store.snapshot().direct_messages.is_empty());
    }
}
