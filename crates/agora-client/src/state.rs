//! Observable container state.
//!
//! Each container keeps its state in an [`Observable`], a thin wrapper
//! around a `tokio::sync::watch` sender. Views hold a `watch::Receiver` and
//! re-render on change. Every mutation is a short synchronous closure, so no
//! lock is ever held across an `.await`.

use tokio::sync::watch;
use tracing::warn;

use agora_shared::{GatewayError, GatewayResult};

/// The `loading` / `error` pair every container carries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Status {
    pub loading: bool,
    /// Message of the last failed operation. Cleared when the next one
    /// starts.
    pub error: Option<String>,
}

pub trait HasStatus {
    fn status(&self) -> &Status;
    fn status_mut(&mut self) -> &mut Status;
}

/// Implements [`HasStatus`] for a state struct with a `status` field.
macro_rules! impl_has_status {
    ($name:ty) => {
        impl $crate::state::HasStatus for $name {
            fn status(&self) -> &$crate::state::Status {
                &self.status
            }

            fn status_mut(&mut self) -> &mut $crate::state::Status {
                &mut self.status
            }
        }
    };
}
pub(crate) use impl_has_status;

pub struct Observable<S> {
    tx: watch::Sender<S>,
}

impl<S> Observable<S>
where
    S: HasStatus + Clone + Default,
{
    pub fn new() -> Self {
        let (tx, _) = watch::channel(S::default());
        Self { tx }
    }

    pub fn snapshot(&self) -> S {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<S> {
        self.tx.subscribe()
    }

    pub fn read<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.tx.borrow())
    }

    /// Mutate in place and notify observers.
    pub fn update(&self, f: impl FnOnce(&mut S)) {
        self.tx.send_modify(f);
    }

    /// `idle -> loading`, clearing the previous error.
    pub fn begin(&self) {
        self.update(|state| {
            let status = state.status_mut();
            status.loading = true;
            status.error = None;
        });
    }

    /// `loading -> idle`. On success `apply` reconciles the state with the
    /// value, in the same notification. On failure the state is left as it
    /// was apart from the recorded error.
    pub fn complete<T>(
        &self,
        op: &'static str,
        result: GatewayResult<T>,
        apply: impl FnOnce(&mut S, &T),
    ) -> Option<T> {
        match result {
            Ok(value) => {
                self.update(|state| {
                    apply(state, &value);
                    state.status_mut().loading = false;
                });
                Some(value)
            }
            Err(e) => {
                self.fail(op, e);
                None
            }
        }
    }

    /// Record `error` and return to idle.
    pub fn fail(&self, op: &'static str, error: GatewayError) {
        warn!(op, error = %error, "operation failed");
        self.update(|state| {
            let status = state.status_mut();
            status.loading = false;
            status.error = Some(error.to_string());
        });
    }
}

impl<S> Default for Observable<S>
where
    S: HasStatus + Clone + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Id-keyed list helpers shared by the containers.
pub trait Keyed {
    type Id: PartialEq + Copy;

    fn key(&self) -> Self::Id;
}

macro_rules! keyed {
    ($($ty:ty => $id:ty),+ $(,)?) => {
        $(
            impl Keyed for $ty {
                type Id = $id;

                fn key(&self) -> $id {
                    self.id
                }
            }
        )+
    };
}

keyed! {
    agora_shared::Community => agora_shared::CommunityId,
    agora_shared::Channel => agora_shared::ChannelId,
    agora_shared::Message => agora_shared::MessageId,
    agora_shared::Conversation => agora_shared::ConversationId,
    agora_shared::DirectMessage => agora_shared::DirectMessageId,
    agora_shared::Notification => agora_shared::NotificationId,
    agora_shared::JobPost => agora_shared::JobId,
    agora_shared::Resource => agora_shared::ResourceId,
}

/// Append unless an entry with the same id is present. Returns whether the
/// list grew.
pub fn push_unique<T: Keyed + Clone>(list: &mut Vec<T>, item: &T) -> bool {
    if list.iter().any(|x| x.key() == item.key()) {
        return false;
    }
    list.push(item.clone());
    true
}

/// Prepend unless an entry with the same id is present.
pub fn prepend_unique<T: Keyed + Clone>(list: &mut Vec<T>, item: &T) -> bool {
    if list.iter().any(|x| x.key() == item.key()) {
        return false;
    }
    list.insert(0, item.clone());
    true
}

/// Replace the entry with the same id, or append when there is none.
pub fn upsert_by_id<T: Keyed + Clone>(list: &mut Vec<T>, item: &T) {
    match list.iter_mut().find(|x| x.key() == item.key()) {
        Some(slot) => *slot = item.clone(),
        None => list.push(item.clone()),
    }
}

/// Replace the entry with the same id, if any.
pub fn replace_by_id<T: Keyed + Clone>(list: &mut [T], item: &T) {
    if let Some(slot) = list.iter_mut().find(|x| x.key() == item.key()) {
        *slot = item.clone();
    }
}

/// Clear `current` when it points at `id`.
pub fn clear_if_current<T: Keyed>(current: &mut Option<T>, id: T::Id) {
    if current.as_ref().is_some_and(|c| c.key() == id) {
        *current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_shared::{Channel, ChannelId, CommunityId, UserId};

    #[derive(Debug, Clone, Default)]
    struct Counter {
        value: u32,
        status: Status,
    }
    impl_has_status!(Counter);

    fn channel(name: &str) -> Channel {
        Channel {
            id: ChannelId::new(),
            name: name.into(),
            description: None,
            community_id: CommunityId::new(),
            created_by: UserId::new(),
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn failure_keeps_state_and_records_error() {
        let state: Observable<Counter> = Observable::new();
        state.update(|s| s.value = 3);
        state.begin();
        assert!(state.read(|s| s.status.loading));

        let out: Option<u32> = state.complete(
            "bump",
            Err(GatewayError::Network("offline".into())),
            |s, v| s.value = *v,
        );
        assert!(out.is_none());

        let snapshot = state.snapshot();
        assert_eq!(snapshot.value, 3);
        assert!(!snapshot.status.loading);
        assert_eq!(snapshot.status.error.as_deref(), Some("Network error: offline"));

        state.begin();
        assert!(state.read(|s| s.status.error.is_none()));
    }

    #[tokio::test]
    async fn observers_see_completed_value() {
        let state: Observable<Counter> = Observable::new();
        let mut rx = state.subscribe();
        state.complete("set", Ok(7u32), |s, v| s.value = *v);
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().value, 7);
    }

    #[test]
    fn unique_helpers_ignore_known_ids() {
        let general = channel("general");
        let mut list = vec![general.clone()];
        assert!(!push_unique(&mut list, &general));
        assert!(prepend_unique(&mut list, &channel("random")));
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].id, general.id);

        let mut current = Some(general.clone());
        clear_if_current(&mut current, ChannelId::new());
        assert!(current.is_some());
        clear_if_current(&mut current, general.id);
        assert!(current.is_none());
    }

    #[test]
    fn upsert_replaces_in_place() {
        let bare = channel("general");
        let mut list = vec![channel("first"), bare.clone()];

        let mut full = bare.clone();
        full.description = Some("General discussion".into());
        upsert_by_id(&mut list, &full);
        assert_eq!(list.len(), 2);
        assert_eq!(list[1], full);

        let extra = channel("extra");
        upsert_by_id(&mut list, &extra);
        assert_eq!(list.last().map(|c| c.id), Some(extra.id));
    }
}
