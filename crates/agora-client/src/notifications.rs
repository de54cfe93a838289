//! Per-user notifications and the cached unread count.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use agora_shared::{Notification, NotificationId, UserId};

use crate::gateway::Gateway;
use crate::state::{impl_has_status, prepend_unique, Observable, Status};

#[derive(Debug, Clone, Default)]
pub struct NotificationState {
    /// Newest first.
    pub notifications: Vec<Notification>,
    /// Recounted on fetch, adjusted locally afterwards.
    pub unread_count: usize,
    pub status: Status,
}
impl_has_status!(NotificationState);

pub struct NotificationStore {
    gateway: Arc<dyn Gateway>,
    state: Observable<NotificationState>,
}

impl NotificationStore {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self {
            gateway,
            state: Observable::new(),
        }
    }

    pub fn snapshot(&self) -> NotificationState {
        self.state.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<NotificationState> {
        self.state.subscribe()
    }

    pub async fn fetch_notifications(&self, user: UserId) {
        self.state.begin();
        let result = self.gateway.list_notifications(user).await;
        self.state.complete("fetch_notifications", result, |state, rows| {
            state.notifications = rows.clone();
            state.unread_count = rows.iter().filter(|n| !n.is_read).count();
            debug!(user = %user.short(), unread = state.unread_count, "notifications fetched");
        });
    }

    /// Only a notification that was unread locally lowers the count.
    pub async fn mark_as_read(&self, id: NotificationId) -> bool {
        self.state.begin();
        let result = self.gateway.mark_notification_read(id).await;
        self.state
            .complete("mark_as_read", result, |state, _| {
                if let Some(n) = state.notifications.iter_mut().find(|n| n.id == id) {
                    if !n.is_read {
                        n.is_read = true;
                        state.unread_count = state.unread_count.saturating_sub(1);
                    }
                }
            })
            .is_some()
    }

    pub async fn mark_all_as_read(&self, user: UserId) -> bool {
        self.state.begin();
        let result = self.gateway.mark_all_notifications_read(user).await;
        self.state
            .complete("mark_all_as_read", result, |state, _| {
                for n in &mut state.notifications {
                    n.is_read = true;
                }
                state.unread_count = 0;
            })
            .is_some()
    }

    /// Reconcile a pushed notification.
    pub fn add_notification(&self, notification: Notification) {
        self.state.update(|state| {
            if prepend_unique(&mut state.notifications, &notification) && !notification.is_read {
                state.unread_count += 1;
            }
        });
    }
}
