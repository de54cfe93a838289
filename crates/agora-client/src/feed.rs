//! In-process change-feed fan-out.
//!
//! Every subscriber owns a bounded channel. Publishing never blocks the
//! writer: an event for a subscriber whose buffer is full is dropped and the
//! next fetch reconciles that view.

use std::sync::Mutex;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use agora_shared::{ChangeEvent, Topic};

use crate::gateway::Subscription;

#[derive(Default)]
pub struct FeedBroker {
    subscribers: Mutex<Vec<(Topic, mpsc::Sender<ChangeEvent>)>>,
}

impl FeedBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, topic: Topic, buffer: usize) -> Subscription {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let mut subscribers = self.lock();
        subscribers.push((topic, tx));
        debug!(%topic, subscribers = subscribers.len(), "change feed subscription opened");
        Subscription::new(topic, rx)
    }

    /// Deliver `event` to every live subscriber of its topic and return how
    /// many received it. Closed subscriptions are pruned here.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        let mut subscribers = self.lock();
        subscribers.retain(|(_, tx)| !tx.is_closed());

        let mut delivered = 0;
        for (topic, tx) in subscribers.iter() {
            if *topic != event.topic {
                continue;
            }
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(%topic, "Dropping change event for slow subscriber");
                }
                Err(TrySendError::Closed(_)) => {}
            }
        }
        delivered
    }

    /// Number of subscriptions that have not been cancelled yet.
    pub fn subscriber_count(&self) -> usize {
        self.lock().iter().filter(|(_, tx)| !tx.is_closed()).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(Topic, mpsc::Sender<ChangeEvent>)>> {
        // The list stays consistent even if a holder panicked mid-publish.
        self.subscribers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
