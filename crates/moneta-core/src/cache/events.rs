use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::{Deserialize, Serialize};

use crate::models::{Record, RecordKind};
use crate::period::PeriodKey;

/// Published after the backend accepted a write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MutationEvent {
    RecordAdded {
        record: Record,
    },
    /// The period is named explicitly since a deleted record's date is
    /// usually gone by the time the event fires.
    RecordDeleted {
        id: String,
        kind: RecordKind,
        period: PeriodKey,
    },
}

type Handler = Arc<dyn Fn(&MutationEvent) + Send + Sync>;

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    handlers: Vec<(u64, Handler)>,
}

fn lock(subscribers: &Mutex<Subscribers>) -> MutexGuard<'_, Subscribers> {
    subscribers.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-process publish/subscribe channel for record mutations.
///
/// Delivery is synchronous and in subscription order. Nothing is queued:
/// an event published with no subscribers is gone.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Subscribers>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&MutationEvent) + Send + Sync + 'static,
    {
        let mut subscribers = lock(&self.subscribers);
        let id = subscribers.next_id;
        subscribers.next_id += 1;
        subscribers.handlers.push((id, Arc::new(handler)));
        Subscription {
            id,
            subscribers: Arc::downgrade(&self.subscribers),
        }
    }

    pub fn publish(&self, event: MutationEvent) {
        // Snapshot so handlers may (un)subscribe while being called
        let handlers: Vec<Handler> = lock(&self.subscribers)
            .handlers
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        for handler in handlers {
            handler(&event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).handlers.len()
    }
}

/// Keeps a handler registered. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes the handler"]
pub struct Subscription {
    id: u64,
    subscribers: Weak<Mutex<Subscribers>>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(subscribers) = self.subscribers.upgrade() else {
            return;
        };
        // Released after the lock; a handler may own subscriptions of its own
        let removed: Vec<(u64, Handler)> = {
            let mut guard = lock(&subscribers);
            let (kept, removed) = std::mem::take(&mut guard.handlers)
                .into_iter()
                .partition(|(id, _)| *id != self.id);
            guard.handlers = kept;
            removed
        };
        drop(removed);
    }
}
