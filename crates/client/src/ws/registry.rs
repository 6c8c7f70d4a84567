//! Subscriber registry: fan-out of server events to independent handlers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use synapse_shared::ServerEvent;

/// Receives events from the updates channel.
///
/// Implement only the callbacks you care about; the rest are no-ops. Handlers
/// that prefer a single entry point override [`EventHandler::on_event`]
/// instead. Closures taking `&ServerEvent` are handlers too.
pub trait EventHandler: Send + Sync {
    fn on_pipeline_update(&self, _data: &Value) {}

    fn on_log_entry(&self, _data: &Value) {}

    fn on_profile_change(&self, _data: &Value) {}

    fn on_schedule_update(&self, _data: &Value) {}

    fn on_queue_update(&self, _data: &Value) {}

    fn on_event(&self, event: &ServerEvent) {
        match event {
            ServerEvent::PipelineUpdate(data) => self.on_pipeline_update(data),
            ServerEvent::LogEntry(data) => self.on_log_entry(data),
            ServerEvent::ProfileChange(data) => self.on_profile_change(data),
            ServerEvent::ScheduleUpdate(data) => self.on_schedule_update(data),
            ServerEvent::QueueUpdate(data) => self.on_queue_update(data),
        }
    }
}

impl<F> EventHandler for F
where
    F: Fn(&ServerEvent) + Send + Sync,
{
    fn on_event(&self, event: &ServerEvent) {
        self(event)
    }
}

struct Entry {
    token: u64,
    handler: Arc<dyn EventHandler>,
}

#[derive(Default)]
struct Handlers {
    // Keyed by the handler's allocation address; the token guards against a
    // stale subscription removing a later handler at a reused address.
    entries: HashMap<usize, Entry>,
}

/// Set of active handlers, unique by `Arc` identity.
#[derive(Clone, Default)]
pub struct SubscriberRegistry {
    handlers: Arc<Mutex<Handlers>>,
    next_token: Arc<AtomicU64>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Handlers> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe<H: EventHandler + 'static>(&self, handler: Arc<H>) -> Subscription {
        self.subscribe_dyn(handler)
    }

    /// Register a handler; registering the same `Arc` again is a no-op.
    pub fn subscribe_dyn(&self, handler: Arc<dyn EventHandler>) -> Subscription {
        let key = Arc::as_ptr(&handler) as *const () as usize;
        let mut handlers = self.lock();

        let token = match handlers.entries.get(&key) {
            Some(existing) => existing.token,
            None => {
                let token = self.next_token.fetch_add(1, Ordering::Relaxed);
                handlers.entries.insert(key, Entry { token, handler });
                token
            }
        };

        Subscription {
            registry: self.clone(),
            key,
            token,
        }
    }

    fn remove(&self, key: usize, token: u64) {
        let mut handlers = self.lock();
        if handlers
            .entries
            .get(&key)
            .is_some_and(|entry| entry.token == token)
        {
            handlers.entries.remove(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver an event to every registered handler.
    ///
    /// The lock is released before handlers run so they can subscribe or
    /// unsubscribe from inside a callback.
    pub fn dispatch(&self, event: &ServerEvent) -> usize {
        let snapshot: Vec<Arc<dyn EventHandler>> = self
            .lock()
            .entries
            .values()
            .map(|entry| Arc::clone(&entry.handler))
            .collect();

        for handler in &snapshot {
            handler.on_event(event);
        }
        snapshot.len()
    }
}

impl std::fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("handlers", &self.len())
            .finish()
    }
}

/// Returned by `subscribe`; call [`Subscription::unsubscribe`] to remove the handler.
///
/// Dropping a subscription leaves the handler registered.
#[derive(Clone)]
#[must_use = "keep the subscription to be able to unsubscribe"]
pub struct Subscription {
    registry: SubscriberRegistry,
    key: usize,
    token: u64,
}

impl Subscription {
    /// Remove exactly this handler. Calling it again is harmless.
    pub fn unsubscribe(&self) {
        self.registry.remove(self.key, self.token);
    }

    pub fn is_active(&self) -> bool {
        self.registry
            .lock()
            .entries
            .get(&self.key)
            .is_some_and(|entry| entry.token == self.token)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("token", &self.token)
            .field("active", &self.is_active())
            .finish()
    }
}
