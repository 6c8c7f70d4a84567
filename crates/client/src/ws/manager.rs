//! The updates client: one live channel to the backend, shared by every consumer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_channel::mpsc::{unbounded, UnboundedSender};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::backoff::{ReconnectConfig, RetryState};
use super::connection::{
    Command, ConnectionLoop, ConnectionState, Connector, TungsteniteConnector,
};
use super::registry::{EventHandler, SubscriberRegistry, Subscription};
use crate::config::ClientConfig;

struct Running {
    commands: UnboundedSender<Command>,
    task: JoinHandle<()>,
}

struct Inner {
    url: String,
    connector: Arc<dyn Connector>,
    retry: RetryState,
    registry: SubscriberRegistry,
    state: Arc<watch::Sender<ConnectionState>>,
    // Bumped on every start; only the newest loop publishes state.
    generation: Arc<AtomicU64>,
    running: Mutex<Option<Running>>,
}

/// Handle to the live-updates channel.
///
/// Cheap to clone; all clones share one connection loop, one retry counter
/// and one subscriber registry. Nothing happens until [`UpdatesClient::start`]
/// (or [`UpdatesClient::connect`]) is called inside a tokio runtime. Dropping
/// the last clone ends the loop.
#[derive(Clone)]
pub struct UpdatesClient {
    inner: Arc<Inner>,
}

impl UpdatesClient {
    /// Build a client for the configured API base, using the tungstenite connector.
    pub fn from_config(config: &ClientConfig) -> Result<Self, synapse_shared::ProtocolError> {
        let url = config.updates_url()?;
        Ok(Self::new(url.as_str(), config.reconnect.clone()))
    }

    pub fn new(url: impl Into<String>, reconnect: ReconnectConfig) -> Self {
        Self::with_connector(url, reconnect, Arc::new(TungsteniteConnector))
    }

    pub fn with_connector(
        url: impl Into<String>,
        reconnect: ReconnectConfig,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                url: url.into(),
                connector,
                retry: RetryState::new(reconnect),
                registry: SubscriberRegistry::new(),
                state: Arc::new(state),
                generation: Arc::new(AtomicU64::new(0)),
                running: Mutex::new(None),
            }),
        }
    }

    fn running(&self) -> MutexGuard<'_, Option<Running>> {
        self.inner
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Spawn the connection loop. No-op while it is already running.
    pub fn start(&self) {
        let mut running = self.running();
        if running.as_ref().is_some_and(|r| !r.task.is_finished()) {
            tracing::debug!("updates client for {} already running", self.inner.url);
            return;
        }

        let (commands, receiver) = unbounded();
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let connection = ConnectionLoop {
            url: self.inner.url.clone(),
            connector: Arc::clone(&self.inner.connector),
            retry: self.inner.retry.clone(),
            state: Arc::clone(&self.inner.state),
            generation,
            current_generation: Arc::clone(&self.inner.generation),
            registry: self.inner.registry.clone(),
            commands: receiver,
        };
        let task = tokio::spawn(connection.run());
        *running = Some(Running { commands, task });
    }

    /// Connect now.
    ///
    /// Cancels a pending reconnect timer and closes any open or in-flight
    /// transport before opening a new one. Starts the loop if needed.
    pub fn connect(&self) {
        {
            let running = self.running();
            if let Some(r) = running.as_ref().filter(|r| !r.task.is_finished()) {
                if r.commands.unbounded_send(Command::Connect).is_ok() {
                    return;
                }
            }
        }
        self.start();
    }

    /// Tear down: cancel any pending reconnect, close the transport and wait
    /// for the loop to exit. No reconnect happens afterwards.
    pub async fn stop(&self) {
        let running = self.running().take();
        let Some(Running { commands, task }) = running else {
            return;
        };

        let _ = commands.unbounded_send(Command::Stop);
        // A loop that exits normally publishes `Disconnected` itself.
        if let Err(e) = task.await {
            tracing::error!("updates connection loop ended abnormally: {}", e);
            if self.running().is_none() {
                self.inner
                    .state
                    .send_replace(ConnectionState::Disconnected);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running()
            .as_ref()
            .is_some_and(|r| !r.task.is_finished())
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state.borrow().is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.borrow().clone()
    }

    /// Receiver that observes every state transition.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Failed attempts since the last successful connection.
    pub fn retry_attempt(&self) -> u32 {
        self.inner.retry.attempt()
    }

    pub fn subscribe<H: EventHandler + 'static>(&self, handler: Arc<H>) -> Subscription {
        self.inner.registry.subscribe(handler)
    }

    pub fn subscribe_dyn(&self, handler: Arc<dyn EventHandler>) -> Subscription {
        self.inner.registry.subscribe_dyn(handler)
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.registry.len()
    }
}

impl std::fmt::Debug for UpdatesClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdatesClient")
            .field("url", &self.inner.url)
            .field("state", &*self.inner.state.borrow())
            .field("subscribers", &self.inner.registry.len())
            .finish()
    }
}
