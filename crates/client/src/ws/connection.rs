//! WebSocket connection with state management and auto-reconnect.
//!
//! The connection loop owns the only live transport. It opens a transport,
//! pumps frames into the [`SubscriberRegistry`] until the transport closes,
//! then sleeps for the backoff delay and tries again. `Connect` and `Stop`
//! commands interrupt whichever wait is in progress.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_channel::mpsc::UnboundedReceiver;
use futures_util::StreamExt;
use synapse_shared::{decode_frame, Decoded};
use tokio::sync::watch;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use super::backoff::RetryState;
use super::registry::SubscriberRegistry;

/// Connection state for the updates channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting { attempt: u32 },
    Connected,
    Reconnecting { attempt: u32, delay_ms: u64 },
    Failed { reason: String },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting { .. } | ConnectionState::Reconnecting { .. }
        )
    }
}

/// Transport-level failures. These never escape the connection loop.
#[derive(Debug, thiserror::Error)]
pub enum WsError {
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("read failed: {0}")]
    Read(String),
}

/// One open, receive-only connection.
#[async_trait]
pub trait Transport: Send {
    /// Next text frame; `None` once the peer closed or the stream ended.
    async fn recv(&mut self) -> Option<Result<String, WsError>>;

    /// Close the transport, sending a close frame if it is still open.
    async fn close(&mut self);
}

/// Opens transports to a URL.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, WsError>;
}

/// Production connector backed by tokio-tungstenite.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, WsError> {
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|e| WsError::Handshake(e.to_string()))?;
        Ok(Box::new(TungsteniteTransport { stream }))
    }
}

struct TungsteniteTransport {
    stream: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
}

#[async_trait]
impl Transport for TungsteniteTransport {
    async fn recv(&mut self) -> Option<Result<String, WsError>> {
        while let Some(msg_result) = self.stream.next().await {
            match msg_result {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(Message::Close(frame)) => {
                    tracing::debug!("received close frame: {:?}", frame);
                    return None;
                }
                Ok(Message::Ping(data)) => {
                    // Pong is handled automatically by tungstenite
                    tracing::trace!("received ping: {:?}", data);
                }
                Ok(_) => {
                    // Ignore binary, pong, etc.
                }
                Err(e) => return Some(Err(WsError::Read(e.to_string()))),
            }
        }
        None
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!("close after shutdown: {}", e);
        }
    }
}

/// Commands accepted by the connection loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    /// Drop the current transport or pending timer and connect now.
    Connect,
    Stop,
}

/// Everything the connection loop owns.
pub(crate) struct ConnectionLoop {
    pub url: String,
    pub connector: Arc<dyn Connector>,
    pub retry: RetryState,
    pub state: Arc<watch::Sender<ConnectionState>>,
    pub generation: u64,
    pub current_generation: Arc<AtomicU64>,
    pub registry: SubscriberRegistry,
    pub commands: UnboundedReceiver<Command>,
}

enum Next {
    Reconnect,
    ConnectNow,
    Stop,
}

impl ConnectionLoop {
    /// Publish `state` unless a newer loop has been started since this one.
    fn set_state(&self, state: ConnectionState) {
        self.state.send_if_modified(|current| {
            if self.current_generation.load(Ordering::SeqCst) != self.generation {
                return false;
            }
            *current = state;
            true
        });
    }

    fn on_command(cmd: Option<Command>) -> Next {
        match cmd {
            Some(Command::Connect) => Next::ConnectNow,
            // Every client handle is gone when the channel closes.
            Some(Command::Stop) | None => Next::Stop,
        }
    }

    pub(crate) async fn run(mut self) {
        tracing::info!("updates connection loop started for {}", self.url);

        loop {
            let next = self.connect_once().await;

            let next = match next {
                Next::Reconnect => self.wait_backoff().await,
                other => other,
            };

            match next {
                Next::Reconnect | Next::ConnectNow => continue,
                Next::Stop => break,
            }
        }

        self.set_state(ConnectionState::Disconnected);
        tracing::info!("updates connection loop for {} stopped", self.url);
    }

    /// Open one transport and read it until it closes.
    async fn connect_once(&mut self) -> Next {
        self.set_state(ConnectionState::Connecting {
            attempt: self.retry.attempt(),
        });

        let connector = Arc::clone(&self.connector);
        let connecting = connector.connect(&self.url);
        let outcome = tokio::select! {
            biased;
            cmd = self.commands.next() => return Self::on_command(cmd),
            outcome = connecting => outcome,
        };

        let mut transport = match outcome {
            Ok(transport) => transport,
            Err(e) => {
                tracing::warn!("updates connection to {} failed: {}", self.url, e);
                return Next::Reconnect;
            }
        };

        self.retry.reset();
        self.set_state(ConnectionState::Connected);
        tracing::info!("updates channel connected to {}", self.url);

        let next = loop {
            tokio::select! {
                biased;
                cmd = self.commands.next() => break Self::on_command(cmd),
                frame = transport.recv() => match frame {
                    Some(Ok(text)) => self.dispatch(&text),
                    Some(Err(e)) => {
                        tracing::warn!("updates channel error: {}", e);
                        break Next::Reconnect;
                    }
                    None => {
                        tracing::info!("updates channel to {} closed", self.url);
                        break Next::Reconnect;
                    }
                },
            }
        };

        // Not connected from here on, even while the close handshake runs.
        self.set_state(match next {
            Next::ConnectNow => ConnectionState::Connecting {
                attempt: self.retry.attempt(),
            },
            Next::Reconnect | Next::Stop => ConnectionState::Disconnected,
        });
        transport.close().await;
        next
    }

    /// Sleep for the backoff delay unless a command arrives first.
    async fn wait_backoff(&mut self) -> Next {
        let attempt = self.retry.attempt();
        if self.retry.config().is_exhausted(attempt) {
            let reason = format!(
                "Max reconnect attempts ({}) exceeded",
                self.retry.config().max_attempts
            );
            tracing::error!("giving up on {}: {}", self.url, reason);
            self.set_state(ConnectionState::Failed { reason });
            // Only an explicit connect or stop moves on from here.
            return Self::on_command(self.commands.next().await);
        }

        let delay = self.retry.next_delay();
        self.set_state(ConnectionState::Reconnecting {
            attempt: self.retry.attempt(),
            delay_ms: delay.as_millis() as u64,
        });
        tracing::info!(
            "reconnecting to {} in {}ms (attempt {})",
            self.url,
            delay.as_millis(),
            self.retry.attempt()
        );

        tokio::select! {
            biased;
            cmd = self.commands.next() => Self::on_command(cmd),
            _ = tokio::time::sleep(delay) => Next::Reconnect,
        }
    }

    fn dispatch(&self, text: &str) {
        match decode_frame(text) {
            Ok(Decoded::Event(event)) => {
                let delivered = self.registry.dispatch(&event);
                tracing::debug!("{} delivered to {} handler(s)", event.kind(), delivered);
            }
            Ok(Decoded::Unknown(envelope)) => {
                tracing::debug!("ignoring unknown event type `{}`", envelope.kind);
            }
            Err(e) => {
                tracing::warn!("dropping frame: {}", e);
            }
        }
    }
}
