//! WebSocket module for the backend's live-updates channel.
//!
//! This module provides:
//! - One managed connection with capped exponential-backoff reconnect
//! - A subscriber registry fanning typed events out to independent handlers
//! - A provider scope with hooks for code that should not own the client
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  UpdatesProvider                    │
//! │     (scope that starts, exposes and stops it)       │
//! └─────────────────────────────────────────────────────┘
//!                         │
//!                         ▼
//! ┌─────────────────────────────────────────────────────┐
//! │                  UpdatesClient                      │
//! │   start / connect / stop / subscribe / is_connected │
//! └─────────────────────────────────────────────────────┘
//!                         │
//!                         ▼
//! ┌─────────────────────────────────────────────────────┐
//! │                 ConnectionLoop                      │
//! │  owns the Transport and RetryState, sleeps between  │
//! │  attempts, decodes frames                           │
//! └─────────────────────────────────────────────────────┘
//!                         │
//!                         ▼
//!              ┌─────────────────────┐
//!              │ SubscriberRegistry  │
//!              └─────────────────────┘
//!                         │
//!          ┌──────────────┼──────────────┐
//!          ▼              ▼              ▼
//!   ┌────────────┐ ┌────────────┐ ┌────────────┐
//!   │  Handler   │ │  Handler   │ │  Handler   │
//!   │ (logs)     │ │ (pipeline) │ │ (queue)    │
//!   └────────────┘ └────────────┘ └────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! let client = UpdatesClient::from_config(&ClientConfig::from_env())?;
//!
//! UpdatesProvider::new(client)
//!     .run(async {
//!         let sub = use_subscribe(Arc::new(|event: &ServerEvent| {
//!             tracing::info!("{}: {}", event.kind(), event.data());
//!         }));
//!         // ...
//!         sub.unsubscribe();
//!     })
//!     .await;
//! ```

mod backoff;
mod connection;
mod hooks;
mod manager;
mod registry;

pub use backoff::{ReconnectConfig, ReconnectConfigError, RetryState};
pub use connection::{ConnectionState, Connector, Transport, TungsteniteConnector, WsError};
pub use hooks::{
    try_use_updates, use_connection_state, use_is_connected, use_subscribe, use_updates,
    ProviderError, UpdatesProvider,
};
pub use manager::UpdatesClient;
pub use registry::{EventHandler, SubscriberRegistry, Subscription};
