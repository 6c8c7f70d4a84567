//! Synapse Client - live-updates channel and REST access for the dashboard
//!
//! This crate holds the non-visual core of the Synapse dashboard front end:
//! the WebSocket connection manager that keeps one reconnecting channel to the
//! backend and fans events out to subscribers, plus the REST client and
//! configuration it is wired with.

pub mod api_client;
pub mod config;
pub mod logging;
pub mod ws;

pub use api_client::{ApiClient, HealthStatus};
pub use config::ClientConfig;
pub use synapse_shared::{EventKind, ServerEvent};
pub use ws::{
    ConnectionState, EventHandler, ReconnectConfig, Subscription, UpdatesClient, UpdatesProvider,
};
