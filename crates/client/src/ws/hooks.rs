//! Provider scope and hooks for code that consumes the updates channel.
//!
//! [`UpdatesProvider::run`] installs a client as the current provider for the
//! duration of a future. Inside that future the `use_*` hooks reach the
//! client without it being threaded through every call. Outside a provider
//! they panic: a missing provider is a wiring mistake, not a runtime
//! condition.

use std::future::Future;
use std::sync::Arc;

use super::connection::ConnectionState;
use super::manager::UpdatesClient;
use super::registry::{EventHandler, Subscription};

tokio::task_local! {
    static CURRENT: UpdatesClient;
}

/// Returned by [`try_use_updates`] outside a provider scope.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("no UpdatesProvider in scope; wrap the caller in UpdatesProvider::run")]
    Missing,
}

/// Owns an [`UpdatesClient`] for the lifetime of a scope.
#[derive(Debug, Clone)]
pub struct UpdatesProvider {
    client: UpdatesClient,
}

impl UpdatesProvider {
    pub fn new(client: UpdatesClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &UpdatesClient {
        &self.client
    }

    /// Start the client, run `fut` with it as the current provider, then stop it.
    pub async fn run<F: Future>(self, fut: F) -> F::Output {
        self.client.start();
        let output = CURRENT.scope(self.client.clone(), fut).await;
        self.client.stop().await;
        output
    }

    /// Run `fut` with the client as current provider without touching its lifecycle.
    pub async fn scope<F: Future>(&self, fut: F) -> F::Output {
        CURRENT.scope(self.client.clone(), fut).await
    }
}

pub fn try_use_updates() -> Result<UpdatesClient, ProviderError> {
    CURRENT
        .try_with(UpdatesClient::clone)
        .map_err(|_| ProviderError::Missing)
}

/// The current provider's client.
///
/// # Panics
///
/// Panics when called outside [`UpdatesProvider::run`] or [`UpdatesProvider::scope`].
pub fn use_updates() -> UpdatesClient {
    match try_use_updates() {
        Ok(client) => client,
        Err(e) => panic!("use_updates: {e}"),
    }
}

/// # Panics
///
/// Panics outside a provider scope.
pub fn use_is_connected() -> bool {
    use_updates().is_connected()
}

/// # Panics
///
/// Panics outside a provider scope.
pub fn use_connection_state() -> ConnectionState {
    use_updates().state()
}

/// Register `handler` with the current provider.
///
/// # Panics
///
/// Panics outside a provider scope.
pub fn use_subscribe<H: EventHandler + 'static>(handler: Arc<H>) -> Subscription {
    use_updates().subscribe(handler)
}
