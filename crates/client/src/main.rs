//! Synapse Watch - headless view of the dashboard's live-updates channel
//!
//! Connects to the backend configured through `SYNAPSE_*` environment
//! variables, checks its health endpoint and logs every event until Ctrl-C.

use std::sync::Arc;

use anyhow::Context;
use serde_json::Value;
use synapse_client::{
    logging, ws::use_subscribe, ApiClient, ClientConfig, EventHandler, UpdatesClient,
    UpdatesProvider,
};

struct LogEvents;

impl EventHandler for LogEvents {
    fn on_pipeline_update(&self, data: &Value) {
        tracing::info!(target: "synapse_watch", "pipeline: {}", data);
    }

    fn on_log_entry(&self, data: &Value) {
        tracing::info!(target: "synapse_watch", "log: {}", data);
    }

    fn on_profile_change(&self, data: &Value) {
        tracing::info!(target: "synapse_watch", "profile: {}", data);
    }

    fn on_schedule_update(&self, data: &Value) {
        tracing::info!(target: "synapse_watch", "schedule: {}", data);
    }

    fn on_queue_update(&self, data: &Value) {
        tracing::info!(target: "synapse_watch", "queue: {}", data);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();

    let config = ClientConfig::from_env();
    tracing::info!("using API at {}", config.api_url);

    let api = ApiClient::new().with_base_url(config.api_url.clone());
    match api.health().await {
        Ok(health) if health.is_healthy() => tracing::info!("backend healthy"),
        Ok(health) => tracing::warn!("backend reports status {:?}", health.status),
        Err(e) => tracing::warn!("health check failed: {}", e),
    }

    let client = UpdatesClient::from_config(&config)
        .with_context(|| format!("invalid SYNAPSE_API_URL {:?}", config.api_url))?;
    let mut states = client.watch_state();

    UpdatesProvider::new(client)
        .run(async move {
            let subscription = use_subscribe(Arc::new(LogEvents));

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    changed = states.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let state = states.borrow_and_update().clone();
                        tracing::info!("connection state: {:?}", state);
                    }
                }
            }

            subscription.unsubscribe();
        })
        .await;

    tracing::info!("stopped");
    Ok(())
}
