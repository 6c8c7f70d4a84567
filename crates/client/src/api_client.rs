//! HTTP API client for the backend's REST endpoints.

use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use synapse_shared::{ApiError, HEALTH_PATH, PROFILES_PATH, SONAR_HEALTH_PATH};

/// Body of the backend health endpoints. Fields beyond `status` vary by
/// deployment and are kept as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    #[serde(default)]
    pub status: String,
    #[serde(flatten)]
    pub details: serde_json::Map<String, Value>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self.status.to_ascii_lowercase().as_str(), "ok" | "healthy" | "up")
    }
}

/// HTTP client for the Synapse backend.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new API client
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: String::new(),
        }
    }

    /// Set the base URL for API requests
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if self.base_url.is_empty() {
            if path.starts_with('/') {
                path.to_string()
            } else {
                format!("/{path}")
            }
        } else {
            let base = self.base_url.trim_end_matches('/');
            let path = path.trim_start_matches('/');
            format!("{base}/{path}")
        }
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ApiError> {
        let url = self.url(path);
        let url = reqwest::Url::parse(&url).map_err(|e| ApiError::InvalidUrl(format!("{url}: {e}")))?;
        Ok(self.client.request(method, url))
    }

    /// Send and return the body of a successful response.
    async fn send_raw(&self, rb: RequestBuilder) -> Result<String, ApiError> {
        let resp = rb.send().await.map_err(|e| ApiError::Network(e.to_string()))?;

        let status = resp.status().as_u16();
        let is_success = resp.status().is_success();
        let text = resp
            .text()
            .await
            .map_err(|e| ApiError::Network(format!("failed to read body: {e}")))?;

        if !is_success {
            tracing::debug!("request failed with {}: {}", status, text);
            return Err(ApiError::from_response(status, &text));
        }
        Ok(text)
    }

    async fn send<TRes: DeserializeOwned>(&self, rb: RequestBuilder) -> Result<TRes, ApiError> {
        let text = self.send_raw(rb).await?;
        if text.is_empty() {
            serde_json::from_str("null").map_err(|e| ApiError::Deserialize(e.to_string()))
        } else {
            serde_json::from_str(&text).map_err(|e| ApiError::Deserialize(e.to_string()))
        }
    }

    async fn send_json<TReq: Serialize, TRes: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, ApiError> {
        let body_bytes =
            serde_json::to_vec(body).map_err(|e| ApiError::Deserialize(e.to_string()))?;
        let rb = self
            .request(method, path)?
            .body(body_bytes)
            .header("Content-Type", "application/json");
        self.send(rb).await
    }

    pub async fn get_json<TRes: DeserializeOwned>(&self, path: &str) -> Result<TRes, ApiError> {
        self.send(self.request(Method::GET, path)?).await
    }

    pub async fn post_json<TReq: Serialize, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, ApiError> {
        self.send_json(Method::POST, path, body).await
    }

    pub async fn put_json<TReq: Serialize, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, ApiError> {
        self.send_json(Method::PUT, path, body).await
    }

    pub async fn patch_json<TReq: Serialize, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, ApiError> {
        self.send_json(Method::PATCH, path, body).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.send_raw(self.request(Method::DELETE, path)?).await?;
        Ok(())
    }

    // --- Backend boundary endpoints ---

    /// `GET /health`
    pub async fn health(&self) -> Result<HealthStatus, ApiError> {
        self.get_json(HEALTH_PATH).await
    }

    /// `GET /api/health/sonar`
    pub async fn sonar_health(&self) -> Result<HealthStatus, ApiError> {
        self.get_json(SONAR_HEALTH_PATH).await
    }

    /// `GET /api/v1/profiles`; the profile shape is owned by the backend.
    pub async fn list_profiles(&self) -> Result<Value, ApiError> {
        self.get_json(PROFILES_PATH).await
    }
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new()
    }
}
