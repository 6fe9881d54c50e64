//! HTTP transport for the catalog API.
//!
//! [`CatalogTransport`] is the seam between the catalog operations and the
//! network: it takes a path below the base URL plus query parameters and
//! returns the decoded JSON document. [`HttpTransport`] is the reqwest
//! implementation with retries and a circuit breaker; tests plug in an
//! in-memory catalog instead.

use std::io::Write;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::api_config::{ApiConfig, RecoveryConfig};
use crate::api_errors::ApiError;
use crate::circuit_breaker::CircuitBreaker;

/// Query parameters as sent on the wire
pub type QueryParams = Vec<(String, String)>;

/// Fetches JSON documents from the catalog
#[async_trait]
pub trait CatalogTransport: Send + Sync {
    /// GET `path` (relative to the catalog base URL) and decode the body
    async fn get_json(&self, path: &str, params: &QueryParams) -> Result<Value, ApiError>;

    /// Download an absolute URL into a temporary file
    async fn download(&self, url: &str) -> Result<NamedTempFile, ApiError>;
}

/// reqwest-backed transport with retry and circuit breaking
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    recovery: RecoveryConfig,
    breaker: CircuitBreaker,
}

impl HttpTransport {
    /// Create a configured asynchronous HTTP transport
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let client = Self::client_builder(config)
            .build()
            .map_err(|e| ApiError::transport(&config.base_url, e))?;
        Ok(Self::with_client(client, config))
    }

    fn client_builder(config: &ApiConfig) -> reqwest::ClientBuilder {
        reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
    }

    fn with_client(client: reqwest::Client, config: &ApiConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            recovery: config.recovery.clone(),
            breaker: CircuitBreaker::new(config.recovery.clone()),
        }
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send_once(&self, url: &str, params: &QueryParams) -> Result<reqwest::Response, ApiError> {
        let response = self
            .client
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(|e| ApiError::transport(url, e))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response)
    }

    /// Send with retries, feeding outcomes to the circuit breaker
    async fn send(&self, url: &str, params: &QueryParams) -> Result<reqwest::Response, ApiError> {
        if self.breaker.is_open() {
            return Err(ApiError::CircuitOpen);
        }

        let mut attempt = 0;
        loop {
            match self.send_once(url, params).await {
                Ok(response) => {
                    self.breaker.record_success();
                    return Ok(response);
                }
                Err(err) => {
                    if err.counts_as_outage() {
                        self.breaker.record_failure();
                    }
                    if !err.is_retryable() || attempt >= self.recovery.max_retries || self.breaker.is_open() {
                        return Err(err);
                    }
                    let delay = jittered(self.recovery.backoff_delay(attempt));
                    warn!(url = %url, attempt = attempt + 1, delay_ms = delay.as_millis() as u64, error = %err, "Retrying upstream request");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Add up to 25% random jitter to a delay
fn jittered(delay: Duration) -> Duration {
    let max_jitter = (delay.as_millis() as u64) / 4;
    if max_jitter == 0 {
        return delay;
    }
    let jitter = rand::thread_rng().gen_range(0..=max_jitter);
    delay + Duration::from_millis(jitter)
}

#[async_trait]
impl CatalogTransport for HttpTransport {
    async fn get_json(&self, path: &str, params: &QueryParams) -> Result<Value, ApiError> {
        let url = self.url_for(path);
        debug!(url = %url, ?params, "GET catalog document");

        let response = self.send(&url, params).await?;
        let body = response
            .bytes()
            .await
            .map_err(|e| ApiError::transport(&url, e))?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn download(&self, url: &str) -> Result<NamedTempFile, ApiError> {
        let response = self.send(url, &QueryParams::new()).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ApiError::transport(url, e))?;

        let mut temp_file =
            NamedTempFile::new().map_err(|e| ApiError::transport(url, format!("temp file: {e}")))?;
        temp_file
            .as_file_mut()
            .write_all(&bytes)
            .map_err(|e| ApiError::transport(url, format!("temp file write: {e}")))?;

        debug!(url = %url, bytes = bytes.len(), path = %temp_file.path().display(), "Export downloaded");
        Ok(temp_file)
    }
}
