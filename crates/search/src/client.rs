//! Backend search client.
//!
//! All transport and server failures are mapped to [`SearchError`] here so the
//! scheduler never sees a raw `reqwest` error. Cancellation is reported as its
//! own variant so callers can drop it silently.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::protocol::{FILTER_PATH, QueryPayload, QueryResult};

/// Type alias for a boxed future that can be sent between threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchError {
    #[error("search request failed: {0}")]
    Transport(String),

    #[error("search failed with status {status}: {body}")]
    Server { status: u16, body: String },

    #[error("search response could not be decoded: {0}")]
    InvalidResponse(String),

    #[error("search request cancelled")]
    Cancelled,
}

impl SearchError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SearchError::Cancelled)
    }
}

/// Anything that can answer a property search.
///
/// Implementations must resolve to [`SearchError::Cancelled`] once `cancel`
/// fires, but callers never rely on that for correctness.
pub trait SearchBackend: Send + Sync {
    fn search(
        &self,
        payload: QueryPayload,
        cancel: CancellationToken,
    ) -> BoxFuture<'_, Result<QueryResult, SearchError>>;
}

#[derive(Debug, Clone)]
pub struct SearchClientConfig {
    /// API base, e.g. `https://api.example.com/v1`. Trailing slashes are ignored.
    pub base_url: String,
    pub timeout: Duration,
}

impl SearchClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(15),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> String {
        format!("{}{FILTER_PATH}", self.base_url.trim_end_matches('/'))
    }
}

/// HTTP implementation of [`SearchBackend`].
#[derive(Debug, Clone)]
pub struct HttpSearchClient {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpSearchClient {
    pub fn new(config: &SearchClientConfig) -> Result<Self, SearchError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SearchError::Transport(e.to_string()))?;
        Ok(Self::with_client(http, config))
    }

    pub fn with_client(http: reqwest::Client, config: &SearchClientConfig) -> Self {
        Self {
            http,
            endpoint: config.endpoint(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Post `payload`, giving up as soon as `cancel` fires.
    pub async fn search(
        &self,
        payload: &QueryPayload,
        cancel: &CancellationToken,
    ) -> Result<QueryResult, SearchError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SearchError::Cancelled),
            res = self.post(payload) => res,
        }
    }

    async fn post(&self, payload: &QueryPayload) -> Result<QueryResult, SearchError> {
        debug!(
            "POST {} ({} active filters)",
            self.endpoint,
            payload.filters.len()
        );

        let resp = self
            .http
            .post(&self.endpoint)
            .json(payload)
            .send()
            .await
            .map_err(|e| SearchError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = match resp.text().await {
                Ok(body) => body,
                Err(e) => {
                    debug!("could not read error body from {}: {e}", self.endpoint);
                    format!("<unreadable body: {e}>")
                }
            };
            warn!("property search returned {status}");
            return Err(SearchError::Server {
                status: status.as_u16(),
                body,
            });
        }

        resp.json::<QueryResult>()
            .await
            .map_err(|e| SearchError::InvalidResponse(e.to_string()))
    }
}

impl SearchBackend for HttpSearchClient {
    fn search(
        &self,
        payload: QueryPayload,
        cancel: CancellationToken,
    ) -> BoxFuture<'_, Result<QueryResult, SearchError>> {
        Box::pin(async move { HttpSearchClient::search(self, &payload, &cancel).await })
    }
}
