//! Request gateway - the single HTTP retry point
//!
//! Every call to a collaborator service goes through here. The gateway
//! attaches the current bearer token, retries transient failures with
//! exponential backoff, and on an authorization failure asks the session
//! coordinator for a refreshed token exactly once per originating request.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use reqwest::{Client, Method};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::HttpConfig;
use crate::session::{SessionError, SessionTokenCoordinator};

/// Maximum random jitter added to each backoff
const BACKOFF_JITTER_MS: u64 = 250;

/// Check if an HTTP status code is retryable
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

/// Errors from gateway requests
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    /// Check if this error is retryable at the gateway level
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::ApiError { status, .. } => is_retryable_status(*status),
            GatewayError::Network(_) => true,
            GatewayError::Session(_) => false,
            GatewayError::InvalidResponse(_) => false,
        }
    }

    /// True when the session is gone and the user must log in again
    pub fn is_session_expired(&self) -> bool {
        matches!(self, GatewayError::Session(SessionError::Expired))
    }
}

/// Issues HTTP calls with bearer credentials, retry, and refresh-on-401
pub struct RequestGateway {
    http: Client,
    session: Arc<SessionTokenCoordinator>,
    max_retries: u32,
    initial_backoff_ms: u64,
}

impl RequestGateway {
    pub fn from_config(config: &HttpConfig, session: Arc<SessionTokenCoordinator>) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(GatewayError::Network)?;

        Ok(Self {
            http,
            session,
            max_retries: config.max_retries,
            initial_backoff_ms: config.initial_backoff_ms,
        })
    }

    /// GET with query parameters, returning the JSON body
    pub async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<serde_json::Value, GatewayError> {
        self.execute(Method::GET, url, Some(query), None).await
    }

    /// POST a JSON body, returning the JSON response
    pub async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<serde_json::Value, GatewayError> {
        self.execute(Method::POST, url, None, Some(body)).await
    }

    async fn execute(
        &self,
        method: Method,
        url: &str,
        query: Option<&[(&str, String)]>,
        body: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value, GatewayError> {
        // One 401-triggered refresh per originating request; a second 401
        // means the refreshed token is also bad
        let mut refreshed = false;
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = self.backoff_ms(attempt);
                warn!(attempt, backoff_ms = backoff, %url, "execute: retrying after transient error");
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }

            let token = self.session.access_token()?;
            let mut request = self.http.request(method.clone(), url).bearer_auth(&token);
            if let Some(query) = query {
                request = request.query(query);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = match request.send().await {
                Ok(r) => r,
                Err(e) => {
                    debug!(attempt, error = %e, "execute: network error");
                    last_error = Some(GatewayError::Network(e));
                    continue;
                }
            };

            let status = response.status().as_u16();

            if status == 401 {
                if refreshed {
                    debug!("execute: still unauthorized after refresh");
                    return Err(GatewayError::Session(SessionError::Expired));
                }
                refreshed = true;
                debug!("execute: unauthorized, requesting token refresh");
                self.session.refresh().await?;
                last_error = Some(GatewayError::ApiError {
                    status,
                    message: "unauthorized".to_string(),
                });
                continue;
            }

            if is_retryable_status(status) && attempt < self.max_retries {
                let message = response.text().await.unwrap_or_default();
                debug!(attempt, status, "execute: retryable status");
                last_error = Some(GatewayError::ApiError { status, message });
                continue;
            }

            if !response.status().is_success() {
                let message = response.text().await.unwrap_or_default();
                debug!(status, "execute: API error");
                return Err(GatewayError::ApiError { status, message });
            }

            return response
                .json()
                .await
                .map_err(|e| GatewayError::InvalidResponse(e.to_string()));
        }

        Err(last_error.unwrap_or_else(|| GatewayError::InvalidResponse("max retries exceeded".to_string())))
    }

    fn backoff_ms(&self, attempt: u32) -> u64 {
        let base = self.initial_backoff_ms * 2u64.pow(attempt.saturating_sub(1));
        base + rand::rng().random_range(0..=BACKOFF_JITTER_MS)
    }
}
