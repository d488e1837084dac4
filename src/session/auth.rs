//! Auth service client
//!
//! Talks to the backend's token endpoints. Login and refresh both return a
//! credential pair; a refresh response may omit the refresh token, in which
//! case the one that was presented stays valid.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use super::Credentials;
use crate::config::AuthConfig;

/// Errors from the auth collaborator
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("auth API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl AuthError {
    /// True when the auth service rejected the presented token or password
    pub fn is_rejection(&self) -> bool {
        matches!(self, AuthError::ApiError { status, .. } if *status == 401 || *status == 403)
    }
}

/// Login and token refresh against the auth collaborator
#[async_trait]
pub trait AuthClient: Send + Sync {
    async fn login(&self, username: &str, password: &str) -> Result<Credentials, AuthError>;
    async fn refresh(&self, refresh_token: &str) -> Result<Credentials, AuthError>;
}

/// HTTP implementation against the backend's JWT endpoints
pub struct HttpAuthClient {
    base_url: String,
    http: Client,
}

impl HttpAuthClient {
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(AuthError::Network)?;

        Ok(Self {
            base_url: config.base_url.clone(),
            http,
        })
    }

    async fn post_tokens(
        &self,
        path: &str,
        body: serde_json::Value,
        prior_refresh: Option<&str>,
    ) -> Result<Credentials, AuthError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "post_tokens: calling auth service");

        let response = self.http.post(&url).json(&body).send().await?;
        let status = response.status().as_u16();

        if !response.status().is_success() {
            let message = response.text().await.unwrap_or_default();
            debug!(status, "post_tokens: auth service rejected request");
            return Err(AuthError::ApiError { status, message });
        }

        let tokens: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;

        let refresh_token = tokens
            .refresh
            .or_else(|| prior_refresh.map(String::from))
            .ok_or_else(|| AuthError::InvalidResponse("response carried no refresh token".to_string()))?;

        Ok(Credentials {
            access_token: tokens.access,
            refresh_token,
        })
    }
}

#[async_trait]
impl AuthClient for HttpAuthClient {
    async fn login(&self, username: &str, password: &str) -> Result<Credentials, AuthError> {
        let body = serde_json::json!({ "username": username, "password": password });
        self.post_tokens("/api/token/", body, None).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Credentials, AuthError> {
        let body = serde_json::json!({ "refresh": refresh_token });
        self.post_tokens("/api/token/refresh/", body, Some(refresh_token)).await
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access: String,
    #[serde(default)]
    refresh: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_rejection() {
        let err = AuthError::ApiError {
            status: 401,
            message: "token expired".to_string(),
        };
        assert!(err.is_rejection());

        let err = AuthError::ApiError {
            status: 500,
            message: "server error".to_string(),
        };
        assert!(!err.is_rejection());
    }

    #[test]
    fn test_token_response_without_refresh() {
        let json = r#"{"access": "a1"}"#;
        let tokens: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(tokens.access, "a1");
        assert!(tokens.refresh.is_none());
    }
}
