//! NLP extraction client
//!
//! Sends the full turn history plus the fields accumulated so far to the
//! extraction collaborator and parses the partial fields it returns. The
//! service is assumed idempotent for identical input, which is what makes
//! retry-with-the-same-text safe for the dialogue machine.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::NlpConfig;
use crate::domain::{ExtractedFields, PartialGoalFields};
use crate::gateway::{GatewayError, RequestGateway};

/// Errors from the extraction collaborator
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("extraction service unavailable: {0}")]
    Gateway(#[from] GatewayError),

    #[error("invalid extraction response: {0}")]
    InvalidResponse(String),
}

impl ExtractError {
    pub fn is_session_expired(&self) -> bool {
        matches!(self, ExtractError::Gateway(g) if g.is_session_expired())
    }
}

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One turn of the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// Slot-filling extraction over conversation turns
#[async_trait]
pub trait NlpExtractor: Send + Sync {
    /// Extract one turn's worth of field updates
    ///
    /// Receives the whole turn history and the fields accumulated so far;
    /// returns only the fields the latest turn supplied or invalidated.
    async fn extract(&self, turns: &[Turn], prior: &ExtractedFields) -> Result<PartialGoalFields, ExtractError>;
}

/// HTTP implementation against the extraction endpoint
pub struct HttpNlpExtractor {
    gateway: Arc<RequestGateway>,
    url: String,
}

impl HttpNlpExtractor {
    pub fn from_config(config: &NlpConfig, gateway: Arc<RequestGateway>) -> Self {
        Self {
            gateway,
            url: format!("{}/api/agents/extract/", config.base_url),
        }
    }
}

#[async_trait]
impl NlpExtractor for HttpNlpExtractor {
    async fn extract(&self, turns: &[Turn], prior: &ExtractedFields) -> Result<PartialGoalFields, ExtractError> {
        debug!(turn_count = turns.len(), "extract: calling NLP service");

        let body = serde_json::json!({
            "turns": turns,
            "extracted": prior,
        });
        let response = self.gateway.post_json(&self.url, &body).await?;

        // The service wraps the fields; tolerate a bare object too
        let fields = response.get("fields").cloned().unwrap_or(response);
        serde_json::from_value(fields).map_err(|e| ExtractError::InvalidResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FieldUpdate;

    #[test]
    fn test_turn_constructors() {
        let turn = Turn::user("fly to NYC");
        assert_eq!(turn.role, Role::User);
        assert_eq!(turn.text, "fly to NYC");

        let turn = Turn::assistant("Where from?");
        assert_eq!(turn.role, Role::Assistant);
    }

    #[test]
    fn test_turn_serializes_with_lowercase_role() {
        let json = serde_json::to_value(Turn::user("hi")).unwrap();
        assert_eq!(json["role"], "user");
    }

    #[test]
    fn test_parse_wrapped_fields() {
        let response = serde_json::json!({
            "fields": { "destination": "NYC", "passenger_count": 2 }
        });
        let fields = response.get("fields").cloned().unwrap_or(response);
        let partial: PartialGoalFields = serde_json::from_value(fields).unwrap();

        assert_eq!(partial.destination, FieldUpdate::set("NYC".to_string()));
        assert_eq!(partial.passenger_count, FieldUpdate::set(2));
    }
}
