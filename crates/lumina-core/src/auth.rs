use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::LuminaError;

/// Request body sent to the token endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenRequest<'a> {
    room_name: &'a str,
    participant_name: &'a str,
}

/// Response from the token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("Failed to obtain token: {reason} ({status})")]
    Status { status: u16, reason: String },
    #[error("missing token")]
    MissingToken,
    #[error("invalid token response: {0}")]
    InvalidResponse(String),
    #[error("token request failed: {0}")]
    Request(String),
}

impl From<TokenError> for LuminaError {
    fn from(e: TokenError) -> Self {
        LuminaError::JoinFailed(e.to_string())
    }
}

/// Issues access tokens for a room.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn request_token(
        &self,
        room_name: &str,
        participant_name: &str,
    ) -> Result<String, TokenError>;
}

/// Token endpoint reached over HTTP.
///
/// POSTs `{"roomName", "participantName"}` as JSON and expects
/// `{"token": "..."}` back.
pub struct HttpTokenProvider {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpTokenProvider {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl TokenProvider for HttpTokenProvider {
    async fn request_token(
        &self,
        room_name: &str,
        participant_name: &str,
    ) -> Result<String, TokenError> {
        tracing::info!("requesting token from {}", self.endpoint);

        let resp = self
            .client
            .post(&self.endpoint)
            .json(&TokenRequest {
                room_name,
                participant_name,
            })
            .send()
            .await
            .map_err(|e| TokenError::Request(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| TokenError::Request(e.to_string()))?;

        parse_token_response(status.as_u16(), status.canonical_reason().unwrap_or(""), &body)
    }
}

/// Turn a token endpoint reply into a token or a user-facing error.
pub fn parse_token_response(status: u16, reason: &str, body: &str) -> Result<String, TokenError> {
    if !(200..300).contains(&status) {
        return Err(TokenError::Status {
            status,
            reason: reason.to_string(),
        });
    }

    let data: TokenResponse = serde_json::from_str(body)
        .map_err(|e| TokenError::InvalidResponse(e.to_string()))?;

    match data.token {
        Some(token) if !token.is_empty() => Ok(token),
        _ => Err(TokenError::MissingToken),
    }
}

/// Convert an http(s) server URL to its WebSocket form.
pub fn to_websocket_url(url: &str) -> String {
    url.trim()
        .replace("https://", "wss://")
        .replace("http://", "ws://")
}
