//! Session credential acquisition
//!
//! Exchanges the long-lived service API key for a short-lived session token
//! through a single HTTPS POST. One attempt, fixed timeout, no retry: a
//! failure here simply leaves the device without a session.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::config::SessionConfig;
use crate::errors::VoiceError;

/// Upper bound on the stored token length, in bytes. Longer credentials are
/// truncated rather than rejected.
pub const TOKEN_CAPACITY: usize = 256;

/// Short-lived credential authorizing one realtime session.
///
/// Never persisted beyond a single connection attempt.
#[derive(Debug, Clone)]
pub struct SessionToken(String);

impl SessionToken {
    /// Store a token value, truncating to `TOKEN_CAPACITY` bytes on a char
    /// boundary so the stored credential can never outgrow its bound.
    pub fn new(value: &str) -> Self {
        if value.len() <= TOKEN_CAPACITY {
            return Self(value.to_string());
        }
        let mut end = TOKEN_CAPACITY;
        while !value.is_char_boundary(end) {
            end -= 1;
        }
        Self(value[..end].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct SessionCreated {
    client_secret: Option<ClientSecret>,
}

#[derive(Debug, Deserialize)]
struct ClientSecret {
    value: Option<String>,
}

/// Mint a session token for the configured model and voice.
///
/// # Errors
/// - `InvalidArgument` when the key, model or voice is empty
/// - `Network` on transport failure or a non-2xx status
/// - `Protocol` when the response lacks a usable `client_secret.value`
pub async fn create_session_token(
    client: &reqwest::Client,
    config: &SessionConfig,
) -> Result<SessionToken, VoiceError> {
    if config.api_key.is_empty() || config.model.is_empty() || config.voice.is_empty() {
        return Err(VoiceError::InvalidArgument(
            "api_key, model and voice must be non-empty".to_string(),
        ));
    }

    let body = json!({
        "model": config.model,
        "voice": config.voice,
    });

    let response = client
        .post(&config.sessions_url)
        .bearer_auth(&config.api_key)
        .timeout(Duration::from_secs(config.token_timeout_secs))
        .json(&body)
        .send()
        .await
        .map_err(|e| VoiceError::Network(format!("Session request failed: {}", e)))?;

    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| VoiceError::Network(format!("Failed to read session response: {}", e)))?;

    if !status.is_success() {
        log::error!("Session request failed with status {}, body: {}", status, text);
        return Err(VoiceError::Network(format!("HTTP status {}", status)));
    }

    let parsed: SessionCreated = serde_json::from_str(&text).map_err(|e| {
        log::error!("Unparseable session response: {}", text);
        VoiceError::Protocol(format!("Invalid session response JSON: {}", e))
    })?;

    match parsed.client_secret.and_then(|secret| secret.value) {
        Some(value) if !value.is_empty() => Ok(SessionToken::new(&value)),
        _ => {
            log::error!("client_secret.value not found in response: {}", text);
            Err(VoiceError::Protocol(
                "client_secret.value missing from session response".to_string(),
            ))
        }
    }
}
