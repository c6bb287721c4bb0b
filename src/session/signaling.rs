//! SDP offer/answer exchange with the realtime service
//!
//! One HTTPS POST carrying the local offer, authorized by the session token.
//! The service answers 201 with the remote description as a raw SDP body.
//! Any other outcome is a `Signaling` error: there is no recovery path
//! inside the session, the supervising layer owns the retry/exit decision.

use crate::config::SessionConfig;
use crate::errors::VoiceError;
use crate::session::credentials::SessionToken;

/// Relay the local offer and return the remote answer SDP.
pub async fn exchange_offer(
    client: &reqwest::Client,
    config: &SessionConfig,
    token: &SessionToken,
    offer_sdp: &str,
) -> Result<String, VoiceError> {
    let response = client
        .post(&config.realtime_url)
        .bearer_auth(token.as_str())
        .header(reqwest::header::CONTENT_TYPE, "application/sdp")
        .body(offer_sdp.to_string())
        .send()
        .await
        .map_err(|e| VoiceError::Signaling(format!("Offer exchange failed: {}", e)))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| VoiceError::Signaling(format!("Failed to read answer: {}", e)))?;

    if status.as_u16() != 201 {
        log::error!("Offer exchange failed with status {}, body: {}", status, body);
        return Err(VoiceError::Signaling(format!(
            "Expected HTTP 201, got {}",
            status
        )));
    }

    Ok(body)
}
