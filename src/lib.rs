//! Voicewire: realtime voice-assistant session client
//!
//! This crate connects a device to a cloud speech/AI service over a WebRTC
//! peer connection and pumps voice audio in both directions:
//!
//! - mints a short-lived session credential over HTTPS
//! - exchanges the SDP offer/answer with the realtime endpoint
//! - tracks the peer connection lifecycle and bootstraps a control channel
//! - captures, filters and Opus-encodes microphone audio for transmission
//! - decodes inbound assistant audio straight to the speaker
//!
//! # Usage
//! ```rust,ignore
//! use voicewire::{config::VoicewireConfig, session::VoiceSession};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     voicewire::init_logging();
//!     let config = VoicewireConfig::load_or_default();
//!     let session = VoiceSession::connect(config).await?;
//!     session.run().await?;
//!     Ok(())
//! }
//! ```

pub mod audio;
pub mod config;
pub mod errors;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use config::VoicewireConfig;
pub use errors::VoiceError;
pub use session::{SessionShared, SessionStats, SessionToken, VoiceSession};
pub use transport::{ConnectionState, PeerTransport};

/// Initialize logging for the session client
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "voicewire=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}

#[cfg(test)]
mod lib_tests {
    use super::*;

    #[test]
    fn test_crate_info() {
        let info = get_info();
        assert_eq!(info.name, "voicewire");
        assert!(!info.version.is_empty());
        assert!(!info.description.is_empty());
    }
}
