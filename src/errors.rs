use std::fmt;

#[derive(Debug)]
pub enum VoiceError {
    /// Malformed or missing inputs to the credential request.
    InvalidArgument(String),
    /// HTTP transport failure or non-2xx credential status.
    Network(String),
    /// Response parsed but lacked an expected field.
    Protocol(String),
    /// Signaling exchange failure. Not recoverable within the session; the
    /// supervising layer decides whether to retry, back off, or exit.
    Signaling(String),
    /// Peer connection, track, or data channel failure.
    Transport(String),
    /// Audio device open or stream failure.
    Audio(String),
    /// Opus encoder or decoder failure.
    Encoding(String),
    /// Configuration read, parse, or validation failure.
    Config(String),
}

impl VoiceError {
    /// Whether the supervising layer should treat this error as fatal for the
    /// whole session rather than a degraded-but-running condition.
    pub fn is_fatal(&self) -> bool {
        matches!(self, VoiceError::Signaling(_))
    }
}

impl fmt::Display for VoiceError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            VoiceError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            VoiceError::Network(msg) => write!(f, "Network error: {}", msg),
            VoiceError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            VoiceError::Signaling(msg) => write!(f, "Signaling error: {}", msg),
            VoiceError::Transport(msg) => write!(f, "Transport error: {}", msg),
            VoiceError::Audio(msg) => write!(f, "Audio error: {}", msg),
            VoiceError::Encoding(msg) => write!(f, "Encoding error: {}", msg),
            VoiceError::Config(msg) => write!(f, "Config error: {}", msg),
        }
    }
}

impl std::error::Error for VoiceError {}
