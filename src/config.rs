//! Configuration management for voicewire
//!
//! Provides configuration loading, saving, and management for the cloud
//! session, the peer transport, and the audio pipeline.

use crate::errors::VoiceError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoicewireConfig {
    pub session: SessionConfig,
    pub transport: TransportConfig,
    pub audio: AudioConfig,
}

/// Cloud session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Long-lived service API key. Usually supplied via `VOICEWIRE_API_KEY`
    /// rather than the config file.
    pub api_key: String,
    /// Realtime model requested when minting the session token
    pub model: String,
    /// Assistant voice requested when minting the session token
    pub voice: String,
    /// Behavior instructions sent over the event channel after connect
    pub instructions: String,
    /// Greeting the assistant speaks once the session is live
    pub greeting: String,
    /// Endpoint that exchanges the API key for a session token
    pub sessions_url: String,
    /// Realtime signaling endpoint the SDP offer is posted to
    pub realtime_url: String,
    /// Credential request timeout in seconds
    pub token_timeout_secs: u64,
}

/// Peer transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// STUN server URLs used for ICE gathering
    pub stun_servers: Vec<String>,
    /// Label of the control data channel opened with the offer
    pub control_channel_label: String,
    /// Label of the auxiliary event channel created once control opens
    pub events_channel_label: String,
}

/// Audio pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Capture/playback sample rate in Hz (must be an Opus rate)
    pub sample_rate: u32,
    /// Samples per capture frame (320 at 16kHz = 20ms)
    pub frame_samples: usize,
    /// Capture task period in milliseconds
    pub capture_interval_ms: u64,
    /// Linear microphone gain applied after filtering
    pub mic_gain: f32,
    /// Right bit-shift applied after the gain multiply (coarse attenuation)
    pub attenuation_shift: u32,
    /// RMS threshold below which a whole frame is gated to silence,
    /// in the 24-bit-aligned capture domain
    pub noise_gate_threshold: f64,
    /// Opus encoder target bitrate in bits per second
    pub opus_bitrate: u32,
    /// Input device name, None for the system default
    pub input_device: Option<String>,
    /// Output device name, None for the system default
    pub output_device: Option<String>,
}

impl Default for VoicewireConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig {
                api_key: String::new(),
                model: "gpt-4o-mini-realtime-preview".to_string(),
                voice: "alloy".to_string(),
                instructions: "Please answer clearly, politely and in a friendly tone, \
                               in audio only."
                    .to_string(),
                greeting: "Hello! I am your voice assistant. How can I help you today?"
                    .to_string(),
                sessions_url: "https://api.openai.com/v1/realtime/sessions".to_string(),
                realtime_url: "https://api.openai.com/v1/realtime?model=gpt-4o-mini-realtime-preview"
                    .to_string(),
                token_timeout_secs: 15,
            },
            transport: TransportConfig {
                stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
                control_channel_label: "control".to_string(),
                events_channel_label: "oai-events".to_string(),
            },
            audio: AudioConfig {
                sample_rate: 16000,
                frame_samples: 320,
                capture_interval_ms: 15,
                mic_gain: 0.025,
                attenuation_shift: 11,
                noise_gate_threshold: 25_000.0,
                opus_bitrate: 24_000,
                input_device: None,
                output_device: None,
            },
        }
    }
}

impl VoicewireConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, VoiceError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| VoiceError::Config(format!("Failed to read config file: {}", e)))?;

        let config: VoicewireConfig = toml::from_str(&contents)
            .map_err(|e| VoiceError::Config(format!("Failed to parse config file: {}", e)))?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), VoiceError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                VoiceError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| VoiceError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| VoiceError::Config(format!("Failed to write config file: {}", e)))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("voicewire.toml")
    }

    /// Load from default location or create with defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        });
        config.apply_env();
        config
    }

    /// Apply environment overrides. The API key is usually injected this way
    /// so it never lands in a config file on disk.
    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("VOICEWIRE_API_KEY") {
            if !key.is_empty() {
                self.session.api_key = key;
            }
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        // Opus only accepts these rates
        if !matches!(self.audio.sample_rate, 8000 | 12000 | 16000 | 24000 | 48000) {
            return Err("Sample rate must be 8000, 12000, 16000, 24000 or 48000 Hz".to_string());
        }
        if self.audio.frame_samples == 0 || self.audio.frame_samples > 5760 {
            return Err("Frame size must be between 1 and 5760 samples".to_string());
        }
        if self.audio.capture_interval_ms == 0 || self.audio.capture_interval_ms > 1000 {
            return Err("Capture interval must be between 1 and 1000 ms".to_string());
        }
        if self.audio.mic_gain <= 0.0 {
            return Err("Mic gain must be positive".to_string());
        }
        if self.audio.attenuation_shift > 31 {
            return Err("Attenuation shift must be at most 31".to_string());
        }
        if self.audio.opus_bitrate < 500 || self.audio.opus_bitrate > 512_000 {
            return Err("Opus bitrate must be between 500 and 512000 bps".to_string());
        }

        if self.session.sessions_url.is_empty() || self.session.realtime_url.is_empty() {
            return Err("Signaling endpoints must not be empty".to_string());
        }
        if self.session.token_timeout_secs == 0 {
            return Err("Token timeout must be positive".to_string());
        }

        if self.transport.stun_servers.is_empty() {
            return Err("At least one STUN server is required".to_string());
        }
        if self.transport.control_channel_label.is_empty()
            || self.transport.events_channel_label.is_empty()
        {
            return Err("Data channel labels must not be empty".to_string());
        }

        Ok(())
    }
}
