//! Audio capture, filtering, coding and playback for voicewire
//!
//! This module provides the two realtime audio paths:
//! - capture: microphone -> filter chain -> Opus encoder -> transport
//! - playback: transport -> Opus decoder -> speaker
//!
//! Submodules:
//! - `device`: cpal-backed microphone capture and speaker output
//! - `filters`: noise gate, DC blocker, high-pass, saturation
//! - `codec`: Opus encoder/decoder wrappers
//! - `pipeline`: the periodic capture task and the inbound playback task

mod codec;
mod device;
mod filters;
mod pipeline;

pub use codec::{VoiceDecoder, VoiceEncoder};
pub use device::{MicCapture, SpeakerOutput};
pub use filters::{limit_amplitude, DcBlocker, FilterChain, HighPass, NoiseGate};
pub use pipeline::{
    run_capture, run_playback, CapturePipeline, FrameSource, PlaybackPipeline, SampleSink,
};
