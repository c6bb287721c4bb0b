//! Microphone capture and speaker output
//!
//! Both sides wrap a cpal stream and bridge its callback to the pipeline
//! through bounded channels, so a slow consumer can never grow memory
//! without bound. `cpal::Stream` is not `Send`; each device is created and
//! driven on the dedicated audio thread that owns it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};

use crate::errors::VoiceError;

/// Maximum number of capture chunks to buffer before dropping the newest.
/// Each chunk is one cpal callback worth of samples; at typical callback
/// sizes this allows a few seconds of buffering.
const MAX_BUFFER_CHUNKS: usize = 256;

/// Raw capture samples are scaled to a 24-bit-aligned range, matching the
/// domain the filter-chain gain and shift defaults are tuned for.
const CAPTURE_SCALE: f32 = 8_388_607.0;

fn find_input_device(host: &cpal::Host, name: Option<&str>) -> Result<cpal::Device, VoiceError> {
    match name {
        None | Some("") | Some("default") => host
            .default_input_device()
            .ok_or_else(|| VoiceError::Audio("No default audio input device".to_string())),
        Some(wanted) => host
            .input_devices()
            .map_err(|e| VoiceError::Audio(format!("Failed to enumerate input devices: {}", e)))?
            .find(|d| d.name().ok().as_deref() == Some(wanted))
            .ok_or_else(|| VoiceError::Audio(format!("Input device not found: {}", wanted))),
    }
}

fn find_output_device(host: &cpal::Host, name: Option<&str>) -> Result<cpal::Device, VoiceError> {
    match name {
        None | Some("") | Some("default") => host
            .default_output_device()
            .ok_or_else(|| VoiceError::Audio("No default audio output device".to_string())),
        Some(wanted) => host
            .output_devices()
            .map_err(|e| VoiceError::Audio(format!("Failed to enumerate output devices: {}", e)))?
            .find(|d| d.name().ok().as_deref() == Some(wanted))
            .ok_or_else(|| VoiceError::Audio(format!("Output device not found: {}", wanted))),
    }
}

/// Microphone capture stream
///
/// The cpal callback downmixes to mono, scales to the 24-bit-aligned i32
/// domain and pushes chunks into a bounded channel; `read_frame` drains
/// that channel from the capture thread.
pub struct MicCapture {
    stream: Option<Stream>,
    receiver: crossbeam_channel::Receiver<Vec<i32>>,
    /// Remainder of a chunk that did not fit the last frame read
    pending: Vec<i32>,
    is_running: Arc<AtomicBool>,
    sample_rate: u32,
}

impl MicCapture {
    /// Open the input device at the requested sample rate.
    ///
    /// If `device_name` is None or "default", uses the system default input.
    pub fn new(device_name: Option<&str>, sample_rate: u32) -> Result<Self, VoiceError> {
        let host = cpal::default_host();
        let device = find_input_device(&host, device_name)?;

        let channels = device
            .default_input_config()
            .map_err(|e| VoiceError::Audio(format!("No supported input config: {}", e)))?
            .channels();

        let config = StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        // Bounded channel to prevent unbounded memory growth
        let (sender, receiver) = crossbeam_channel::bounded(MAX_BUFFER_CHUNKS);
        let is_running = Arc::new(AtomicBool::new(false));
        let is_running_cb = is_running.clone();
        let channels = channels as usize;

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if !is_running_cb.load(Ordering::Relaxed) {
                        return;
                    }

                    let chunk: Vec<i32> = data
                        .chunks_exact(channels)
                        .map(|frame| {
                            let mono: f32 = frame.iter().sum::<f32>() / channels as f32;
                            (mono * CAPTURE_SCALE) as i32
                        })
                        .collect();

                    // Non-blocking send - drops the chunk if the buffer is full
                    let _ = sender.try_send(chunk);
                },
                move |err| {
                    log::error!("Audio capture error: {}", err);
                },
                None,
            )
            .map_err(|e| VoiceError::Audio(format!("Failed to build input stream: {}", e)))?;

        Ok(Self {
            stream: Some(stream),
            receiver,
            pending: Vec::new(),
            is_running,
            sample_rate,
        })
    }

    /// Start capturing (idempotent)
    pub fn start(&mut self) -> Result<(), VoiceError> {
        if self.is_running.load(Ordering::Relaxed) {
            return Ok(());
        }
        if let Some(ref stream) = self.stream {
            stream
                .play()
                .map_err(|e| VoiceError::Audio(format!("Failed to start input stream: {}", e)))?;
            self.is_running.store(true, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Stop capturing (idempotent)
    pub fn stop(&mut self) -> Result<(), VoiceError> {
        if !self.is_running.load(Ordering::Relaxed) {
            return Ok(());
        }
        if let Some(ref stream) = self.stream {
            stream
                .pause()
                .map_err(|e| VoiceError::Audio(format!("Failed to stop input stream: {}", e)))?;
            self.is_running.store(false, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Fill `out` with captured samples without blocking.
    ///
    /// Returns how many samples were written; a short or zero count simply
    /// means the device has not produced a full frame yet.
    pub fn read_frame(&mut self, out: &mut [i32]) -> usize {
        let mut written = 0;

        while written < out.len() {
            if self.pending.is_empty() {
                match self.receiver.try_recv() {
                    Ok(chunk) => self.pending = chunk,
                    Err(_) => break,
                }
            }
            let take = (out.len() - written).min(self.pending.len());
            out[written..written + take].copy_from_slice(&self.pending[..take]);
            self.pending.drain(..take);
            written += take;
        }

        written
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }
}

impl Drop for MicCapture {
    fn drop(&mut self) {
        let _ = self.stop();
        self.stream = None;
    }
}

/// Speaker output stream
///
/// Decoded PCM is pushed into a bounded sample queue; the cpal callback
/// drains it, upmixing mono to the device channel count and zero-filling
/// on underrun.
pub struct SpeakerOutput {
    stream: Option<Stream>,
    sender: crossbeam_channel::Sender<i16>,
    is_running: Arc<AtomicBool>,
    dropped_samples: Arc<AtomicU64>,
    sample_rate: u32,
}

impl SpeakerOutput {
    /// Open the output device at the requested sample rate.
    pub fn new(device_name: Option<&str>, sample_rate: u32) -> Result<Self, VoiceError> {
        let host = cpal::default_host();
        let device = find_output_device(&host, device_name)?;

        let channels = device
            .default_output_config()
            .map_err(|e| VoiceError::Audio(format!("No supported output config: {}", e)))?
            .channels();

        let config = StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        // One second of queued playback at most
        let (sender, receiver) = crossbeam_channel::bounded::<i16>(sample_rate as usize);
        let is_running = Arc::new(AtomicBool::new(false));
        let is_running_cb = is_running.clone();
        let channels = channels as usize;

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if !is_running_cb.load(Ordering::Relaxed) {
                        data.fill(0.0);
                        return;
                    }
                    for frame in data.chunks_exact_mut(channels) {
                        // Underruns play silence rather than stale samples
                        let sample = receiver.try_recv().unwrap_or(0);
                        let value = sample as f32 / 32768.0;
                        frame.fill(value);
                    }
                },
                move |err| {
                    log::error!("Audio playback error: {}", err);
                },
                None,
            )
            .map_err(|e| VoiceError::Audio(format!("Failed to build output stream: {}", e)))?;

        Ok(Self {
            stream: Some(stream),
            sender,
            is_running,
            dropped_samples: Arc::new(AtomicU64::new(0)),
            sample_rate,
        })
    }

    /// Start playback (idempotent)
    pub fn start(&mut self) -> Result<(), VoiceError> {
        if self.is_running.load(Ordering::Relaxed) {
            return Ok(());
        }
        if let Some(ref stream) = self.stream {
            stream
                .play()
                .map_err(|e| VoiceError::Audio(format!("Failed to start output stream: {}", e)))?;
            self.is_running.store(true, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Stop playback (idempotent)
    pub fn stop(&mut self) -> Result<(), VoiceError> {
        if !self.is_running.load(Ordering::Relaxed) {
            return Ok(());
        }
        if let Some(ref stream) = self.stream {
            stream
                .pause()
                .map_err(|e| VoiceError::Audio(format!("Failed to stop output stream: {}", e)))?;
            self.is_running.store(false, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Queue decoded samples for playback. Samples that do not fit the
    /// bounded queue are dropped and counted.
    pub fn write(&self, samples: &[i16]) {
        for &sample in samples {
            if self.sender.try_send(sample).is_err() {
                self.dropped_samples.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn dropped_samples(&self) -> u64 {
        self.dropped_samples.load(Ordering::Relaxed)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl Drop for SpeakerOutput {
    fn drop(&mut self) {
        let _ = self.stop();
        self.stream = None;
    }
}
