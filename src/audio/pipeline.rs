//! Capture and playback pipelines
//!
//! The capture pipeline runs on a dedicated thread at a fixed period:
//! read one frame, gate and filter it, Opus-encode it, and hand encoded
//! packets toward the transport — but only while the session is ready;
//! otherwise packets are dropped on the floor with no backlog. The playback
//! pipeline is the reverse path, fed by the transport's inbound track and
//! fully independent of capture scheduling.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::audio::codec::{VoiceDecoder, VoiceEncoder};
use crate::audio::device::{MicCapture, SpeakerOutput};
use crate::audio::filters::FilterChain;
use crate::errors::VoiceError;
use crate::session::state::{SessionShared, SessionStats};

/// Source of raw capture frames. Implemented by the microphone; tests use
/// synthetic sources.
pub trait FrameSource {
    /// Fill `out` with up to `out.len()` samples, returning the count.
    fn read_frame(&mut self, out: &mut [i32]) -> usize;
}

impl FrameSource for MicCapture {
    fn read_frame(&mut self, out: &mut [i32]) -> usize {
        MicCapture::read_frame(self, out)
    }
}

/// Sink for decoded playback samples. Implemented by the speaker; tests use
/// recording sinks.
pub trait SampleSink {
    fn write(&mut self, samples: &[i16]);
}

impl SampleSink for SpeakerOutput {
    fn write(&mut self, samples: &[i16]) {
        SpeakerOutput::write(self, samples)
    }
}

/// Capture-side pipeline: source -> filter chain -> encoder.
pub struct CapturePipeline<S: FrameSource> {
    source: S,
    filters: FilterChain,
    encoder: VoiceEncoder,
    raw: Vec<i32>,
    filtered: Vec<i16>,
}

impl<S: FrameSource> CapturePipeline<S> {
    pub fn new(source: S, mut filters: FilterChain, encoder: VoiceEncoder) -> Self {
        let frame_samples = encoder.frame_samples();
        // Filter state starts clean for the lifetime of this pipeline
        filters.reset();
        Self {
            source,
            filters,
            encoder,
            raw: vec![0i32; frame_samples],
            filtered: vec![0i16; frame_samples],
        }
    }

    /// One capture iteration: read a frame, filter it, encode it.
    ///
    /// The sink is invoked once per encoded packet. Returns the number of
    /// samples read and the number of packets emitted.
    pub fn tick(
        &mut self,
        sink: &mut dyn FnMut(&[u8]),
    ) -> Result<(usize, usize), VoiceError> {
        let samples = self.source.read_frame(&mut self.raw);
        if samples == 0 {
            return Ok((0, 0));
        }

        let count = self
            .filters
            .process(&mut self.raw[..samples], &mut self.filtered[..samples]);
        let packets = self.encoder.encode(&self.filtered[..count], |pkt| sink(pkt))?;
        Ok((samples, packets))
    }
}

/// Run the capture pipeline until cancelled. Blocking; intended for a
/// dedicated audio thread.
///
/// Encoded packets are forwarded into `packet_tx` only while the session's
/// ready flag is set; everything else is dropped and counted, never queued.
pub fn run_capture<S: FrameSource>(
    mut pipeline: CapturePipeline<S>,
    shared: Arc<SessionShared>,
    stats: Arc<SessionStats>,
    packet_tx: mpsc::Sender<Bytes>,
    interval: Duration,
    cancel: CancellationToken,
) {
    log::info!("Audio capture task started");
    let mut packets: Vec<Bytes> = Vec::new();

    while !cancel.is_cancelled() {
        packets.clear();
        match pipeline.tick(&mut |pkt| packets.push(Bytes::copy_from_slice(pkt))) {
            Ok((samples, _)) => {
                if samples > 0 {
                    stats.frames_captured.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(e) => {
                log::warn!("Capture iteration failed: {}", e);
                std::thread::sleep(interval);
                continue;
            }
        }

        for packet in packets.drain(..) {
            if shared.is_ready() && packet_tx.try_send(packet).is_ok() {
                stats.packets_sent.fetch_add(1, Ordering::Relaxed);
            } else {
                stats.packets_dropped.fetch_add(1, Ordering::Relaxed);
            }
        }

        std::thread::sleep(interval);
    }

    log::info!("Audio capture task stopped");
}

/// Playback-side pipeline: decoder -> sample sink.
pub struct PlaybackPipeline<S: SampleSink> {
    decoder: VoiceDecoder,
    sink: S,
}

impl<S: SampleSink> PlaybackPipeline<S> {
    pub fn new(decoder: VoiceDecoder, sink: S) -> Self {
        Self { decoder, sink }
    }

    /// Decode one inbound packet and hand every decoded frame to the sink.
    /// No filtering is applied on the receive path.
    pub fn handle_packet(&mut self, packet: &[u8]) -> Result<usize, VoiceError> {
        let Self { decoder, sink } = self;
        decoder.decode(packet, |pcm| sink.write(pcm))
    }
}

/// Run the playback pipeline until the inbound channel closes or the token
/// is cancelled. Blocking; intended for a dedicated audio thread.
pub fn run_playback<S: SampleSink>(
    mut pipeline: PlaybackPipeline<S>,
    mut packet_rx: mpsc::Receiver<Bytes>,
    stats: Arc<SessionStats>,
    cancel: CancellationToken,
) {
    log::info!("Audio playback task started");

    while let Some(packet) = packet_rx.blocking_recv() {
        if cancel.is_cancelled() {
            break;
        }
        match pipeline.handle_packet(&packet) {
            Ok(_) => {
                stats.packets_received.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                // Malformed inbound audio is dropped, the session continues
                log::debug!("Dropping undecodable packet ({} bytes): {}", packet.len(), e);
            }
        }
    }

    log::info!("Audio playback task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AudioConfig;
    use crate::transport::ConnectionState;

    fn test_audio_config() -> AudioConfig {
        AudioConfig {
            sample_rate: 16000,
            frame_samples: 320,
            capture_interval_ms: 15,
            mic_gain: 0.025,
            attenuation_shift: 11,
            noise_gate_threshold: 0.0,
            opus_bitrate: 24_000,
            input_device: None,
            output_device: None,
        }
    }

    /// Synthetic source producing full frames of a loud constant tone.
    struct LoudSource;

    impl FrameSource for LoudSource {
        fn read_frame(&mut self, out: &mut [i32]) -> usize {
            for (i, sample) in out.iter_mut().enumerate() {
                *sample = if i % 2 == 0 { 2_000_000 } else { -2_000_000 };
            }
            out.len()
        }
    }

    /// Synthetic source that never produces samples.
    struct SilentSource;

    impl FrameSource for SilentSource {
        fn read_frame(&mut self, _out: &mut [i32]) -> usize {
            0
        }
    }

    struct RecordingSink(Vec<i16>);

    impl SampleSink for RecordingSink {
        fn write(&mut self, samples: &[i16]) {
            self.0.extend_from_slice(samples);
        }
    }

    fn make_pipeline<S: FrameSource>(source: S) -> CapturePipeline<S> {
        let config = test_audio_config();
        let filters = FilterChain::new(&config);
        let encoder = VoiceEncoder::new(16000, 24_000, 320).unwrap();
        CapturePipeline::new(source, filters, encoder)
    }

    #[test]
    fn test_tick_emits_packet_for_full_frame() {
        let mut pipeline = make_pipeline(LoudSource);
        let mut emitted = 0usize;
        let (samples, packets) = pipeline.tick(&mut |_| emitted += 1).unwrap();
        assert_eq!(samples, 320);
        assert_eq!(packets, 1);
        assert_eq!(emitted, 1);
    }

    #[test]
    fn test_tick_with_no_input_is_a_no_op() {
        let mut pipeline = make_pipeline(SilentSource);
        let (samples, packets) = pipeline.tick(&mut |_| panic!("no packet expected")).unwrap();
        assert_eq!(samples, 0);
        assert_eq!(packets, 0);
    }

    #[test]
    fn test_capture_never_transmits_until_ready() {
        let shared = Arc::new(SessionShared::new());
        let stats = Arc::new(SessionStats::default());
        let (tx, mut rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();

        let pipeline = make_pipeline(LoudSource);
        let handle = {
            let shared = shared.clone();
            let stats = stats.clone();
            let cancel = cancel.clone();
            std::thread::spawn(move || {
                run_capture(pipeline, shared, stats, tx, Duration::from_millis(1), cancel)
            })
        };

        // Not ready: every packet must be dropped, none transmitted.
        std::thread::sleep(Duration::from_millis(50));
        assert!(rx.try_recv().is_err());
        let (_, sent, dropped, _) = stats.snapshot();
        assert_eq!(sent, 0);
        assert!(dropped > 0);

        // Ready: packets start flowing.
        shared.set_connection_state(ConnectionState::Completed);
        shared.mark_events_channel();
        std::thread::sleep(Duration::from_millis(50));
        assert!(rx.try_recv().is_ok());

        // Back to not ready: the flow stops again.
        shared.set_connection_state(ConnectionState::Disconnected);
        std::thread::sleep(Duration::from_millis(20));
        while rx.try_recv().is_ok() {}
        std::thread::sleep(Duration::from_millis(30));
        assert!(rx.try_recv().is_err());

        cancel.cancel();
        handle.join().unwrap();
    }

    #[test]
    fn test_playback_rejects_garbage_and_continues() {
        let decoder = VoiceDecoder::new(16000).unwrap();
        let mut playback = PlaybackPipeline::new(decoder, RecordingSink(Vec::new()));

        assert!(playback.handle_packet(&[]).is_err());

        // A real packet still decodes after a bad one.
        let mut encoder = VoiceEncoder::new(16000, 24_000, 320).unwrap();
        let mut packet = Vec::new();
        encoder
            .encode(&[0i16; 320], |pkt| packet = pkt.to_vec())
            .unwrap();
        let samples = playback.handle_packet(&packet).unwrap();
        assert_eq!(samples, 320);
        assert_eq!(playback.sink.0.len(), 320);
    }
}
