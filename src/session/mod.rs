//! Session orchestration
//!
//! `VoiceSession` owns one realtime session per process run: it mints the
//! session credential, creates the peer transport, performs the signaling
//! exchange when the local description completes, bootstraps the event
//! channel, and runs the audio capture/playback threads.
//!
//! All transport callbacks arrive as `SessionEvent`s on a queue drained by
//! `run()`, which is the single writer of session state. The signaling HTTP
//! round trip is awaited inline by that loop, so it stalls event handling
//! (and nothing else) until it resolves or times out.

pub mod credentials;
pub mod signaling;
pub mod state;

pub use credentials::{create_session_token, SessionToken, TOKEN_CAPACITY};
pub use signaling::exchange_offer;
pub use state::{SessionEvent, SessionShared, SessionStats};

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::audio::{
    run_capture, run_playback, CapturePipeline, FilterChain, MicCapture, PlaybackPipeline,
    SpeakerOutput, VoiceDecoder, VoiceEncoder,
};
use crate::config::{AudioConfig, VoicewireConfig};
use crate::errors::VoiceError;
use crate::transport::{ConnectionState, PeerTransport};

/// How many encoded packets may sit between the capture thread and the
/// track writer before new packets are dropped.
const PACKET_QUEUE_DEPTH: usize = 32;

/// How many inbound payloads may sit in front of the playback thread.
const INBOUND_QUEUE_DEPTH: usize = 64;

/// One realtime voice session.
pub struct VoiceSession {
    id: Uuid,
    started_at: DateTime<Utc>,
    config: VoicewireConfig,
    shared: Arc<SessionShared>,
    stats: Arc<SessionStats>,
    transport: Arc<PeerTransport>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    http: reqwest::Client,
    token: SessionToken,
    cancel: CancellationToken,
    offer_exchanged: bool,
    bootstrapped: bool,
}

impl VoiceSession {
    /// Acquire a credential, build the transport, start the audio threads
    /// and trigger offer creation.
    pub async fn connect(config: VoicewireConfig) -> Result<Self, VoiceError> {
        config.validate().map_err(VoiceError::Config)?;

        let id = Uuid::new_v4();
        log::info!("Connecting session {}", id);

        let http = reqwest::Client::new();
        let token = create_session_token(&http, &config.session).await?;
        log::info!("Session token acquired");

        let shared = Arc::new(SessionShared::new());
        let stats = Arc::new(SessionStats::default());
        let cancel = CancellationToken::new();

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_QUEUE_DEPTH);
        let (packet_tx, mut packet_rx) = mpsc::channel::<Bytes>(PACKET_QUEUE_DEPTH);

        let transport = Arc::new(PeerTransport::new(&config.transport, events_tx, inbound_tx).await?);

        spawn_playback_thread(&config.audio, inbound_rx, stats.clone(), cancel.clone())?;
        spawn_capture_thread(
            &config.audio,
            shared.clone(),
            stats.clone(),
            packet_tx,
            cancel.clone(),
        )?;

        // Forward encoded packets onto the outbound track, preserving order.
        {
            let transport = transport.clone();
            let audio = &config.audio;
            let frame_duration = Duration::from_millis(
                audio.frame_samples as u64 * 1000 / audio.sample_rate as u64,
            );
            tokio::spawn(async move {
                while let Some(packet) = packet_rx.recv().await {
                    if let Err(e) = transport.send_audio(packet, frame_duration).await {
                        log::warn!("Failed to send audio packet: {}", e);
                    }
                }
            });
        }

        transport.create_offer().await?;
        log::info!("Offer created, waiting for ICE gathering");

        Ok(Self {
            id,
            started_at: Utc::now(),
            config,
            shared,
            stats,
            transport,
            events_rx,
            http,
            token,
            cancel,
            offer_exchanged: false,
            bootstrapped: false,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn shared(&self) -> Arc<SessionShared> {
        self.shared.clone()
    }

    pub fn stats(&self) -> Arc<SessionStats> {
        self.stats.clone()
    }

    /// Drive the session until the connection closes or a fatal error
    /// surfaces. Consumes the session; there is no reconnection path.
    pub async fn run(mut self) -> Result<(), VoiceError> {
        let result = self.drive().await;

        self.cancel.cancel();
        if let Err(e) = self.transport.close().await {
            log::warn!("Error closing peer connection: {}", e);
        }

        let (frames, sent, dropped, received) = self.stats.snapshot();
        let elapsed = (Utc::now() - self.started_at).num_seconds();
        log::info!(
            "Session {} ended after {}s: {} frames captured, {} packets sent, {} dropped, {} received",
            self.id,
            elapsed,
            frames,
            sent,
            dropped,
            received
        );

        result
    }

    async fn drive(&mut self) -> Result<(), VoiceError> {
        while let Some(event) = self.events_rx.recv().await {
            match event {
                SessionEvent::OfferReady => {
                    if self.offer_exchanged {
                        continue;
                    }
                    self.offer_exchanged = true;

                    let offer = self.transport.local_description().await?;
                    log::info!("Local description complete ({} bytes), exchanging offer", offer.len());
                    let answer =
                        exchange_offer(&self.http, &self.config.session, &self.token, &offer)
                            .await?;
                    self.transport.apply_remote_answer(answer).await?;
                    log::info!("Remote description applied");
                }

                SessionEvent::StateChanged(state) => {
                    self.shared.set_connection_state(state);
                    if state == ConnectionState::Closed {
                        log::info!("Peer connection closed");
                        break;
                    }
                }

                SessionEvent::ControlChannelOpen => {
                    log::info!("Control channel open");
                    // Channel-creation failure degrades the session: audio
                    // may still flow but nothing is ever transmitted.
                    if let Err(e) = self.transport.create_events_channel().await {
                        log::error!("Failed to create event channel: {}", e);
                    }
                }

                SessionEvent::EventsChannelOpen => {
                    self.shared.mark_events_channel();
                    if !self.bootstrapped {
                        self.bootstrapped = true;
                        self.send_bootstrap_messages().await;
                    }
                }

                SessionEvent::ControlMessage(msg) | SessionEvent::EventsMessage(msg) => {
                    log::debug!("Channel message: {}", msg);
                }
            }
        }

        Ok(())
    }

    /// Send the fixed initialization messages: behavior instructions first,
    /// then the spoken greeting.
    async fn send_bootstrap_messages(&self) {
        let instructions = json!({
            "type": "session.update",
            "session": { "instructions": self.config.session.instructions },
        });
        let greeting = json!({
            "type": "response.create",
            "response": {
                "modalities": ["audio", "text"],
                "instructions": self.config.session.greeting,
            },
        });

        for message in [instructions, greeting] {
            if let Err(e) = self.transport.send_event(&message.to_string()).await {
                log::warn!("Failed to send bootstrap message: {}", e);
            }
        }
        log::info!("Bootstrap messages sent");
    }
}

impl Drop for VoiceSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Build the playback pipeline on its own thread; the speaker stream is not
/// `Send`, so it must be created where it is used. Construction errors are
/// reported back synchronously.
fn spawn_playback_thread(
    audio: &AudioConfig,
    inbound_rx: mpsc::Receiver<Bytes>,
    stats: Arc<SessionStats>,
    cancel: CancellationToken,
) -> Result<(), VoiceError> {
    let audio = audio.clone();
    let (ready_tx, ready_rx) = std::sync::mpsc::channel();

    std::thread::Builder::new()
        .name("voicewire-playback".to_string())
        .spawn(move || {
            let built = (|| -> Result<PlaybackPipeline<SpeakerOutput>, VoiceError> {
                let mut speaker =
                    SpeakerOutput::new(audio.output_device.as_deref(), audio.sample_rate)?;
                speaker.start()?;
                let decoder = VoiceDecoder::new(audio.sample_rate)?;
                Ok(PlaybackPipeline::new(decoder, speaker))
            })();

            match built {
                Ok(pipeline) => {
                    let _ = ready_tx.send(Ok(()));
                    run_playback(pipeline, inbound_rx, stats, cancel);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            }
        })
        .map_err(|e| VoiceError::Audio(format!("Failed to spawn playback thread: {}", e)))?;

    ready_rx
        .recv()
        .map_err(|_| VoiceError::Audio("Playback thread died during startup".to_string()))?
}

/// Build the capture pipeline on its own thread, mirroring the playback
/// side: the microphone stream must live on the thread that drives it.
fn spawn_capture_thread(
    audio: &AudioConfig,
    shared: Arc<SessionShared>,
    stats: Arc<SessionStats>,
    packet_tx: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
) -> Result<(), VoiceError> {
    let audio = audio.clone();
    let (ready_tx, ready_rx) = std::sync::mpsc::channel();

    std::thread::Builder::new()
        .name("voicewire-capture".to_string())
        .spawn(move || {
            let built = (|| -> Result<CapturePipeline<MicCapture>, VoiceError> {
                let mut mic = MicCapture::new(audio.input_device.as_deref(), audio.sample_rate)?;
                mic.start()?;
                let filters = FilterChain::new(&audio);
                let encoder =
                    VoiceEncoder::new(audio.sample_rate, audio.opus_bitrate, audio.frame_samples)?;
                Ok(CapturePipeline::new(mic, filters, encoder))
            })();

            let interval = Duration::from_millis(audio.capture_interval_ms);
            match built {
                Ok(pipeline) => {
                    let _ = ready_tx.send(Ok(()));
                    run_capture(pipeline, shared, stats, packet_tx, interval, cancel);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            }
        })
        .map_err(|e| VoiceError::Audio(format!("Failed to spawn capture thread: {}", e)))?;

    ready_rx
        .recv()
        .map_err(|_| VoiceError::Audio("Capture thread died during startup".to_string()))?
}
