//! Peer transport: the WebRTC connection to the realtime service
//!
//! Wraps a single `RTCPeerConnection` carrying one outbound Opus track, the
//! inbound assistant audio track, and two data channels (control + events).
//! Every transport callback is reduced to a `SessionEvent` pushed into the
//! session's event queue; no callback mutates session state directly.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS};
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use crate::config::TransportConfig;
use crate::errors::VoiceError;
use crate::session::SessionEvent;

/// Peer connection lifecycle state, derived from the ICE connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Completed,
    Failed,
    Disconnected,
    Closed,
}

impl From<RTCIceConnectionState> for ConnectionState {
    fn from(state: RTCIceConnectionState) -> Self {
        match state {
            RTCIceConnectionState::Unspecified | RTCIceConnectionState::New => ConnectionState::New,
            RTCIceConnectionState::Checking => ConnectionState::Connecting,
            RTCIceConnectionState::Connected => ConnectionState::Connected,
            RTCIceConnectionState::Completed => ConnectionState::Completed,
            RTCIceConnectionState::Failed => ConnectionState::Failed,
            RTCIceConnectionState::Disconnected => ConnectionState::Disconnected,
            RTCIceConnectionState::Closed => ConnectionState::Closed,
        }
    }
}

/// The single peer connection of a session.
///
/// Created once per process run; there is no reconnection path. All
/// lifecycle notifications surface as `SessionEvent`s on the channel given
/// at construction, and inbound audio payloads land on the playback channel.
pub struct PeerTransport {
    pc: Arc<RTCPeerConnection>,
    audio_track: Arc<TrackLocalStaticSample>,
    control_channel: Arc<RTCDataChannel>,
    events_channel: Mutex<Option<Arc<RTCDataChannel>>>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_label: String,
}

impl PeerTransport {
    /// Create the peer connection, register its callbacks and open the
    /// control data channel so the offer carries it.
    pub async fn new(
        config: &TransportConfig,
        events_tx: mpsc::UnboundedSender<SessionEvent>,
        inbound_tx: mpsc::Sender<Bytes>,
    ) -> Result<Self, VoiceError> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| VoiceError::Transport(format!("Failed to register codecs: {}", e)))?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(|e| VoiceError::Transport(format!("Failed to register interceptors: {}", e)))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        // Empty server list means host candidates only (used by tests)
        let ice_servers = if config.stun_servers.is_empty() {
            Vec::new()
        } else {
            vec![RTCIceServer {
                urls: config.stun_servers.clone(),
                ..Default::default()
            }]
        };

        let pc = Arc::new(
            api.new_peer_connection(RTCConfiguration {
                ice_servers,
                ..Default::default()
            })
            .await
            .map_err(|e| VoiceError::Transport(format!("Failed to create peer connection: {}", e)))?,
        );

        // Outbound Opus track for microphone audio
        let audio_track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                ..Default::default()
            },
            "audio".to_owned(),
            "voicewire".to_owned(),
        ));

        let rtp_sender = pc
            .add_track(Arc::clone(&audio_track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| VoiceError::Transport(format!("Failed to add audio track: {}", e)))?;

        // Drain RTCP so the sender interceptors keep doing their work
        tokio::spawn(async move {
            let mut rtcp_buf = vec![0u8; 1500];
            while let Ok((_, _)) = rtp_sender.read(&mut rtcp_buf).await {}
        });

        {
            let events = events_tx.clone();
            pc.on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
                log::info!("ICE connection state changed to: {:?}", state);
                let _ = events.send(SessionEvent::StateChanged(state.into()));
                Box::pin(async {})
            }));
        }

        {
            // A None candidate marks the end of gathering: the local
            // description is complete and ready for the signaling exchange.
            let events = events_tx.clone();
            pc.on_ice_candidate(Box::new(move |candidate| {
                match candidate {
                    Some(c) => log::debug!("Gathered local ICE candidate: {}", c),
                    None => {
                        log::info!("ICE candidate gathering completed");
                        let _ = events.send(SessionEvent::OfferReady);
                    }
                }
                Box::pin(async {})
            }));
        }

        {
            // Inbound assistant audio: forward every RTP payload to the
            // playback pipeline, dropping on backpressure rather than queuing.
            let inbound = inbound_tx.clone();
            pc.on_track(Box::new(move |track, _receiver, _transceiver| {
                log::info!("Inbound track opened");
                let inbound = inbound.clone();
                Box::pin(async move {
                    tokio::spawn(async move {
                        while let Ok((packet, _)) = track.read_rtp().await {
                            if packet.payload.is_empty() {
                                continue;
                            }
                            let _ = inbound.try_send(packet.payload);
                        }
                        log::info!("Inbound track ended");
                    });
                })
            }));
        }

        {
            // The service may announce channels of its own; log and move on.
            pc.on_data_channel(Box::new(|dc: Arc<RTCDataChannel>| {
                log::debug!("Remote data channel announced: {}", dc.label());
                Box::pin(async {})
            }));
        }

        // Control channel, created before the offer so the SDP carries an
        // application section.
        let control_channel = pc
            .create_data_channel(
                &config.control_channel_label,
                Some(RTCDataChannelInit {
                    ordered: Some(true),
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| VoiceError::Transport(format!("Failed to create control channel: {}", e)))?;

        {
            let events = events_tx.clone();
            control_channel.on_open(Box::new(move || {
                let _ = events.send(SessionEvent::ControlChannelOpen);
                Box::pin(async {})
            }));
        }
        {
            let events = events_tx.clone();
            control_channel.on_message(Box::new(move |msg: DataChannelMessage| {
                let text = String::from_utf8_lossy(&msg.data).to_string();
                let _ = events.send(SessionEvent::ControlMessage(text));
                Box::pin(async {})
            }));
        }

        Ok(Self {
            pc,
            audio_track,
            control_channel,
            events_channel: Mutex::new(None),
            events_tx,
            events_label: config.events_channel_label.clone(),
        })
    }

    /// Create the offer and install it as the local description. The
    /// completed description is announced later via `OfferReady`.
    pub async fn create_offer(&self) -> Result<(), VoiceError> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| VoiceError::Transport(format!("Failed to create offer: {}", e)))?;
        self.pc
            .set_local_description(offer)
            .await
            .map_err(|e| VoiceError::Transport(format!("Failed to set local description: {}", e)))
    }

    /// The complete local description SDP, once gathering has finished.
    pub async fn local_description(&self) -> Result<String, VoiceError> {
        self.pc
            .local_description()
            .await
            .map(|d| d.sdp)
            .ok_or_else(|| VoiceError::Transport("Local description not set".to_string()))
    }

    /// Install the answer received from the signaling exchange.
    pub async fn apply_remote_answer(&self, answer_sdp: String) -> Result<(), VoiceError> {
        let answer = RTCSessionDescription::answer(answer_sdp)
            .map_err(|e| VoiceError::Transport(format!("Invalid SDP answer: {}", e)))?;
        self.pc
            .set_remote_description(answer)
            .await
            .map_err(|e| VoiceError::Transport(format!("Failed to set remote description: {}", e)))
    }

    /// The currently installed remote description, if any.
    pub async fn remote_description(&self) -> Option<String> {
        self.pc.remote_description().await.map(|d| d.sdp)
    }

    /// Create the auxiliary event channel. Idempotent: once created,
    /// later calls are no-ops.
    pub async fn create_events_channel(&self) -> Result<(), VoiceError> {
        let exists = self.events_channel.lock().unwrap().is_some();
        if exists {
            return Ok(());
        }

        let dc = self
            .pc
            .create_data_channel(
                &self.events_label,
                Some(RTCDataChannelInit {
                    ordered: Some(true),
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| VoiceError::Transport(format!("Failed to create event channel: {}", e)))?;

        {
            let events = self.events_tx.clone();
            dc.on_open(Box::new(move || {
                let _ = events.send(SessionEvent::EventsChannelOpen);
                Box::pin(async {})
            }));
        }
        {
            let events = self.events_tx.clone();
            dc.on_message(Box::new(move |msg: DataChannelMessage| {
                let text = String::from_utf8_lossy(&msg.data).to_string();
                let _ = events.send(SessionEvent::EventsMessage(text));
                Box::pin(async {})
            }));
        }

        log::info!("Event channel '{}' created", self.events_label);
        *self.events_channel.lock().unwrap() = Some(dc);
        Ok(())
    }

    /// Send a control payload over the event channel.
    pub async fn send_event(&self, payload: &str) -> Result<(), VoiceError> {
        let dc = self.events_channel.lock().unwrap().as_ref().cloned();
        match dc {
            Some(dc) => dc
                .send_text(payload.to_string())
                .await
                .map(|_| ())
                .map_err(|e| VoiceError::Transport(format!("Failed to send event: {}", e))),
            None => Err(VoiceError::Transport("Event channel not created".to_string())),
        }
    }

    /// Write one encoded audio packet onto the outbound track.
    pub async fn send_audio(&self, data: Bytes, duration: Duration) -> Result<(), VoiceError> {
        self.audio_track
            .write_sample(&Sample {
                data,
                duration,
                ..Default::default()
            })
            .await
            .map_err(|e| VoiceError::Transport(format!("Failed to write audio sample: {}", e)))
    }

    /// Current lifecycle state as seen by the ICE transport.
    pub fn ice_connection_state(&self) -> ConnectionState {
        self.pc.ice_connection_state().into()
    }

    /// Close the data channels and the peer connection.
    pub async fn close(&self) -> Result<(), VoiceError> {
        let events_channel = self.events_channel.lock().unwrap().take();
        if let Some(dc) = events_channel {
            let _ = dc.close().await;
        }
        let _ = self.control_channel.close().await;

        self.pc
            .close()
            .await
            .map_err(|e| VoiceError::Transport(format!("Failed to close peer connection: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_mapping() {
        assert_eq!(
            ConnectionState::from(RTCIceConnectionState::New),
            ConnectionState::New
        );
        assert_eq!(
            ConnectionState::from(RTCIceConnectionState::Checking),
            ConnectionState::Connecting
        );
        assert_eq!(
            ConnectionState::from(RTCIceConnectionState::Completed),
            ConnectionState::Completed
        );
        assert_eq!(
            ConnectionState::from(RTCIceConnectionState::Disconnected),
            ConnectionState::Disconnected
        );
        assert_eq!(
            ConnectionState::from(RTCIceConnectionState::Unspecified),
            ConnectionState::New
        );
    }
}
