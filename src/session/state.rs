//! Shared session state and transport events
//!
//! All transport callbacks reduce to `SessionEvent`s drained by the session
//! event loop, which is the single writer of `SessionShared`. The audio
//! capture thread only ever reads the derived ready flag, with relaxed
//! ordering: a stale value for one frame period merely delays a send/skip
//! decision, it can never corrupt state.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use crate::transport::ConnectionState;

/// Event emitted by the peer transport callbacks.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// ICE connection state changed
    StateChanged(ConnectionState),
    /// ICE gathering finished; the local description is complete
    OfferReady,
    /// The control data channel opened
    ControlChannelOpen,
    /// Message received on the control channel
    ControlMessage(String),
    /// The auxiliary event channel opened
    EventsChannelOpen,
    /// Message received on the event channel
    EventsMessage(String),
}

/// State shared between the event loop and the capture thread.
pub struct SessionShared {
    state: Mutex<ConnectionState>,
    events_channel_up: AtomicBool,
    /// Derived flag: event channel up AND connection completed
    channel_ready: AtomicBool,
}

impl SessionShared {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ConnectionState::New),
            events_channel_up: AtomicBool::new(false),
            channel_ready: AtomicBool::new(false),
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    /// Record a state transition. Any transition away from Completed clears
    /// the ready flag regardless of its prior value.
    pub fn set_connection_state(&self, state: ConnectionState) {
        *self.state.lock().unwrap() = state;
        self.recompute_ready();
    }

    /// Record that the auxiliary event channel is up.
    pub fn mark_events_channel(&self) {
        self.events_channel_up.store(true, Ordering::Relaxed);
        self.recompute_ready();
    }

    /// Whether the session may transmit audio and control messages.
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.channel_ready.load(Ordering::Relaxed)
    }

    fn recompute_ready(&self) {
        let ready = self.events_channel_up.load(Ordering::Relaxed)
            && self.connection_state() == ConnectionState::Completed;
        self.channel_ready.store(ready, Ordering::Relaxed);
    }
}

impl Default for SessionShared {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters maintained by the audio pipelines.
#[derive(Debug, Default)]
pub struct SessionStats {
    /// Capture frames read from the input device
    pub frames_captured: AtomicU64,
    /// Encoded packets handed to the transport
    pub packets_sent: AtomicU64,
    /// Encoded packets dropped while the session was not ready
    pub packets_dropped: AtomicU64,
    /// Inbound packets decoded and played back
    pub packets_received: AtomicU64,
}

impl SessionStats {
    pub fn snapshot(&self) -> (u64, u64, u64, u64) {
        (
            self.frames_captured.load(Ordering::Relaxed),
            self.packets_sent.load(Ordering::Relaxed),
            self.packets_dropped.load(Ordering::Relaxed),
            self.packets_received.load(Ordering::Relaxed),
        )
    }
}
