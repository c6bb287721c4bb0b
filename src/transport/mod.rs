//! Peer transport module
//!
//! Wraps the `webrtc` crate behind the one surface the session needs:
//! offer/answer lifecycle, the outbound Opus track, and the control/event
//! data channels.

mod peer;

pub use peer::{ConnectionState, PeerTransport};
