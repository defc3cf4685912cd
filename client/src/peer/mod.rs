mod errors;
mod rtc;

pub use errors::PeerErrors;
pub use rtc::{RtcPeerConnection, RtcPeerFactory};
pub use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
pub use webrtc::peer_connection::signaling_state::RTCSignalingState;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use webrtc_model::{IceCandidate, SessionDescription};

use crate::media::{LocalTrack, TrackKind};

pub trait RemoteTrack: Send + Sync {
    fn id(&self) -> String;
    fn stream_id(&self) -> String;
    fn kind(&self) -> Option<TrackKind>;
}

pub enum PeerEvent {
    IceCandidate(IceCandidate),
    IceGatheringComplete,
    Track(Arc<dyn RemoteTrack>),
    IceConnectionState(RTCIceConnectionState),
    SignalingState(RTCSignalingState),
}

impl fmt::Display for PeerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerEvent::IceCandidate(_) => f.write_str("IceCandidate"),
            PeerEvent::IceGatheringComplete => f.write_str("IceGatheringComplete"),
            PeerEvent::Track(track) => write!(f, "Track({})", track.id()),
            PeerEvent::IceConnectionState(state) => write!(f, "IceConnectionState({state})"),
            PeerEvent::SignalingState(state) => write!(f, "SignalingState({state})"),
        }
    }
}

/// Event tagged with the generation of the handle that produced it.
pub struct TaggedPeerEvent {
    pub generation: u64,
    pub event: PeerEvent,
}

/// Where a peer handle delivers its events. Each handle gets its own generation
/// so events racing in from a closed or replaced handle can be recognised.
#[derive(Clone)]
pub struct PeerEventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<TaggedPeerEvent>,
}

impl PeerEventSink {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<TaggedPeerEvent>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn emit(&self, event: PeerEvent) {
        let generation = self.generation;
        if self.tx.send(TaggedPeerEvent { generation, event }).is_err() {
            tracing::debug!("Negotiation engine is gone, dropping peer event");
        }
    }
}

/// The platform SDP/ICE negotiation primitive.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    /// Offers always request receiving both audio and video.
    async fn create_offer(&self) -> Result<SessionDescription, PeerErrors>;
    async fn create_answer(&self) -> Result<SessionDescription, PeerErrors>;
    async fn set_local_description(&self, description: SessionDescription)
        -> Result<(), PeerErrors>;
    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), PeerErrors>;
    async fn add_track(&self, track: Arc<LocalTrack>) -> Result<(), PeerErrors>;
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), PeerErrors>;
    async fn stop_transceivers(&self);
    async fn close(&self) -> Result<(), PeerErrors>;
    fn register_events(&self, sink: PeerEventSink);
    /// Detaches every handler; nothing is emitted afterwards.
    fn unregister_events(&self);
}

#[async_trait]
pub trait PeerConnectionFactory: Send + Sync {
    async fn create(&self, ice_servers: &[String]) -> Result<Box<dyn PeerConnection>, PeerErrors>;
}
