use std::collections::VecDeque;

use webrtc_model::IceCandidate;

use crate::negotiation::events::RemoteStream;
use crate::peer::PeerConnection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    AwaitingLocalMedia,
    Offering,
    Answering,
    InCall,
    Closing,
    Closed,
}

impl CallState {
    pub fn in_call(&self) -> bool {
        matches!(
            self,
            CallState::Offering | CallState::Answering | CallState::InCall
        )
    }
}

pub(super) struct PeerHandle {
    pub(super) generation: u64,
    pub(super) conn: Box<dyn PeerConnection>,
}

/// The single active negotiation context.
pub(super) struct CallSession {
    pub(super) state: CallState,
    pub(super) peer: Option<PeerHandle>,
    pub(super) remote_description_set: bool,
    pub(super) tracks_attached: bool,
    // Remote candidates that arrived before any remote description, in arrival order.
    pub(super) pending_remote_candidates: VecDeque<IceCandidate>,
    pub(super) remote_stream: Option<RemoteStream>,
}

impl Default for CallSession {
    fn default() -> Self {
        Self {
            state: CallState::Idle,
            peer: None,
            remote_description_set: false,
            tracks_attached: false,
            pending_remote_candidates: VecDeque::new(),
            remote_stream: None,
        }
    }
}

impl CallSession {
    pub(super) fn generation(&self) -> Option<u64> {
        self.peer.as_ref().map(|peer| peer.generation)
    }

    /// Clears everything except `state`.
    pub(super) fn clear(&mut self) {
        self.peer = None;
        self.remote_description_set = false;
        self.tracks_attached = false;
        self.pending_remote_candidates.clear();
        self.remote_stream = None;
    }
}
