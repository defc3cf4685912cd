#[derive(thiserror::Error, Debug)]
pub enum PeerErrors {
    #[error("WebRTC failure: {0}")]
    Rtc(#[from] webrtc::Error),
    #[error("Invalid session description: {0}")]
    InvalidDescription(String),
    #[error("Peer connection is closed")]
    Closed,
}
