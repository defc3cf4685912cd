#[derive(thiserror::Error, Debug)]
pub enum SignallingErrors {
    #[error("Connection failed")]
    ConnectionFailed,
    #[error("Connection is not opened")]
    ConnectionIsNotOpened,
    #[error("Failed to send signalling message")]
    SendFailed,
    #[error("Failed to (de)serialize message")]
    SerdeError(#[from] serde_json::Error),
}
