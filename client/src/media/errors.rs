#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaAcquisitionError {
    #[error("Unable to start your call because no camera and/or microphone were found: {0}")]
    DeviceNotFound(String),
    #[error("Permission to use camera and microphone was denied")]
    PermissionDenied,
    #[error("Error opening your camera and/or microphone: {0}")]
    Other(String),
}
