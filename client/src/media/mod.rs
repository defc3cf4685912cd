mod errors;
mod sample;

pub use errors::MediaAcquisitionError;
pub use sample::SampleDevices;

use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use webrtc::media::Sample;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackKind::Audio => f.write_str("audio"),
            TrackKind::Video => f.write_str("video"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoConstraints {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: Option<VideoConstraints>,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: Some(VideoConstraints {
                width: 720,
                height: 540,
            }),
        }
    }
}

/// One captured track. Capture pipelines push samples through [`LocalTrack::write_sample`].
pub struct LocalTrack {
    kind: TrackKind,
    enabled: AtomicBool,
    rtp: Arc<TrackLocalStaticSample>,
}

impl LocalTrack {
    /// Tracks start disabled until the stream is resumed.
    pub fn new(kind: TrackKind, rtp: Arc<TrackLocalStaticSample>) -> Self {
        Self {
            kind,
            enabled: AtomicBool::new(false),
            rtp,
        }
    }

    pub fn id(&self) -> &str {
        self.rtp.id()
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn rtp_track(&self) -> Arc<TrackLocalStaticSample> {
        Arc::clone(&self.rtp)
    }

    /// Returns whether the sample was forwarded; disabled tracks drop it.
    pub async fn write_sample(&self, sample: &Sample) -> Result<bool, webrtc::Error> {
        if !self.is_enabled() {
            return Ok(false);
        }
        self.rtp.write_sample(sample).await?;
        Ok(true)
    }
}

impl fmt::Debug for LocalTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalTrack")
            .field("id", &self.id())
            .field("kind", &self.kind)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

#[derive(Debug)]
pub struct LocalStream {
    id: String,
    tracks: Vec<Arc<LocalTrack>>,
}

impl LocalStream {
    pub fn new(id: impl Into<String>, tracks: Vec<Arc<LocalTrack>>) -> Self {
        Self {
            id: id.into(),
            tracks,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[Arc<LocalTrack>] {
        &self.tracks
    }

    fn set_enabled(&self, enabled: bool) {
        for track in &self.tracks {
            track.set_enabled(enabled);
        }
    }
}

/// Device capture capability (camera and microphone).
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn get_user_media(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<LocalStream, MediaAcquisitionError>;
}

/// Owns the local capture stream and its projection onto the display surface.
///
/// Pausing and resuming only flip track enablement and display attachment;
/// the stream itself is requested once and kept until [`MediaController::release`].
pub struct MediaController {
    devices: Arc<dyn MediaDevices>,
    constraints: MediaConstraints,
    stream: Option<Arc<LocalStream>>,
    display: watch::Sender<Option<Arc<LocalStream>>>,
}

impl MediaController {
    pub fn new(devices: Arc<dyn MediaDevices>, constraints: MediaConstraints) -> Self {
        let (display, _) = watch::channel(None);
        Self {
            devices,
            constraints,
            stream: None,
            display,
        }
    }

    /// Display surface: the stream currently rendered locally, `None` while paused.
    pub fn display(&self) -> watch::Receiver<Option<Arc<LocalStream>>> {
        self.display.subscribe()
    }

    pub fn stream(&self) -> Option<Arc<LocalStream>> {
        self.stream.clone()
    }

    pub fn is_active(&self) -> bool {
        self.display.borrow().is_some()
    }

    /// Requests the stream if none is held yet. A fresh stream starts paused.
    pub async fn acquire(&mut self) -> Result<Arc<LocalStream>, MediaAcquisitionError> {
        if let Some(stream) = &self.stream {
            return Ok(Arc::clone(stream));
        }

        let stream = Arc::new(self.devices.get_user_media(&self.constraints).await?);
        stream.set_enabled(false);
        tracing::info!(
            "Acquired local stream {} with {} tracks",
            stream.id(),
            stream.tracks().len()
        );
        self.stream = Some(Arc::clone(&stream));
        Ok(stream)
    }

    /// Acquires if needed and resumes.
    pub async fn start(&mut self) -> Result<Arc<LocalStream>, MediaAcquisitionError> {
        let stream = self.acquire().await?;
        self.resume();
        Ok(stream)
    }

    pub fn pause(&self) {
        if let Some(stream) = &self.stream {
            stream.set_enabled(false);
        }
        self.display.send_replace(None);
    }

    /// Returns `false` when there is no stream to resume.
    pub fn resume(&self) -> bool {
        match &self.stream {
            Some(stream) => {
                stream.set_enabled(true);
                self.display.send_replace(Some(Arc::clone(stream)));
                true
            }
            None => {
                tracing::warn!("No local stream acquired, nothing to resume");
                false
            }
        }
    }

    pub fn release(&mut self) {
        self.pause();
        if let Some(stream) = self.stream.take() {
            tracing::info!("Released local stream {}", stream.id());
        }
    }
}
