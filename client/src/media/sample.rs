use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use crate::media::{
    LocalStream, LocalTrack, MediaAcquisitionError, MediaConstraints, MediaDevices, TrackKind,
};

/// Devices backed by sample-fed webrtc-rs tracks (Opus audio, VP8 video).
/// An external capture pipeline feeds them through [`LocalTrack::write_sample`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SampleDevices;

#[async_trait]
impl MediaDevices for SampleDevices {
    async fn get_user_media(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<LocalStream, MediaAcquisitionError> {
        if !constraints.audio && constraints.video.is_none() {
            return Err(MediaAcquisitionError::Other(
                "neither audio nor video was requested".to_owned(),
            ));
        }

        let stream_id = format!("videocall-{}", Uuid::new_v4());
        let mut tracks = Vec::new();

        if constraints.audio {
            let track = TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_OPUS.to_owned(),
                    clock_rate: 48000,
                    channels: 2,
                    ..Default::default()
                },
                "audio".to_owned(),
                stream_id.clone(),
            );
            tracks.push(Arc::new(LocalTrack::new(TrackKind::Audio, Arc::new(track))));
        }

        if let Some(video) = &constraints.video {
            tracing::info!("Video track targets {}x{}", video.width, video.height);
            let track = TrackLocalStaticSample::new(
                RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_VP8.to_owned(),
                    clock_rate: 90000,
                    ..Default::default()
                },
                "video".to_owned(),
                stream_id.clone(),
            );
            tracks.push(Arc::new(LocalTrack::new(TrackKind::Video, Arc::new(track))));
        }

        Ok(LocalStream::new(stream_id, tracks))
    }
}
