use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::{RTCRtpTransceiver, RTCRtpTransceiverInit};
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;
use webrtc_model::{IceCandidate, SdpType, SessionDescription};

use crate::media::{LocalTrack, TrackKind};
use crate::peer::{
    PeerConnection, PeerConnectionFactory, PeerErrors, PeerEvent, PeerEventSink,
    RTCIceConnectionState, RTCSignalingState, RemoteTrack,
};

pub struct RtcPeerFactory {
    webrtc_api: API,
}

impl RtcPeerFactory {
    pub fn new() -> Result<Self, PeerErrors> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;

        let webrtc_api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        Ok(Self { webrtc_api })
    }
}

#[async_trait]
impl PeerConnectionFactory for RtcPeerFactory {
    async fn create(&self, ice_servers: &[String]) -> Result<Box<dyn PeerConnection>, PeerErrors> {
        let ice_servers = if ice_servers.is_empty() {
            Vec::new()
        } else {
            vec![RTCIceServer {
                urls: ice_servers.to_vec(),
                ..Default::default()
            }]
        };
        let config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        let conn = self.webrtc_api.new_peer_connection(config).await?;
        tracing::info!("Created peer connection");
        Ok(Box::new(RtcPeerConnection::new(Arc::new(conn))))
    }
}

type SinkSlot = Arc<Mutex<Option<PeerEventSink>>>;

fn emit(slot: &SinkSlot, event: PeerEvent) {
    match slot.lock() {
        Ok(sink) => match sink.as_ref() {
            Some(sink) => sink.emit(event),
            None => tracing::debug!("No handler registered, dropping {event}"),
        },
        Err(_) => tracing::error!("Peer event handler slot is poisoned"),
    }
}

/// [`PeerConnection`] over a webrtc-rs `RTCPeerConnection`.
///
/// Callbacks are installed once and forward into a swappable sink, so
/// registering and unregistering never races with webrtc-rs internals.
pub struct RtcPeerConnection {
    conn: Arc<RTCPeerConnection>,
    sink: SinkSlot,
}

impl RtcPeerConnection {
    pub fn new(conn: Arc<RTCPeerConnection>) -> Self {
        let peer = Self {
            conn,
            sink: Arc::new(Mutex::new(None)),
        };
        peer.install_handlers();
        peer
    }

    fn install_handlers(&self) {
        let sink = Arc::clone(&self.sink);
        self.conn
            .on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
                match candidate {
                    Some(candidate) => match candidate.to_json() {
                        Ok(init) => {
                            tracing::info!("Found ICE candidate: {}", init.candidate);
                            emit(&sink, PeerEvent::IceCandidate(candidate_from_rtc(init)));
                        }
                        Err(err) => tracing::error!("Could not serialize ICE candidate: {err}"),
                    },
                    None => {
                        tracing::info!("ICE gathering completed");
                        emit(&sink, PeerEvent::IceGatheringComplete);
                    }
                }
                Box::pin(async {})
            }));

        let sink = Arc::clone(&self.sink);
        self.conn.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                tracing::info!("Received remote track");
                emit(&sink, PeerEvent::Track(track));
                Box::pin(async {})
            },
        ));

        let sink = Arc::clone(&self.sink);
        self.conn
            .on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
                tracing::info!("ICE connection state changed to: {state}");
                emit(&sink, PeerEvent::IceConnectionState(state));
                Box::pin(async {})
            }));

        let sink = Arc::clone(&self.sink);
        self.conn
            .on_signaling_state_change(Box::new(move |state: RTCSignalingState| {
                tracing::info!("Signaling state changed to: {state}");
                emit(&sink, PeerEvent::SignalingState(state));
                Box::pin(async {})
            }));
    }

    async fn ensure_receiving(&self) -> Result<(), PeerErrors> {
        let transceivers = self.conn.get_transceivers().await;
        for kind in [RTPCodecType::Audio, RTPCodecType::Video] {
            if !transceivers.iter().any(|transceiver| transceiver.kind() == kind) {
                self.conn
                    .add_transceiver_from_kind(
                        kind,
                        Some(RTCRtpTransceiverInit {
                            direction: RTCRtpTransceiverDirection::Recvonly,
                            send_encodings: vec![],
                        }),
                    )
                    .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PeerConnection for RtcPeerConnection {
    async fn create_offer(&self) -> Result<SessionDescription, PeerErrors> {
        self.ensure_receiving().await?;
        description_from_rtc(self.conn.create_offer(None).await?)
    }

    async fn create_answer(&self) -> Result<SessionDescription, PeerErrors> {
        description_from_rtc(self.conn.create_answer(None).await?)
    }

    async fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), PeerErrors> {
        self.conn
            .set_local_description(description_to_rtc(description)?)
            .await?;
        Ok(())
    }

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), PeerErrors> {
        self.conn
            .set_remote_description(description_to_rtc(description)?)
            .await?;
        Ok(())
    }

    async fn add_track(&self, track: Arc<LocalTrack>) -> Result<(), PeerErrors> {
        let rtp_track: Arc<dyn TrackLocal + Send + Sync> = track.rtp_track();
        self.conn.add_track(rtp_track).await?;
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), PeerErrors> {
        self.conn
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate,
                sdp_mid: candidate.sdp_mid,
                sdp_mline_index: candidate.sdp_m_line_index,
                username_fragment: candidate.username_fragment,
            })
            .await?;
        Ok(())
    }

    async fn stop_transceivers(&self) {
        for transceiver in self.conn.get_transceivers().await {
            if let Err(err) = transceiver.stop().await {
                tracing::warn!("Could not stop transceiver: {err}");
            }
        }
    }

    async fn close(&self) -> Result<(), PeerErrors> {
        self.conn.close().await?;
        Ok(())
    }

    fn register_events(&self, sink: PeerEventSink) {
        match self.sink.lock() {
            Ok(mut slot) => *slot = Some(sink),
            Err(_) => tracing::error!("Peer event handler slot is poisoned"),
        }
    }

    fn unregister_events(&self) {
        if let Ok(mut slot) = self.sink.lock() {
            slot.take();
        }
        self.conn
            .on_ice_candidate(Box::new(|_: Option<RTCIceCandidate>| Box::pin(async {})));
        self.conn.on_track(Box::new(
            |_: Arc<TrackRemote>, _: Arc<RTCRtpReceiver>, _: Arc<RTCRtpTransceiver>| {
                Box::pin(async {})
            },
        ));
        self.conn
            .on_ice_connection_state_change(Box::new(|_: RTCIceConnectionState| {
                Box::pin(async {})
            }));
        self.conn
            .on_signaling_state_change(Box::new(|_: RTCSignalingState| Box::pin(async {})));
    }
}

impl RemoteTrack for TrackRemote {
    fn id(&self) -> String {
        TrackRemote::id(self)
    }

    fn stream_id(&self) -> String {
        TrackRemote::stream_id(self)
    }

    fn kind(&self) -> Option<TrackKind> {
        match TrackRemote::kind(self) {
            RTPCodecType::Audio => Some(TrackKind::Audio),
            RTPCodecType::Video => Some(TrackKind::Video),
            _ => None,
        }
    }
}

fn candidate_from_rtc(init: RTCIceCandidateInit) -> IceCandidate {
    IceCandidate {
        candidate: init.candidate,
        sdp_mid: init.sdp_mid,
        sdp_m_line_index: init.sdp_mline_index,
        username_fragment: init.username_fragment,
    }
}

fn description_from_rtc(description: RTCSessionDescription) -> Result<SessionDescription, PeerErrors> {
    let sdp_type = match description.sdp_type {
        RTCSdpType::Offer => SdpType::Offer,
        RTCSdpType::Answer => SdpType::Answer,
        RTCSdpType::Pranswer => SdpType::Pranswer,
        RTCSdpType::Rollback => SdpType::Rollback,
        RTCSdpType::Unspecified => {
            return Err(PeerErrors::InvalidDescription(
                "description type is unspecified".to_owned(),
            ))
        }
    };
    Ok(SessionDescription {
        sdp_type,
        sdp: description.sdp,
    })
}

fn description_to_rtc(description: SessionDescription) -> Result<RTCSessionDescription, PeerErrors> {
    let rtc = match description.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(description.sdp)?,
        SdpType::Answer => RTCSessionDescription::answer(description.sdp)?,
        SdpType::Pranswer => RTCSessionDescription::pranswer(description.sdp)?,
        SdpType::Rollback => {
            return Err(PeerErrors::InvalidDescription(
                "rollback descriptions are not supported".to_owned(),
            ))
        }
    };
    Ok(rtc)
}
