//! In-memory capabilities for tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use webrtc_model::{IceCandidate, Message, SdpType, SessionDescription};

use crate::media::{
    LocalStream, LocalTrack, MediaAcquisitionError, MediaConstraints, MediaDevices, SampleDevices,
    TrackKind,
};
use crate::peer::{
    PeerConnection, PeerConnectionFactory, PeerErrors, PeerEvent, PeerEventSink, RemoteTrack,
    TaggedPeerEvent,
};
use crate::signalling::SignalSink;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerCall {
    CreateOffer,
    CreateAnswer,
    SetLocal(SdpType),
    SetRemote(SdpType),
    AddTrack(TrackKind),
    AddCandidate(String),
    StopTransceivers,
    Close,
    Register(u64),
    Unregister,
}

#[derive(Default)]
pub struct FakePeerState {
    calls: Mutex<Vec<PeerCall>>,
    sink: Mutex<Option<PeerEventSink>>,
    generation: Mutex<Option<u64>>,
    pub fail_create_offer: AtomicBool,
    pub fail_set_remote: AtomicBool,
    pub fail_add_candidate: AtomicBool,
}

impl FakePeerState {
    fn record(&self, call: PeerCall) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<PeerCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &PeerCall) -> usize {
        self.calls().iter().filter(|recorded| *recorded == call).count()
    }

    pub fn applied_candidates(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                PeerCall::AddCandidate(candidate) => Some(candidate),
                _ => None,
            })
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.calls().contains(&PeerCall::Close)
    }

    /// Generation handed out at registration, kept after unregistering.
    pub fn generation(&self) -> u64 {
        self.generation
            .lock()
            .unwrap()
            .expect("Peer events were never registered")
    }

    pub fn tagged(&self, event: PeerEvent) -> TaggedPeerEvent {
        TaggedPeerEvent {
            generation: self.generation(),
            event,
        }
    }

    pub fn has_sink(&self) -> bool {
        self.sink.lock().unwrap().is_some()
    }
}

pub struct FakePeer(Arc<FakePeerState>);

#[async_trait]
impl PeerConnection for FakePeer {
    async fn create_offer(&self) -> Result<SessionDescription, PeerErrors> {
        self.0.record(PeerCall::CreateOffer);
        if self.0.fail_create_offer.load(Ordering::SeqCst) {
            return Err(PeerErrors::InvalidDescription("offer rejected".to_owned()));
        }
        Ok(SessionDescription::offer("v=0 local-offer"))
    }

    async fn create_answer(&self) -> Result<SessionDescription, PeerErrors> {
        self.0.record(PeerCall::CreateAnswer);
        Ok(SessionDescription::answer("v=0 local-answer"))
    }

    async fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), PeerErrors> {
        self.0.record(PeerCall::SetLocal(description.sdp_type));
        Ok(())
    }

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), PeerErrors> {
        self.0.record(PeerCall::SetRemote(description.sdp_type));
        if self.0.fail_set_remote.load(Ordering::SeqCst) {
            return Err(PeerErrors::InvalidDescription("remote rejected".to_owned()));
        }
        Ok(())
    }

    async fn add_track(&self, track: Arc<LocalTrack>) -> Result<(), PeerErrors> {
        self.0.record(PeerCall::AddTrack(track.kind()));
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), PeerErrors> {
        self.0.record(PeerCall::AddCandidate(candidate.candidate));
        if self.0.fail_add_candidate.load(Ordering::SeqCst) {
            return Err(PeerErrors::Closed);
        }
        Ok(())
    }

    async fn stop_transceivers(&self) {
        self.0.record(PeerCall::StopTransceivers);
    }

    async fn close(&self) -> Result<(), PeerErrors> {
        self.0.record(PeerCall::Close);
        Ok(())
    }

    fn register_events(&self, sink: PeerEventSink) {
        self.0.record(PeerCall::Register(sink.generation()));
        *self.0.generation.lock().unwrap() = Some(sink.generation());
        *self.0.sink.lock().unwrap() = Some(sink);
    }

    fn unregister_events(&self) {
        self.0.record(PeerCall::Unregister);
        self.0.sink.lock().unwrap().take();
    }
}

#[derive(Default)]
pub struct FakePeerFactory {
    peers: Mutex<Vec<Arc<FakePeerState>>>,
    ice_server_configs: Mutex<Vec<Vec<String>>>,
    pub fail_create_offer: AtomicBool,
    pub fail_set_remote: AtomicBool,
    pub fail_add_candidate: AtomicBool,
}

impl FakePeerFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn created(&self) -> usize {
        self.peers.lock().unwrap().len()
    }

    pub fn ice_server_configs(&self) -> Vec<Vec<String>> {
        self.ice_server_configs.lock().unwrap().clone()
    }

    pub fn peer(&self, index: usize) -> Arc<FakePeerState> {
        Arc::clone(&self.peers.lock().unwrap()[index])
    }

    pub fn last(&self) -> Arc<FakePeerState> {
        Arc::clone(
            self.peers
                .lock()
                .unwrap()
                .last()
                .expect("No peer connection was created"),
        )
    }
}

#[async_trait]
impl PeerConnectionFactory for FakePeerFactory {
    async fn create(&self, ice_servers: &[String]) -> Result<Box<dyn PeerConnection>, PeerErrors> {
        let state = Arc::new(FakePeerState::default());
        state
            .fail_create_offer
            .store(self.fail_create_offer.load(Ordering::SeqCst), Ordering::SeqCst);
        state
            .fail_set_remote
            .store(self.fail_set_remote.load(Ordering::SeqCst), Ordering::SeqCst);
        state
            .fail_add_candidate
            .store(self.fail_add_candidate.load(Ordering::SeqCst), Ordering::SeqCst);

        self.ice_server_configs
            .lock()
            .unwrap()
            .push(ice_servers.to_vec());
        self.peers.lock().unwrap().push(Arc::clone(&state));
        Ok(Box::new(FakePeer(state)))
    }
}

pub struct FakeDevices {
    requests: AtomicUsize,
    failure: Option<MediaAcquisitionError>,
}

impl FakeDevices {
    pub fn working() -> Arc<Self> {
        Arc::new(Self {
            requests: AtomicUsize::new(0),
            failure: None,
        })
    }

    pub fn failing(failure: MediaAcquisitionError) -> Arc<Self> {
        Arc::new(Self {
            requests: AtomicUsize::new(0),
            failure: Some(failure),
        })
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaDevices for FakeDevices {
    async fn get_user_media(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<LocalStream, MediaAcquisitionError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(failure) => Err(failure.clone()),
            None => SampleDevices.get_user_media(constraints).await,
        }
    }
}

#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<Message>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<Message> {
        self.sent.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.sent().iter().map(|message| message.kind()).collect()
    }
}

#[async_trait]
impl SignalSink for RecordingSink {
    async fn send(&self, message: Message) {
        self.sent.lock().unwrap().push(message);
    }
}

pub struct FakeRemoteTrack {
    pub id: String,
    pub stream_id: String,
    pub kind: TrackKind,
}

impl FakeRemoteTrack {
    pub fn new(id: &str, stream_id: &str, kind: TrackKind) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_owned(),
            stream_id: stream_id.to_owned(),
            kind,
        })
    }
}

impl RemoteTrack for FakeRemoteTrack {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn stream_id(&self) -> String {
        self.stream_id.clone()
    }

    fn kind(&self) -> Option<TrackKind> {
        Some(self.kind)
    }
}
