mod errors;
mod events;
mod state;

pub use errors::NegotiationErrors;
pub use events::{CallEvent, CallStatus, EngineHandle, RemoteStream, UserCommand};
pub use state::CallState;

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use webrtc_model::{IceCandidate, Message, SessionDescription};

use crate::media::{LocalStream, MediaAcquisitionError, MediaController};
use crate::negotiation::errors::Stage;
use crate::negotiation::state::{CallSession, PeerHandle};
use crate::peer::{
    PeerConnection, PeerConnectionFactory, PeerErrors, PeerEvent, PeerEventSink,
    RTCIceConnectionState, RTCSignalingState, RemoteTrack, TaggedPeerEvent,
};
use crate::signalling::SignalSink;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub ice_servers: Vec<String>,
    /// The polite side yields when both peers offer at once.
    pub polite: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            polite: false,
        }
    }
}

/// Drives offer/answer/ICE/hangup for one call at a time.
///
/// Every input (signalling message, peer event, user command) is processed to
/// completion before the next one starts, so remote descriptions are always
/// applied before buffered candidates and local descriptions before the SDP
/// leaves the process.
pub struct NegotiationEngine {
    config: EngineConfig,
    factory: Arc<dyn PeerConnectionFactory>,
    media: MediaController,
    signals: Arc<dyn SignalSink>,
    events_tx: Option<mpsc::UnboundedSender<CallEvent>>, // Engine --events--> front-end
    peer_events_tx: mpsc::UnboundedSender<TaggedPeerEvent>,
    peer_events_rx: Option<mpsc::UnboundedReceiver<TaggedPeerEvent>>,
    commands_tx: mpsc::UnboundedSender<UserCommand>,
    commands_rx: Option<mpsc::UnboundedReceiver<UserCommand>>,
    session: CallSession,
    next_generation: u64,
    last_status: CallStatus,
}

impl NegotiationEngine {
    pub fn new(
        config: EngineConfig,
        factory: Arc<dyn PeerConnectionFactory>,
        media: MediaController,
        signals: Arc<dyn SignalSink>,
    ) -> Self {
        let (peer_events_tx, peer_events_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        Self {
            config,
            factory,
            media,
            signals,
            events_tx: None,
            peer_events_tx,
            peer_events_rx: Some(peer_events_rx),
            commands_tx,
            commands_rx: Some(commands_rx),
            session: CallSession::default(),
            next_generation: 0,
            last_status: CallStatus::default(),
        }
    }

    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<CallEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.events_tx = Some(tx);
        rx
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle::new(self.commands_tx.clone())
    }

    pub fn local_display(&self) -> watch::Receiver<Option<Arc<LocalStream>>> {
        self.media.display()
    }

    pub fn state(&self) -> CallState {
        self.session.state
    }

    pub fn status(&self) -> CallStatus {
        CallStatus {
            in_call: self.session.state.in_call(),
            local_video_active: self.media.is_active(),
        }
    }

    // Main loop (until shutdown or the signalling channel goes away)
    pub async fn run(mut self, mut signals_rx: broadcast::Receiver<Message>) {
        let (Some(mut commands_rx), Some(mut peer_events_rx)) =
            (self.commands_rx.take(), self.peer_events_rx.take())
        else {
            tracing::error!("Negotiation engine is already running");
            return;
        };

        loop {
            tokio::select! {
                message = signals_rx.recv() => match message {
                    Ok(message) => self.handle_message(message).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!("Negotiation fell behind signalling, {skipped} messages lost")
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::warn!("Signalling channel is gone, stopping negotiation");
                        break;
                    }
                },
                Some(command) = commands_rx.recv() => {
                    if let UserCommand::Shutdown = command {
                        self.hang_up().await;
                        break;
                    }
                    self.handle_command(command).await;
                }
                Some(tagged) = peer_events_rx.recv() => self.handle_peer_event(tagged).await,
            }
        }

        self.close_session(false).await;
        self.media.release();
        tracing::info!("Negotiation engine stopped");
    }

    pub async fn handle_command(&mut self, command: UserCommand) {
        match command {
            UserCommand::StartLocalVideo => self.start_local_video().await,
            UserCommand::PauseLocalVideo => self.pause_local_video(),
            UserCommand::Call => self.start_call().await,
            UserCommand::HangUp | UserCommand::Shutdown => self.hang_up().await,
        }
    }

    pub async fn handle_message(&mut self, message: Message) {
        match message {
            Message::Offer(offer) => self.handle_offer(offer).await,
            Message::Answer(answer) => self.handle_answer(answer).await,
            Message::IceCandidate(candidate) => self.handle_remote_candidate(candidate).await,
            Message::Hangup => {
                tracing::info!("Remote peer hung up");
                self.close_session(false).await;
            }
        }
    }

    pub async fn handle_peer_event(&mut self, tagged: TaggedPeerEvent) {
        let TaggedPeerEvent { generation, event } = tagged;
        if self.session.generation() != Some(generation) {
            tracing::debug!("Ignoring {event} from stale peer connection #{generation}");
            return;
        }

        match event {
            PeerEvent::IceCandidate(candidate) => {
                self.signals.send(Message::IceCandidate(candidate)).await
            }
            PeerEvent::IceGatheringComplete => tracing::debug!("Local ICE gathering complete"),
            PeerEvent::Track(track) => self.show_remote_track(track),
            PeerEvent::IceConnectionState(state) => match state {
                RTCIceConnectionState::Failed
                | RTCIceConnectionState::Disconnected
                | RTCIceConnectionState::Closed => {
                    tracing::warn!("ICE connection {state}, closing call");
                    self.close_session(false).await;
                }
                _ => tracing::debug!("ICE connection state: {state}"),
            },
            PeerEvent::SignalingState(RTCSignalingState::Closed) => {
                tracing::warn!("Signaling state closed, closing call");
                self.close_session(false).await;
            }
            PeerEvent::SignalingState(state) => tracing::debug!("Signaling state: {state}"),
        }
    }

    pub async fn start_local_video(&mut self) {
        if let Err(err) = self.ensure_local_media().await {
            self.abort(err).await;
        }
    }

    pub fn pause_local_video(&mut self) {
        self.media.pause();
        self.publish_status();
    }

    pub async fn start_call(&mut self) {
        if self.session.state != CallState::Idle || self.session.peer.is_some() {
            tracing::warn!(
                "Call already in progress ({:?}), ignoring call request",
                self.session.state
            );
            return;
        }

        if let Err(err) = self.send_offer().await {
            self.abort(err).await;
        }
    }

    /// Locally initiated close. The remote side is told only when there was a call to end.
    pub async fn hang_up(&mut self) {
        self.close_session(true).await;
    }

    async fn send_offer(&mut self) -> Result<(), NegotiationErrors> {
        self.set_state(CallState::AwaitingLocalMedia);
        self.ensure_local_media().await?;
        self.ensure_peer_connection().await?;
        self.attach_local_tracks().await?;
        self.set_state(CallState::Offering);

        let conn = self.connection()?;
        let offer = conn.create_offer().await.during("create offer")?;
        conn.set_local_description(offer.clone())
            .await
            .during("set local description")?;
        self.signals.send(Message::Offer(offer)).await;
        Ok(())
    }

    async fn handle_offer(&mut self, offer: SessionDescription) {
        tracing::info!("Received SDP Offer");

        if self.session.state == CallState::Offering {
            if !self.config.polite {
                tracing::warn!("Offer collision, keeping local offer and ignoring remote one");
                return;
            }
            tracing::info!("Offer collision, discarding local offer in favour of remote one");
            self.discard_peer_connection().await;
        }

        if let Err(err) = self.send_answer(offer).await {
            self.abort(err).await;
        }
    }

    async fn send_answer(&mut self, offer: SessionDescription) -> Result<(), NegotiationErrors> {
        self.set_state(CallState::Answering);
        self.ensure_peer_connection().await?;
        self.ensure_local_media().await?;

        self.connection()?
            .set_remote_description(offer)
            .await
            .during("apply remote offer")?;
        self.apply_pending_candidates().await;
        self.attach_local_tracks().await?;

        let conn = self.connection()?;
        let answer = conn.create_answer().await.during("create answer")?;
        conn.set_local_description(answer.clone())
            .await
            .during("set local description")?;
        self.signals.send(Message::Answer(answer)).await;

        self.set_state(CallState::InCall);
        Ok(())
    }

    async fn handle_answer(&mut self, answer: SessionDescription) {
        tracing::info!("Received SDP Answer");

        if self.session.state != CallState::Offering {
            tracing::warn!(
                "Currently not waiting for an answer ({:?}), message ignored",
                self.session.state
            );
            return;
        }

        let applied = match self.connection() {
            Ok(conn) => conn
                .set_remote_description(answer)
                .await
                .during("apply remote answer"),
            Err(err) => Err(err),
        };
        if let Err(err) = applied {
            self.abort(err).await;
            return;
        }

        self.apply_pending_candidates().await;
        self.set_state(CallState::InCall);
    }

    async fn handle_remote_candidate(&mut self, candidate: IceCandidate) {
        if self.session.peer.is_none() {
            tracing::warn!("Could not add ICE candidate because there is no peer connection");
            return;
        }

        if self.session.remote_description_set {
            self.apply_candidate(candidate).await;
        } else {
            tracing::debug!("Remote description not set yet, buffering ICE candidate");
            self.session.pending_remote_candidates.push_back(candidate);
        }
    }

    /// Marks the remote description as set and drains buffered candidates in arrival order.
    async fn apply_pending_candidates(&mut self) {
        self.session.remote_description_set = true;

        let pending: Vec<IceCandidate> = self.session.pending_remote_candidates.drain(..).collect();
        if !pending.is_empty() {
            tracing::info!("Applying {} buffered ICE candidates", pending.len());
        }
        for candidate in pending {
            self.apply_candidate(candidate).await;
        }
    }

    async fn apply_candidate(&self, candidate: IceCandidate) {
        let Some(peer) = &self.session.peer else {
            return;
        };
        if let Err(source) = peer.conn.add_ice_candidate(candidate).await {
            tracing::warn!("{}", NegotiationErrors::IceApply(source));
        }
    }

    async fn ensure_local_media(&mut self) -> Result<(), NegotiationErrors> {
        self.media.start().await?;
        self.publish_status();
        Ok(())
    }

    /// Guarded constructor: a live handle is reused, never duplicated.
    async fn ensure_peer_connection(&mut self) -> Result<(), NegotiationErrors> {
        if self.session.peer.is_some() {
            tracing::debug!("Peer connection already exists");
            return Ok(());
        }

        let conn = self
            .factory
            .create(&self.config.ice_servers)
            .await
            .during("create peer connection")?;

        self.next_generation += 1;
        let generation = self.next_generation;
        conn.register_events(PeerEventSink::new(generation, self.peer_events_tx.clone()));
        tracing::info!("Peer connection #{generation} created");

        self.session.peer = Some(PeerHandle { generation, conn });
        Ok(())
    }

    async fn attach_local_tracks(&mut self) -> Result<(), NegotiationErrors> {
        if self.session.tracks_attached {
            return Ok(());
        }
        let Some(stream) = self.media.stream() else {
            return Ok(());
        };

        let conn = self.connection()?;
        for track in stream.tracks() {
            conn.add_track(Arc::clone(track))
                .await
                .during("add local track")?;
        }
        self.session.tracks_attached = true;
        Ok(())
    }

    fn connection(&self) -> Result<&dyn PeerConnection, NegotiationErrors> {
        self.session
            .peer
            .as_ref()
            .map(|peer| peer.conn.as_ref())
            .ok_or(NegotiationErrors::Negotiation {
                stage: "reach peer connection",
                source: PeerErrors::Closed,
            })
    }

    fn show_remote_track(&mut self, track: Arc<dyn RemoteTrack>) {
        let stream_id = track.stream_id();
        match track.kind() {
            Some(kind) => tracing::info!(
                "Remote {kind} track {} arrived on stream {stream_id}",
                track.id()
            ),
            None => tracing::warn!(
                "Remote track {} of unknown kind arrived on stream {stream_id}",
                track.id()
            ),
        }

        // Only the most recent stream is shown; tracks of that stream accumulate.
        let same_stream = self
            .session
            .remote_stream
            .as_ref()
            .is_some_and(|stream| stream.id() == stream_id);
        if same_stream {
            if let Some(stream) = self.session.remote_stream.as_mut() {
                stream.add_track(track);
            }
        } else {
            self.session.remote_stream = Some(RemoteStream::new(stream_id, track));
        }
        self.emit(CallEvent::RemoteStream(self.session.remote_stream.clone()));
    }

    async fn abort(&mut self, err: NegotiationErrors) {
        match &err {
            NegotiationErrors::Media(MediaAcquisitionError::PermissionDenied) => {
                tracing::info!("Local media permission denied, treating as declined call")
            }
            NegotiationErrors::Media(_) => {
                tracing::error!("{err}");
                self.emit(CallEvent::Alert(err.to_string()));
            }
            _ => tracing::error!("{err}"),
        }
        self.close_session(false).await;
    }

    async fn release_peer(peer: PeerHandle) {
        peer.conn.unregister_events();
        peer.conn.stop_transceivers().await;
        if let Err(err) = peer.conn.close().await {
            tracing::warn!("Error while closing peer connection #{}: {err}", peer.generation);
        }
        tracing::info!("Peer connection #{} closed", peer.generation);
    }

    /// Drops the current handle but keeps buffered remote candidates (glare).
    async fn discard_peer_connection(&mut self) {
        if let Some(peer) = self.session.peer.take() {
            Self::release_peer(peer).await;
        }
        self.session.remote_description_set = false;
        self.session.tracks_attached = false;
    }

    async fn close_session(&mut self, notify_remote: bool) {
        let Some(peer) = self.session.peer.take() else {
            if self.session.state != CallState::Idle {
                self.session.clear();
                self.set_state(CallState::Idle);
            }
            return;
        };

        self.set_state(CallState::Closing);
        Self::release_peer(peer).await;

        let had_remote_stream = self.session.remote_stream.is_some();
        self.session.clear();
        if had_remote_stream {
            self.emit(CallEvent::RemoteStream(None));
        }

        if notify_remote {
            self.signals.send(Message::Hangup).await;
        }

        self.set_state(CallState::Closed);
        self.set_state(CallState::Idle);
    }

    fn set_state(&mut self, state: CallState) {
        if self.session.state != state {
            tracing::info!("Call state {:?} -> {:?}", self.session.state, state);
            self.session.state = state;
        }
        self.publish_status();
    }

    fn publish_status(&mut self) {
        let status = self.status();
        if status != self.last_status {
            self.last_status = status;
            self.emit(CallEvent::StateChanged(status));
        }
    }

    fn emit(&self, event: CallEvent) {
        match &self.events_tx {
            Some(chan) => {
                if let Err(err) = chan.send(event) {
                    tracing::error!("Could not send {} event to front-end", err.0);
                }
            }
            None => tracing::debug!("No front-end event subscription"),
        }
    }
}
