use std::fmt::Display;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::peer::RemoteTrack;

pub enum UserCommand {
    StartLocalVideo,
    PauseLocalVideo,
    Call,
    HangUp,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CallStatus {
    pub in_call: bool,
    pub local_video_active: bool,
}

/// Remote media to render. Tracks sharing a stream id accumulate here.
#[derive(Clone)]
pub struct RemoteStream {
    id: String,
    tracks: Vec<Arc<dyn RemoteTrack>>,
}

impl RemoteStream {
    pub fn new(id: String, track: Arc<dyn RemoteTrack>) -> Self {
        Self {
            id,
            tracks: vec![track],
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[Arc<dyn RemoteTrack>] {
        &self.tracks
    }

    pub(super) fn add_track(&mut self, track: Arc<dyn RemoteTrack>) {
        self.tracks.push(track);
    }
}

/// Engine --events--> front-end
pub enum CallEvent {
    StateChanged(CallStatus),
    RemoteStream(Option<RemoteStream>),
    Alert(String),
}

impl Display for CallEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallEvent::StateChanged(status) => write!(
                f,
                "StateChanged(in_call: {}, local_video_active: {})",
                status.in_call, status.local_video_active
            ),
            CallEvent::RemoteStream(Some(stream)) => {
                let kinds: Vec<String> = stream
                    .tracks()
                    .iter()
                    .map(|track| match track.kind() {
                        Some(kind) => kind.to_string(),
                        None => "unknown".to_owned(),
                    })
                    .collect();
                write!(f, "RemoteStream({}, [{}])", stream.id(), kinds.join(", "))
            }
            CallEvent::RemoteStream(None) => f.write_str("RemoteStream(none)"),
            CallEvent::Alert(text) => write!(f, "Alert({text})"),
        }
    }
}

/// Front-end side of the engine. Commands queue up and are processed one at a time.
#[derive(Clone)]
pub struct EngineHandle {
    commands_tx: mpsc::UnboundedSender<UserCommand>,
}

impl EngineHandle {
    pub(super) fn new(commands_tx: mpsc::UnboundedSender<UserCommand>) -> Self {
        Self { commands_tx }
    }

    pub fn start_local_video(&self) {
        self.send(UserCommand::StartLocalVideo);
    }

    pub fn pause_local_video(&self) {
        self.send(UserCommand::PauseLocalVideo);
    }

    pub fn call(&self) {
        self.send(UserCommand::Call);
    }

    pub fn hang_up(&self) {
        self.send(UserCommand::HangUp);
    }

    pub fn shutdown(&self) {
        self.send(UserCommand::Shutdown);
    }

    fn send(&self, command: UserCommand) {
        if self.commands_tx.send(command).is_err() {
            tracing::warn!("Negotiation engine has stopped, command ignored");
        }
    }
}
