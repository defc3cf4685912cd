use std::str::FromStr;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{mpsc, watch};

use crate::media::LocalStream;
use crate::negotiation::{CallEvent, EngineHandle};
use crate::signalling::ConnectionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ConsoleCommand {
    Start,
    Pause,
    Call,
    HangUp,
    Quit,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("Unknown command {0:?}, expected one of: start, pause, call, hangup, quit")]
pub(super) struct UnknownCommand(String);

impl FromStr for ConsoleCommand {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(ConsoleCommand::Start),
            "pause" => Ok(ConsoleCommand::Pause),
            "call" => Ok(ConsoleCommand::Call),
            "hangup" | "hang-up" => Ok(ConsoleCommand::HangUp),
            "quit" | "exit" => Ok(ConsoleCommand::Quit),
            other => Err(UnknownCommand(other.to_owned())),
        }
    }
}

// Border between the terminal and the negotiation engine.
// Plays the role a page's buttons and video elements would.
pub(super) struct Console {
    engine: EngineHandle,
    local_display: watch::Receiver<Option<Arc<LocalStream>>>,
    relay_state: watch::Receiver<ConnectionState>,
}

impl Console {
    pub(super) fn new(
        engine: EngineHandle,
        local_display: watch::Receiver<Option<Arc<LocalStream>>>,
        relay_state: watch::Receiver<ConnectionState>,
    ) -> Self {
        Self {
            engine,
            local_display,
            relay_state,
        }
    }

    /// Returns once the user quits, input ends, or the engine stops publishing events.
    pub(super) async fn run<R>(
        &self,
        input: R,
        mut events_rx: mpsc::UnboundedReceiver<CallEvent>,
    ) where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        let mut local_display = self.local_display.clone();
        let mut relay_state = self.relay_state.clone();
        let mut display_open = true;
        let mut relay_open = true;

        loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) if line.trim().is_empty() => continue,
                    Ok(Some(line)) => match line.parse::<ConsoleCommand>() {
                        Ok(ConsoleCommand::Quit) => break,
                        Ok(command) => self.dispatch(command),
                        Err(err) => tracing::warn!("{err}"),
                    },
                    Ok(None) => {
                        tracing::info!("Console input closed");
                        break;
                    }
                    Err(err) => {
                        tracing::error!("Could not read console input: {err}");
                        break;
                    }
                },
                event = events_rx.recv() => match event {
                    Some(CallEvent::Alert(text)) => tracing::error!("{text}"),
                    Some(event) => tracing::info!("Got event from engine: {event}"),
                    None => {
                        tracing::warn!("Engine stopped publishing events");
                        return;
                    }
                },
                changed = local_display.changed(), if display_open => match changed {
                    Ok(()) => show_local_display(&local_display),
                    Err(_) => display_open = false,
                },
                changed = relay_state.changed(), if relay_open => match changed {
                    Ok(()) => tracing::info!("Relay connection: {:?}", *relay_state.borrow()),
                    Err(_) => relay_open = false,
                },
            }
        }

        self.engine.shutdown();
    }

    fn dispatch(&self, command: ConsoleCommand) {
        match command {
            ConsoleCommand::Start => self.engine.start_local_video(),
            ConsoleCommand::Pause => self.engine.pause_local_video(),
            ConsoleCommand::Call => self.engine.call(),
            ConsoleCommand::HangUp => self.engine.hang_up(),
            ConsoleCommand::Quit => self.engine.shutdown(),
        }
    }
}

fn show_local_display(display: &watch::Receiver<Option<Arc<LocalStream>>>) {
    match display.borrow().as_ref() {
        Some(stream) => tracing::info!(
            "Local preview showing stream {} ({} tracks)",
            stream.id(),
            stream.tracks().len()
        ),
        None => tracing::info!("Local preview hidden"),
    }
}
