mod errors;
mod reconnect;

pub use errors::SignallingErrors;
pub use reconnect::ReconnectPolicy;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::SinkExt;
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::{self, Utf8Bytes};
use tokio_tungstenite::MaybeTlsStream;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use webrtc_model::{DecodeError, Message};

type WsTx = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, tungstenite::protocol::Message>;
type WsRx = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

// Slow subscribers lag (and are told so) instead of blocking the reader.
// A subscriber more than this many messages behind loses the oldest ones,
// offers included, so it has to cover a burst of candidates arriving while
// the engine waits on a media prompt.
const SUBSCRIBER_BUFFER: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Outbound half of signalling as seen by the negotiation engine.
#[async_trait]
pub trait SignalSink: Send + Sync {
    /// Fire and forget: a message that cannot be written is logged and dropped.
    async fn send(&self, message: Message);
}

/// Reconnecting WebSocket link to the relay. Knows nothing about calls:
/// every decoded inbound [`Message`] is broadcast to all subscribers.
pub struct SignallingChannel {
    url: String,
    policy: ReconnectPolicy,
    state: watch::Sender<ConnectionState>,
    ws_tx: Mutex<Option<WsTx>>,
    messages_tx: broadcast::Sender<Message>,
    shutdown: CancellationToken,
}

impl SignallingChannel {
    pub fn new_shared(url: impl Into<String>, policy: ReconnectPolicy) -> Arc<Self> {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (messages_tx, _) = broadcast::channel(SUBSCRIBER_BUFFER);
        Arc::new(Self {
            url: url.into(),
            policy,
            state,
            ws_tx: Mutex::new(None),
            messages_tx,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.messages_tx.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Starts the connection loop unless one is already connected or connecting.
    pub fn connect(self: &Arc<Self>) {
        if self.shutdown.is_cancelled() {
            tracing::warn!("Signalling channel was closed, refusing to reconnect");
            return;
        }
        if !self.begin_connecting() {
            tracing::debug!("Signalling channel is already connected or connecting");
            return;
        }
        tokio::spawn(Arc::clone(self).run());
    }

    /// Stops reconnecting and closes the live transport, if any.
    pub async fn close(&self) {
        self.shutdown.cancel();
        if let Some(mut ws_tx) = self.ws_tx.lock().await.take() {
            if let Err(err) = ws_tx.close().await {
                tracing::debug!("Error while closing signalling transport: {err}");
            }
        }
    }

    fn begin_connecting(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == ConnectionState::Disconnected {
                *state = ConnectionState::Connecting;
                true
            } else {
                false
            }
        })
    }

    async fn open(&self) -> Result<WsRx, SignallingErrors> {
        tracing::info!("Signalling server url is: {}\nConnecting...", self.url);
        match tokio_tungstenite::connect_async(self.url.as_str()).await {
            Ok((ws_stream, _)) => {
                tracing::info!("Connection successful!");
                let (tx, rx) = ws_stream.split();
                *self.ws_tx.lock().await = Some(tx);
                Ok(rx)
            }
            Err(err) => {
                tracing::error!("Could not open ws with signalling server {err}");
                Err(SignallingErrors::ConnectionFailed)
            }
        }
    }

    async fn run(self: Arc<Self>) {
        let mut attempt: u32 = 0;

        loop {
            match self.open().await {
                Ok(ws_rx) => {
                    attempt = 0;
                    self.state.send_replace(ConnectionState::Connected);
                    self.read_frames(ws_rx).await;
                    // Drop the dead sink before anyone can observe `Disconnected`.
                    self.ws_tx.lock().await.take();
                    tracing::info!("Signalling connection lost");
                }
                Err(err) => tracing::error!("Failed to connect to signalling server: {err}"),
            }
            self.state.send_replace(ConnectionState::Disconnected);

            if self.shutdown.is_cancelled() {
                return;
            }

            attempt += 1;
            let Some(delay) = self.policy.delay_for(attempt) else {
                tracing::warn!("Giving up on signalling server after {} attempts", attempt - 1);
                return;
            };
            tracing::info!("Reconnecting in {:?}", delay);

            tokio::select! {
                _ = sleep(delay) => {}
                _ = self.shutdown.cancelled() => return,
            }

            if !self.begin_connecting() {
                tracing::debug!("Another connection attempt took over");
                return;
            }
        }
    }

    async fn read_frames(&self, mut ws_rx: WsRx) {
        loop {
            let frame = tokio::select! {
                frame = ws_rx.next() => frame,
                _ = self.shutdown.cancelled() => return,
            };

            match frame {
                Some(Ok(tungstenite::Message::Text(text))) => {
                    self.publish(Message::decode(text.as_str()))
                }
                Some(Ok(tungstenite::Message::Binary(bytes))) => {
                    self.publish(Message::decode_bytes(&bytes))
                }
                Some(Ok(tungstenite::Message::Close(_))) => {
                    tracing::warn!("WebSocket connection closed by server");
                    return;
                }
                Some(Ok(_)) => {} // Ping/pong are answered by tungstenite
                Some(Err(err)) => {
                    tracing::error!("WebSocket error: {err}");
                    return;
                }
                None => return,
            }
        }
    }

    fn publish(&self, decoded: Result<Message, DecodeError>) {
        match decoded {
            Ok(message) => {
                tracing::info!("Received message of kind: {}", message.kind());
                if self.messages_tx.send(message).is_err() {
                    tracing::debug!("No subscribers for signalling messages");
                }
            }
            Err(DecodeError::UnknownKind(kind)) => {
                tracing::warn!("Discarding message of unknown kind: {kind}")
            }
            Err(err) => tracing::error!("Dropping signalling frame: {err}"),
        }
    }

    async fn try_send(&self, message: &Message) -> Result<(), SignallingErrors> {
        if self.connection_state() != ConnectionState::Connected {
            return Err(SignallingErrors::ConnectionIsNotOpened);
        }

        let text = message.encode()?;
        let mut ws_tx = self.ws_tx.lock().await;
        match ws_tx.as_mut() {
            Some(ws_tx) => {
                if let Err(err) = ws_tx
                    .send(tungstenite::Message::Text(Utf8Bytes::from(text)))
                    .await
                {
                    tracing::error!("Failed to send text message: {err}");
                    return Err(SignallingErrors::SendFailed);
                }
                Ok(())
            }
            None => Err(SignallingErrors::ConnectionIsNotOpened),
        }
    }
}

#[async_trait]
impl SignalSink for SignallingChannel {
    async fn send(&self, message: Message) {
        tracing::info!("Sending message of kind: {}", message.kind());
        if let Err(err) = self.try_send(&message).await {
            tracing::warn!("Dropping outbound {} message: {err}", message.kind());
        }
    }
}
