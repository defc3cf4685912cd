use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use clap::Parser;
use futures_util::{sink::SinkExt, stream::StreamExt};
use peers::{Frame, PeerManager};
use std::net::SocketAddr;
use tokio::sync::mpsc;
use uuid::Uuid;

mod config;
mod peers;

const PEER_BUFFER: usize = 100;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = config::Args::parse();
    config::setup_logging(args.log_level)?;

    let app = router(PeerManager::new(args.max_peers));

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    tracing::info!("Starting relay on {}, at most {} peers", addr, args.max_peers);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

fn router(peers: PeerManager) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .with_state(peers)
        .layer(config::setup_cors())
}

async fn ws_handler(ws: WebSocketUpgrade, State(peers): State<PeerManager>) -> impl IntoResponse {
    let id = Uuid::new_v4();
    tracing::info!("New peer connecting: {}", id);
    ws.on_upgrade(move |socket| handle_socket(socket, peers, id))
}

async fn handle_socket(mut socket: WebSocket, peers: PeerManager, id: Uuid) {
    let (tx, mut rx) = mpsc::channel::<Frame>(PEER_BUFFER);

    if !peers.add_peer(id, tx).await {
        let close = Message::Close(Some(CloseFrame {
            code: close_code::POLICY,
            reason: "relay is full".into(),
        }));
        if let Err(err) = socket.send(close).await {
            tracing::warn!("Could not close rejected peer {id}: {err}");
        }
        return;
    }

    let (mut sender, mut receiver) = socket.split();

    // Frames relayed from the other peers to this WebSocket client
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let message = match frame {
                Frame::Text(text) => Message::Text(text),
                Frame::Binary(bytes) => Message::Binary(bytes),
            };
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let relay_peers = peers.clone();

    // Frames from this WebSocket client to everybody else
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            let frame = match message {
                Message::Text(text) => Frame::Text(text),
                Message::Binary(bytes) => Frame::Binary(bytes),
                Message::Close(_) => break,
                Message::Ping(_) | Message::Pong(_) => continue,
            };
            if relay_peers.relay(&id, frame).await == 0 {
                tracing::debug!("Nobody to relay a frame from {id} to");
            }
        }
    });

    // Wait for either task to complete and then abort the other one
    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    peers.remove_peer(&id).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio::time::{sleep, timeout, Duration};
    use tokio_tungstenite::{connect_async, tungstenite, MaybeTlsStream, WebSocketStream};
    use webrtc_model::{IceCandidate, Message as SignallingMessage};

    type Client = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

    async fn spawn_relay(max_peers: usize) -> (SocketAddr, PeerManager) {
        let peers = PeerManager::new(max_peers);
        let app = router(peers.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service()).await.unwrap();
        });
        (addr, peers)
    }

    async fn connect(addr: SocketAddr) -> Client {
        let (client, _) = connect_async(format!("ws://{addr}/"))
            .await
            .expect("Relay should accept the upgrade");
        client
    }

    async fn wait_for_peers(peers: &PeerManager, count: usize) {
        timeout(Duration::from_secs(1), async {
            while peers.len().await != count {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("Peers should register within timeout");
    }

    #[tokio::test]
    async fn test_frames_reach_the_other_peer_only() {
        let (addr, peers) = spawn_relay(2).await;
        let mut caller = connect(addr).await;
        let mut callee = connect(addr).await;
        wait_for_peers(&peers, 2).await;

        let candidate = SignallingMessage::IceCandidate(IceCandidate {
            candidate: "candidate:1 1 udp 2122260223 192.168.1.2 54321 typ host".to_owned(),
            sdp_mid: Some("0".to_owned()),
            sdp_m_line_index: Some(0),
            username_fragment: None,
        });
        let encoded = candidate.encode().unwrap();
        caller
            .send(tungstenite::Message::Text(encoded.clone().into()))
            .await
            .unwrap();

        let received = timeout(Duration::from_millis(500), callee.next())
            .await
            .expect("Should receive frame within timeout")
            .expect("Stream should stay open")
            .unwrap();
        let text = received.into_text().unwrap();
        assert_eq!(text.as_str(), encoded);
        assert_eq!(SignallingMessage::decode(text.as_str()).unwrap(), candidate);

        let echoed = timeout(Duration::from_millis(100), caller.next()).await;
        assert!(echoed.is_err(), "Sender should not get its own frame back");
    }

    #[tokio::test]
    async fn test_binary_frames_are_forwarded() {
        let (addr, peers) = spawn_relay(2).await;
        let mut caller = connect(addr).await;
        let mut callee = connect(addr).await;
        wait_for_peers(&peers, 2).await;

        let payload = SignallingMessage::Hangup.encode().unwrap().into_bytes();
        caller
            .send(tungstenite::Message::Binary(payload.clone().into()))
            .await
            .unwrap();

        let received = timeout(Duration::from_millis(500), callee.next())
            .await
            .expect("Should receive frame within timeout")
            .expect("Stream should stay open")
            .unwrap();
        assert_eq!(received.into_data().to_vec(), payload);
    }

    #[tokio::test]
    async fn test_connection_beyond_limit_is_closed() {
        let (addr, peers) = spawn_relay(2).await;
        let _caller = connect(addr).await;
        let _callee = connect(addr).await;
        wait_for_peers(&peers, 2).await;

        let mut third = connect(addr).await;
        let first = timeout(Duration::from_millis(500), third.next())
            .await
            .expect("Rejected peer should be closed within timeout");
        assert!(matches!(first, Some(Ok(tungstenite::Message::Close(_))) | None));
        assert_eq!(peers.len().await, 2);
    }

    #[tokio::test]
    async fn test_disconnect_frees_slot() {
        let (addr, peers) = spawn_relay(1).await;
        let mut first = connect(addr).await;
        wait_for_peers(&peers, 1).await;

        first.close(None).await.unwrap();
        wait_for_peers(&peers, 0).await;

        let _second = connect(addr).await;
        wait_for_peers(&peers, 1).await;
    }
}
