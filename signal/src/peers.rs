use std::{collections::HashMap, sync::Arc};
use tokio::sync::mpsc;
use tokio::sync::RwLock;
use uuid::Uuid;

pub const DEFAULT_MAX_PEERS: usize = 2;

/// A WebSocket data frame, forwarded without looking inside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

type PeersMap = Arc<RwLock<HashMap<Uuid, mpsc::Sender<Frame>>>>;

#[derive(Clone)]
pub struct PeerManager {
    peers: PeersMap,
    max_peers: usize,
}

impl Default for PeerManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PEERS)
    }
}

impl PeerManager {
    pub fn new(max_peers: usize) -> Self {
        Self {
            peers: Arc::new(RwLock::new(HashMap::new())),
            max_peers,
        }
    }

    /// Returns `false` (and keeps nothing) when the relay is already full.
    pub async fn add_peer(&self, id: Uuid, tx: mpsc::Sender<Frame>) -> bool {
        let mut peers = self.peers.write().await;
        if peers.len() >= self.max_peers {
            tracing::warn!("Peer {id} rejected, {} peers already connected", peers.len());
            return false;
        }
        peers.insert(id, tx);
        tracing::info!("Peer {id} connected ({}/{})", peers.len(), self.max_peers);
        true
    }

    pub async fn remove_peer(&self, id: &Uuid) {
        if self.peers.write().await.remove(id).is_some() {
            tracing::info!("Peer {id} disconnected");
        }
    }

    pub async fn len(&self) -> usize {
        self.peers.read().await.len()
    }

    /// Forwards `frame` to every peer except `from`. Returns how many peers got it.
    pub async fn relay(&self, from: &Uuid, frame: Frame) -> usize {
        let peer_map = self.peers.read().await;

        let delivered = futures::future::join_all(
            peer_map
                .iter()
                .filter(|(uuid, _)| *uuid != from)
                .map(|(uuid, peer_sender)| {
                    let frame = frame.clone();
                    async move {
                        match peer_sender.send(frame).await {
                            Ok(()) => true,
                            Err(_) => {
                                tracing::error!("Could not relay frame from {from} to {uuid}");
                                false
                            }
                        }
                    }
                }),
        )
        .await;

        delivered.into_iter().filter(|sent| *sent).count()
    }
}
