use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;

/// Instruction for a peer's writer task.
#[derive(Debug, Clone)]
pub enum PeerMessage {
    /// A newline-terminated frame, shared between every recipient.
    Frame(Arc<str>),
    Close,
}

impl PeerMessage {
    pub fn frame(text: &str) -> Self {
        let mut line = String::with_capacity(text.len() + 1);
        line.push_str(text);
        line.push('\n');
        Self::Frame(line.into())
    }
}

#[derive(Debug)]
struct PeerHandle {
    addr: SocketAddr,
    sender: mpsc::UnboundedSender<PeerMessage>,
    frames_forwarded: u64,
}

/// Connected peers and the channels feeding their sockets.
#[derive(Debug)]
pub struct PeerRegistry {
    peers: HashMap<u32, PeerHandle>,
    next_peer_id: u32,
    max_peers: usize,
    closing: bool,
}

impl PeerRegistry {
    pub fn new(max_peers: usize) -> Self {
        Self {
            peers: HashMap::new(),
            next_peer_id: 1,
            max_peers,
            closing: false,
        }
    }

    pub fn register(
        &mut self,
        addr: SocketAddr,
        sender: mpsc::UnboundedSender<PeerMessage>,
    ) -> Result<u32, &'static str> {
        if self.closing {
            return Err("Relay shutting down");
        }
        if self.peers.len() >= self.max_peers {
            return Err("Relay full");
        }

        let peer_id = self.next_peer_id;
        self.next_peer_id += 1;
        self.peers.insert(
            peer_id,
            PeerHandle {
                addr,
                sender,
                frames_forwarded: 0,
            },
        );
        Ok(peer_id)
    }

    pub fn remove(&mut self, peer_id: u32) -> Option<SocketAddr> {
        self.peers.remove(&peer_id).map(|peer| peer.addr)
    }

    pub fn addr(&self, peer_id: u32) -> Option<SocketAddr> {
        self.peers.get(&peer_id).map(|peer| peer.addr)
    }

    pub fn count(&self) -> usize {
        self.peers.len()
    }

    pub fn is_closing(&self) -> bool {
        self.closing
    }

    pub fn frames_forwarded(&self, peer_id: u32) -> u64 {
        self.peers.get(&peer_id).map_or(0, |peer| peer.frames_forwarded)
    }

    pub fn send_to(&self, peer_id: u32, message: PeerMessage) -> bool {
        self.peers
            .get(&peer_id)
            .is_some_and(|peer| peer.sender.send(message).is_ok())
    }

    /// Queues `text` for every peer except the sender. Returns how many
    /// peers accepted it.
    pub fn broadcast_except(&mut self, sender_id: u32, text: &str) -> usize {
        let PeerMessage::Frame(frame) = PeerMessage::frame(text) else {
            return 0;
        };

        let mut delivered = 0;
        for (&peer_id, peer) in self.peers.iter_mut() {
            if peer_id == sender_id {
                continue;
            }
            if peer.sender.send(PeerMessage::Frame(Arc::clone(&frame))).is_ok() {
                peer.frames_forwarded += 1;
                delivered += 1;
            }
        }
        delivered
    }

    /// Tells every writer to close its socket and refuses new peers from
    /// here on.
    pub fn close_all(&mut self) -> usize {
        self.closing = true;
        self.peers
            .values()
            .filter(|peer| peer.sender.send(PeerMessage::Close).is_ok())
            .count()
    }
}
