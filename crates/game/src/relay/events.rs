use std::net::SocketAddr;

#[derive(Debug, Clone)]
pub enum RelayEvent {
    PeerConnected {
        peer_id: u32,
        addr: SocketAddr,
    },
    PeerDisconnected {
        peer_id: u32,
        reason: DisconnectReason,
    },
    PeerRejected {
        addr: SocketAddr,
        reason: String,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    Closed,
    Error,
    Shutdown,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::Closed => "disconnected",
            DisconnectReason::Error => "dropped after an error",
            DisconnectReason::Shutdown => "closed by relay shutdown",
        }
    }
}
