mod config;
mod events;
mod peers;
mod server;

pub use config::RelayConfig;
pub use events::{DisconnectReason, RelayEvent};
pub use peers::{PeerMessage, PeerRegistry};
pub use server::RelayServer;
