pub mod entity;
pub mod net;
pub mod relay;
pub mod simulation;

pub use entity::{
    Debris, EntityFactory, NetActor, NetIdentity, NetSystem, Pickup, Projectile, Replicated, Ship,
    SyncReport,
};
pub use net::{
    ClockSync, DEFAULT_PORT, DEFAULT_TICK_RATE, EntityType, EventBody, EventType, LatencySimulation,
    NetAction, NetEvent, NetworkStats, ProtocolError, Receiver, ReplicationSession, SessionConfig,
    SessionError, Slice,
};
pub use relay::{DisconnectReason, RelayConfig, RelayEvent, RelayServer};
pub use simulation::{FixedTimestep, TickLoop};
