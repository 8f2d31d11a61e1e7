mod action;
mod clock;
mod event;
mod frame;
mod protocol;
mod session;
mod stats;

pub use action::{ActionDecoder, ActionRegistry, ActionType, Damage, Deflect, NetAction, PowerUp};
pub use clock::{ClockState, ClockSync, LocalClock, answer_ping};
pub use event::{
    EntityAction, EntityRef, EntityWithState, EventBody, EventDecoder, EventRegistry, NetEvent,
    Ping, Pong,
};
pub use frame::{Frame, FrameReader};
pub use protocol::{
    DEFAULT_PORT, DEFAULT_TICK_RATE, EntityType, EventType, MAX_FRAME_SIZE, PING_INTERVAL_MS,
    ProtocolError, RECONNECT_BACKOFF_MS, Receiver, STATE_PRECISION,
};
pub(crate) use session::lock;
pub use session::{Outbox, Received, ReplicationSession, SessionConfig, SessionError, Slice};
pub use stats::{LatencySimulation, NetworkStats};
