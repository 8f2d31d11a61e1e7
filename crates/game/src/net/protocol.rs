use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 27015;
pub const DEFAULT_TICK_RATE: u32 = 60;
pub const PING_INTERVAL_MS: u64 = 500;
pub const RECONNECT_BACKOFF_MS: u64 = 1000;
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Decimal places kept for numeric state fields.
pub const STATE_PRECISION: i32 = 2;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("frame has no numeric type tag")]
    MissingTag,
    #[error("unknown event type {0}")]
    UnknownEventType(u64),
    #[error("event type {0:?} registered twice")]
    DuplicateEventType(EventType),
    #[error("unknown action type {0}")]
    UnknownActionType(u64),
    #[error("action type {0:?} registered twice")]
    DuplicateActionType(crate::net::ActionType),
    #[error("unknown entity type {0}")]
    UnknownEntityType(u8),
    #[error("unknown receiver {0}")]
    UnknownReceiver(u8),
    #[error("entities list has no valid entries")]
    EmptyBatch,
}

macro_rules! wire_tag {
    ($name:ident, $error:expr, { $($variant:ident = $value:literal),+ $(,)? }) => {
        impl TryFrom<u8> for $name {
            type Error = $crate::net::ProtocolError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $($value => Ok(Self::$variant),)+
                    other => Err($error(other)),
                }
            }
        }

        impl From<$name> for u8 {
            fn from(value: $name) -> u8 {
                value as u8
            }
        }
    };
}

pub(crate) use wire_tag;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum EventType {
    Ping = 0,
    Pong = 1,
    EntitiesList = 2,
    EntityCreate = 3,
    EntityUpdate = 4,
    EntityKill = 5,
    EntityAction = 6,
}

wire_tag!(EventType, |v| ProtocolError::UnknownEventType(u64::from(v)), {
    Ping = 0,
    Pong = 1,
    EntitiesList = 2,
    EntityCreate = 3,
    EntityUpdate = 4,
    EntityKill = 5,
    EntityAction = 6,
});

impl EventType {
    pub fn from_tag(tag: u64) -> Result<Self, ProtocolError> {
        u8::try_from(tag)
            .map_err(|_| ProtocolError::UnknownEventType(tag))
            .and_then(Self::try_from)
    }
}

/// Broadcast target of an event. The relay never echoes a frame back to its
/// sender, whichever value is carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum Receiver {
    AllClients = 0,
    AllExceptSender = 1,
}

wire_tag!(Receiver, ProtocolError::UnknownReceiver, {
    AllClients = 0,
    AllExceptSender = 1,
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum EntityType {
    Ship = 0,
    Projectile = 1,
    Debris = 2,
    Pickup = 3,
}

wire_tag!(EntityType, ProtocolError::UnknownEntityType, {
    Ship = 0,
    Projectile = 1,
    Debris = 2,
    Pickup = 3,
});
