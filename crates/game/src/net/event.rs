use std::collections::HashMap;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::action::NetAction;
use super::protocol::{EntityType, EventType, ProtocolError, Receiver};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ping {
    pub ping_time: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pong {
    pub ping_time: f64,
    pub server_time: f64,
}

/// Create and Update payload. `is_replica` is the sender's own flag; the
/// receiving copy takes the inverse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityWithState {
    pub uuid: Uuid,
    pub entity_type: EntityType,
    pub state: Value,
    pub is_replica: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRef {
    pub uuid: Uuid,
    pub entity_type: EntityType,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityAction {
    pub uuid: Uuid,
    pub entity_type: EntityType,
    pub action: NetAction,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventBody {
    Ping(Ping),
    Pong(Pong),
    EntitiesList(Vec<NetEvent>),
    Create(EntityWithState),
    Update(EntityWithState),
    Kill(EntityRef),
    Action(EntityAction),
}

impl EventBody {
    pub fn event_type(&self) -> EventType {
        match self {
            Self::Ping(_) => EventType::Ping,
            Self::Pong(_) => EventType::Pong,
            Self::EntitiesList(_) => EventType::EntitiesList,
            Self::Create(_) => EventType::EntityCreate,
            Self::Update(_) => EventType::EntityUpdate,
            Self::Kill(_) => EventType::EntityKill,
            Self::Action(_) => EventType::EntityAction,
        }
    }

    fn encode_fields(&self, frame: &mut Map<String, Value>) -> Result<(), ProtocolError> {
        let fields = match self {
            Self::Ping(ping) => serde_json::to_value(ping)?,
            Self::Pong(pong) => serde_json::to_value(pong)?,
            Self::Create(entity) | Self::Update(entity) => serde_json::to_value(entity)?,
            Self::Kill(entity) => serde_json::to_value(entity)?,
            Self::Action(entity) => serde_json::to_value(ActionFields {
                uuid: entity.uuid,
                entity_type: entity.entity_type,
                action_type: u64::from(u8::from(entity.action.action_type())),
                action: entity.action.serialize()?,
            })?,
            Self::EntitiesList(events) => {
                let encoded = events
                    .iter()
                    .map(NetEvent::serialize)
                    .collect::<Result<Vec<_>, _>>()?;
                serde_json::to_value(BatchFields {
                    entities: serde_json::to_string(&encoded)?,
                })?
            }
        };

        if let Value::Object(fields) = fields {
            frame.extend(fields);
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActionFields {
    uuid: Uuid,
    entity_type: EntityType,
    action_type: u64,
    #[serde(default)]
    action: Value,
}

#[derive(Serialize, Deserialize)]
struct BatchFields {
    entities: String,
}

#[derive(Deserialize)]
struct Envelope {
    receiver: Receiver,
    #[serde(default)]
    time: f64,
    #[serde(default)]
    latency: f64,
}

/// A single wire message. `time` is the sender's synced clock when the event
/// was sent; `latency` is filled in by the receiver.
#[derive(Debug, Clone, PartialEq)]
pub struct NetEvent {
    pub receiver: Receiver,
    pub time: f64,
    pub latency: f64,
    pub body: EventBody,
}

impl NetEvent {
    pub fn new(receiver: Receiver, body: EventBody) -> Self {
        Self {
            receiver,
            time: 0.0,
            latency: 0.0,
            body,
        }
    }

    pub fn broadcast(body: EventBody) -> Self {
        Self::new(Receiver::AllExceptSender, body)
    }

    pub fn event_type(&self) -> EventType {
        self.body.event_type()
    }

    /// Sets `time` on this event and, for batches, on every nested event.
    pub fn stamp(&mut self, time: f64) {
        self.time = time;
        if let EventBody::EntitiesList(events) = &mut self.body {
            for event in events {
                event.stamp(time);
            }
        }
    }

    /// Fills in `latency` from the receiver's synced clock, recursing into
    /// batches. Negative values are kept as-is.
    pub fn measure_latency(&mut self, synced_now: f64) {
        self.latency = synced_now - self.time;
        if let EventBody::EntitiesList(events) = &mut self.body {
            for event in events {
                event.measure_latency(synced_now);
            }
        }
    }

    pub fn serialize(&self) -> Result<String, ProtocolError> {
        let mut frame = Map::new();
        frame.insert("receiver".into(), Value::from(u8::from(self.receiver)));
        frame.insert("type".into(), Value::from(u8::from(self.event_type())));
        frame.insert("time".into(), Value::from(self.time));
        frame.insert("latency".into(), Value::from(self.latency));
        self.body.encode_fields(&mut frame)?;
        Ok(serde_json::to_string(&Value::Object(frame))?)
    }

    pub fn parse(text: &str) -> Option<Self> {
        EventRegistry::standard().parse(text)
    }
}

pub type EventDecoder = fn(&Value, &EventRegistry) -> Result<EventBody, ProtocolError>;

/// Tag to decoder table. Each event type is registered once; a frame whose
/// tag has no decoder produces no event.
#[derive(Debug, Default)]
pub struct EventRegistry {
    decoders: HashMap<EventType, EventDecoder>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_standard_events() -> Self {
        let mut registry = Self::new();
        let standard: [(EventType, EventDecoder); 7] = [
            (EventType::Ping, |frame, _| {
                Ok(EventBody::Ping(Ping::deserialize(frame)?))
            }),
            (EventType::Pong, |frame, _| {
                Ok(EventBody::Pong(Pong::deserialize(frame)?))
            }),
            (EventType::EntitiesList, decode_entities_list),
            (EventType::EntityCreate, |frame, _| {
                Ok(EventBody::Create(EntityWithState::deserialize(frame)?))
            }),
            (EventType::EntityUpdate, |frame, _| {
                Ok(EventBody::Update(EntityWithState::deserialize(frame)?))
            }),
            (EventType::EntityKill, |frame, _| {
                Ok(EventBody::Kill(EntityRef::deserialize(frame)?))
            }),
            (EventType::EntityAction, decode_entity_action),
        ];
        for (tag, decoder) in standard {
            registry.decoders.insert(tag, decoder);
        }
        registry
    }

    pub fn standard() -> &'static EventRegistry {
        static REGISTRY: OnceLock<EventRegistry> = OnceLock::new();
        REGISTRY.get_or_init(Self::with_standard_events)
    }

    pub fn register(&mut self, tag: EventType, decoder: EventDecoder) -> Result<(), ProtocolError> {
        if self.decoders.contains_key(&tag) {
            return Err(ProtocolError::DuplicateEventType(tag));
        }
        self.decoders.insert(tag, decoder);
        Ok(())
    }

    pub fn is_registered(&self, tag: EventType) -> bool {
        self.decoders.contains_key(&tag)
    }

    pub fn decode(&self, text: &str) -> Result<NetEvent, ProtocolError> {
        let frame: Value = serde_json::from_str(text)?;
        self.decode_value(&frame)
    }

    pub fn decode_value(&self, frame: &Value) -> Result<NetEvent, ProtocolError> {
        let tag = frame
            .get("type")
            .and_then(Value::as_u64)
            .ok_or(ProtocolError::MissingTag)?;
        let event_type = EventType::from_tag(tag)?;
        let decoder = self
            .decoders
            .get(&event_type)
            .ok_or(ProtocolError::UnknownEventType(tag))?;

        let envelope = Envelope::deserialize(frame)?;
        let body = decoder(frame, self)?;

        Ok(NetEvent {
            receiver: envelope.receiver,
            time: envelope.time,
            latency: envelope.latency,
            body,
        })
    }

    /// Unknown tags are logged, malformed frames dropped quietly. Neither is
    /// an error for the caller.
    pub fn parse(&self, text: &str) -> Option<NetEvent> {
        match self.decode(text) {
            Ok(event) => Some(event),
            Err(e @ (ProtocolError::UnknownEventType(_) | ProtocolError::UnknownActionType(_))) => {
                log::warn!("Dropping frame: {}", e);
                None
            }
            Err(e) => {
                log::debug!("Dropping frame: {}", e);
                None
            }
        }
    }
}

fn decode_entities_list(frame: &Value, registry: &EventRegistry) -> Result<EventBody, ProtocolError> {
    let batch = BatchFields::deserialize(frame)?;
    let encoded: Vec<String> = serde_json::from_str(&batch.entities)?;
    let events: Vec<NetEvent> = encoded
        .iter()
        .filter_map(|entry| registry.parse(entry))
        .collect();

    if events.is_empty() {
        return Err(ProtocolError::EmptyBatch);
    }
    Ok(EventBody::EntitiesList(events))
}

fn decode_entity_action(frame: &Value, _: &EventRegistry) -> Result<EventBody, ProtocolError> {
    let fields = ActionFields::deserialize(frame)?;
    let action = super::action::ActionRegistry::standard().decode(&fields.action, fields.action_type)?;
    Ok(EventBody::Action(EntityAction {
        uuid: fields.uuid,
        entity_type: fields.entity_type,
        action,
    }))
}
