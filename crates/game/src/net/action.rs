use std::collections::HashMap;
use std::sync::OnceLock;

use glam::Vec2;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::protocol::{ProtocolError, wire_tag};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum ActionType {
    Damage = 0,
    Deflect = 1,
    PowerUp = 2,
}

wire_tag!(ActionType, |v| ProtocolError::UnknownActionType(u64::from(v)), {
    Damage = 0,
    Deflect = 1,
    PowerUp = 2,
});

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Damage {
    pub amount: f32,
}

/// Bounce off a surface. `direction` is the surface normal, `coefficient`
/// scales the reflected velocity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Deflect {
    pub coefficient: f32,
    pub direction: Vec2,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerUp {
    pub amount: f32,
}

/// One-shot instruction applied to a single entity. Not idempotent: every
/// receipt is applied exactly once and nothing is ever resent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NetAction {
    Damage(Damage),
    Deflect(Deflect),
    PowerUp(PowerUp),
}

impl NetAction {
    pub fn damage(amount: f32) -> Self {
        Self::Damage(Damage { amount })
    }

    pub fn deflect(coefficient: f32, direction: Vec2) -> Self {
        Self::Deflect(Deflect {
            coefficient,
            direction,
        })
    }

    pub fn power_up(amount: f32) -> Self {
        Self::PowerUp(PowerUp { amount })
    }

    pub fn action_type(&self) -> ActionType {
        match self {
            Self::Damage(_) => ActionType::Damage,
            Self::Deflect(_) => ActionType::Deflect,
            Self::PowerUp(_) => ActionType::PowerUp,
        }
    }

    pub fn serialize(&self) -> Result<Value, ProtocolError> {
        let payload = match self {
            Self::Damage(action) => serde_json::to_value(action)?,
            Self::Deflect(action) => serde_json::to_value(action)?,
            Self::PowerUp(action) => serde_json::to_value(action)?,
        };
        Ok(payload)
    }

    /// Decodes a payload with the standard registry, logging and discarding
    /// anything it cannot make sense of.
    pub fn parse(payload: &Value, tag: u64) -> Option<Self> {
        ActionRegistry::standard().parse(payload, tag)
    }
}

pub type ActionDecoder = fn(&Value) -> Result<NetAction, ProtocolError>;

#[derive(Debug, Default)]
pub struct ActionRegistry {
    decoders: HashMap<ActionType, ActionDecoder>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_standard_actions() -> Self {
        let mut registry = Self::new();
        let standard: [(ActionType, ActionDecoder); 3] = [
            (ActionType::Damage, |p| {
                Ok(NetAction::Damage(Damage::deserialize(p)?))
            }),
            (ActionType::Deflect, |p| {
                Ok(NetAction::Deflect(Deflect::deserialize(p)?))
            }),
            (ActionType::PowerUp, |p| {
                Ok(NetAction::PowerUp(PowerUp::deserialize(p)?))
            }),
        ];
        for (tag, decoder) in standard {
            registry.decoders.insert(tag, decoder);
        }
        registry
    }

    pub fn standard() -> &'static ActionRegistry {
        static REGISTRY: OnceLock<ActionRegistry> = OnceLock::new();
        REGISTRY.get_or_init(Self::with_standard_actions)
    }

    pub fn register(&mut self, tag: ActionType, decoder: ActionDecoder) -> Result<(), ProtocolError> {
        if self.decoders.contains_key(&tag) {
            return Err(ProtocolError::DuplicateActionType(tag));
        }
        self.decoders.insert(tag, decoder);
        Ok(())
    }

    pub fn decode(&self, payload: &Value, tag: u64) -> Result<NetAction, ProtocolError> {
        let action_type = u8::try_from(tag)
            .map_err(|_| ProtocolError::UnknownActionType(tag))
            .and_then(ActionType::try_from)?;
        let decoder = self
            .decoders
            .get(&action_type)
            .ok_or(ProtocolError::UnknownActionType(tag))?;
        decoder(payload)
    }

    pub fn parse(&self, payload: &Value, tag: u64) -> Option<NetAction> {
        match self.decode(payload, tag) {
            Ok(action) => Some(action),
            Err(e) => {
                log::warn!("Dropping action: {}", e);
                None
            }
        }
    }
}
