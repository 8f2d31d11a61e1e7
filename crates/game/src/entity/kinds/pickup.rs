use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::entity::reckoning::{round_to, round_vec};
use crate::entity::{NetIdentity, Replicated};
use crate::net::EntityType;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PickupState {
    pub position: Vec2,
    pub power: f32,
}

/// Stationary charge pickup. Has nothing to extrapolate.
#[derive(Debug, Clone)]
pub struct Pickup {
    identity: NetIdentity,
    pub position: Vec2,
    pub power: f32,
    pub collected: bool,
}

impl Pickup {
    pub fn spawn(position: Vec2, power: f32) -> Self {
        Self {
            identity: NetIdentity::authoritative(),
            position,
            power,
            collected: false,
        }
    }

    /// Marks the pickup as taken; it is reaped on the next sweep.
    pub fn collect(&mut self) -> f32 {
        self.collected = true;
        self.power
    }
}

impl Replicated for Pickup {
    const ENTITY_TYPE: EntityType = EntityType::Pickup;
    type State = PickupState;

    fn from_state(identity: NetIdentity, state: &PickupState, latency: f64) -> Self {
        let mut pickup = Self::spawn(state.position, state.power);
        pickup.identity = identity;
        pickup.update_state(state, latency);
        pickup
    }

    fn identity(&self) -> &NetIdentity {
        &self.identity
    }

    fn identity_mut(&mut self) -> &mut NetIdentity {
        &mut self.identity
    }

    fn serialize_state(&self) -> PickupState {
        PickupState {
            position: round_vec(self.position),
            power: round_to(self.power),
        }
    }

    fn update_state(&mut self, state: &PickupState, _latency: f64) {
        self.position = state.position;
        self.power = state.power;
    }

    fn is_expired(&self) -> bool {
        self.collected
    }
}
