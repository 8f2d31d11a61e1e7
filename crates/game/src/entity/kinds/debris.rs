use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::entity::reckoning::{advance_position, advance_rotation, normalize_rotation, round_to, round_vec};
use crate::entity::{NetIdentity, Replicated};
use crate::net::{EntityType, NetAction};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebrisState {
    pub position: Vec2,
    pub velocity: Vec2,
    #[serde(default)]
    pub rotation: f32,
    #[serde(default)]
    pub angular_velocity: f32,
    pub health: f32,
    pub radius: f32,
}

/// Tumbling wreckage that can be shot apart or knocked around.
#[derive(Debug, Clone)]
pub struct Debris {
    identity: NetIdentity,
    pub position: Vec2,
    pub velocity: Vec2,
    pub rotation: f32,
    pub angular_velocity: f32,
    pub health: f32,
    pub radius: f32,
}

impl Debris {
    pub fn spawn(position: Vec2, velocity: Vec2, angular_velocity: f32, radius: f32) -> Self {
        Self {
            identity: NetIdentity::authoritative(),
            position,
            velocity,
            rotation: 0.0,
            angular_velocity,
            health: radius * 2.0,
            radius,
        }
    }
}

impl Replicated for Debris {
    const ENTITY_TYPE: EntityType = EntityType::Debris;
    type State = DebrisState;

    fn from_state(identity: NetIdentity, state: &DebrisState, latency: f64) -> Self {
        let mut debris = Self::spawn(state.position, state.velocity, state.angular_velocity, state.radius);
        debris.identity = identity;
        debris.update_state(state, latency);
        debris
    }

    fn identity(&self) -> &NetIdentity {
        &self.identity
    }

    fn identity_mut(&mut self) -> &mut NetIdentity {
        &mut self.identity
    }

    fn serialize_state(&self) -> DebrisState {
        DebrisState {
            position: round_vec(self.position),
            velocity: round_vec(self.velocity),
            rotation: round_to(self.rotation),
            angular_velocity: round_to(self.angular_velocity),
            health: round_to(self.health),
            radius: round_to(self.radius),
        }
    }

    fn update_state(&mut self, state: &DebrisState, latency: f64) {
        self.position = advance_position(state.position, state.velocity, latency);
        self.velocity = state.velocity;
        self.rotation = advance_rotation(state.rotation, state.angular_velocity, latency);
        self.angular_velocity = state.angular_velocity;
        self.health = state.health;
        self.radius = state.radius;
    }

    fn receive_action(&mut self, action: &NetAction, _latency: f64) {
        match action {
            NetAction::Damage(damage) => {
                self.health = (self.health - damage.amount).max(0.0);
            }
            NetAction::Deflect(deflect) => {
                let normal = deflect.direction.normalize_or_zero();
                if normal == Vec2::ZERO {
                    return;
                }
                self.velocity = self.velocity.reflect(normal) * deflect.coefficient;
                self.angular_velocity = -self.angular_velocity;
            }
            NetAction::PowerUp(_) => return,
        }
        self.identity.mark_dirty();
    }

    fn advance(&mut self, dt: f32) {
        self.position += self.velocity * dt;
        self.rotation = normalize_rotation(self.rotation + self.angular_velocity * dt);
    }

    fn is_expired(&self) -> bool {
        self.health <= 0.0
    }
}
