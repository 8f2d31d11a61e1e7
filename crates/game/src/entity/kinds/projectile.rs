use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::entity::reckoning::{advance_position, round_to, round_vec};
use crate::entity::{NetIdentity, Replicated};
use crate::net::{EntityType, NetAction};

pub const DEFAULT_TTL_MS: f32 = 2000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectileState {
    pub position: Vec2,
    pub velocity: Vec2,
    pub ttl: f32,
    pub damage: f32,
}

/// Straight-flying shot. `ttl` counts down in milliseconds.
#[derive(Debug, Clone)]
pub struct Projectile {
    identity: NetIdentity,
    pub position: Vec2,
    pub velocity: Vec2,
    pub ttl: f32,
    pub damage: f32,
}

impl Projectile {
    pub fn fire(position: Vec2, velocity: Vec2, damage: f32) -> Self {
        Self {
            identity: NetIdentity::authoritative(),
            position,
            velocity,
            ttl: DEFAULT_TTL_MS,
            damage,
        }
    }

    pub fn is_spent(&self) -> bool {
        self.ttl <= 0.0
    }

    /// Ends the shot on impact; it is reaped on the next sweep.
    pub fn spend(&mut self) {
        self.ttl = 0.0;
    }
}

impl Replicated for Projectile {
    const ENTITY_TYPE: EntityType = EntityType::Projectile;
    type State = ProjectileState;

    fn from_state(identity: NetIdentity, state: &ProjectileState, latency: f64) -> Self {
        let mut projectile = Self::fire(state.position, state.velocity, state.damage);
        projectile.identity = identity;
        projectile.update_state(state, latency);
        projectile
    }

    fn identity(&self) -> &NetIdentity {
        &self.identity
    }

    fn identity_mut(&mut self) -> &mut NetIdentity {
        &mut self.identity
    }

    fn serialize_state(&self) -> ProjectileState {
        ProjectileState {
            position: round_vec(self.position),
            velocity: round_vec(self.velocity),
            ttl: round_to(self.ttl),
            damage: round_to(self.damage),
        }
    }

    fn update_state(&mut self, state: &ProjectileState, latency: f64) {
        self.position = advance_position(state.position, state.velocity, latency);
        self.velocity = state.velocity;
        self.ttl = state.ttl;
        self.damage = state.damage;
    }

    fn receive_action(&mut self, action: &NetAction, _latency: f64) {
        if let NetAction::Deflect(deflect) = action {
            let normal = deflect.direction.normalize_or_zero();
            if normal != Vec2::ZERO {
                self.velocity = self.velocity.reflect(normal) * deflect.coefficient;
                self.identity.mark_dirty();
            }
        }
    }

    fn advance(&mut self, dt: f32) {
        self.position += self.velocity * dt;
        self.ttl -= dt * 1000.0;
    }

    fn is_expired(&self) -> bool {
        self.is_spent()
    }
}
