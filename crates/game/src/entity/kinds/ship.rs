use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::entity::reckoning::{
    advance_rotation, advance_with_thrust, normalize_rotation, round_to, round_vec,
};
use crate::entity::{NetIdentity, Replicated};
use crate::net::{EntityType, NetAction};

pub const THRUST_ACCELERATION: f32 = 120.0;
pub const MAX_SPEED: f32 = 300.0;
pub const MAX_HEALTH: f32 = 100.0;
pub const MAX_CHARGE: f32 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipState {
    pub position: Vec2,
    pub velocity: Vec2,
    #[serde(default)]
    pub rotation: f32,
    #[serde(default)]
    pub angular_velocity: f32,
    #[serde(default)]
    pub thrusting: bool,
    pub health: f32,
    #[serde(default)]
    pub charge: f32,
}

/// A player-controlled ship. Replicas extrapolate with the sender's thrust
/// so a ship that was accelerating keeps accelerating across the gap.
#[derive(Debug, Clone)]
pub struct Ship {
    identity: NetIdentity,
    pub position: Vec2,
    pub velocity: Vec2,
    pub rotation: f32,
    pub angular_velocity: f32,
    pub thrusting: bool,
    pub health: f32,
    pub charge: f32,
}

impl Ship {
    pub fn spawn(position: Vec2, rotation: f32) -> Self {
        Self {
            identity: NetIdentity::authoritative(),
            position,
            velocity: Vec2::ZERO,
            rotation: normalize_rotation(rotation),
            angular_velocity: 0.0,
            thrusting: false,
            health: MAX_HEALTH,
            charge: 0.0,
        }
    }

    pub fn heading(&self) -> Vec2 {
        Vec2::from_angle(self.rotation)
    }

    pub fn set_thrust(&mut self, thrusting: bool) {
        if self.thrusting != thrusting {
            self.thrusting = thrusting;
            self.identity.mark_dirty();
        }
    }

    /// Sets the turn rate in radians per second.
    pub fn steer(&mut self, angular_velocity: f32) {
        if self.angular_velocity != angular_velocity {
            self.angular_velocity = angular_velocity;
            self.identity.mark_dirty();
        }
    }

    fn acceleration(thrusting: bool, rotation: f32) -> Vec2 {
        if thrusting {
            Vec2::from_angle(rotation) * THRUST_ACCELERATION
        } else {
            Vec2::ZERO
        }
    }
}

impl Replicated for Ship {
    const ENTITY_TYPE: EntityType = EntityType::Ship;
    type State = ShipState;

    fn from_state(identity: NetIdentity, state: &ShipState, latency: f64) -> Self {
        let mut ship = Self::spawn(state.position, state.rotation);
        ship.identity = identity;
        ship.update_state(state, latency);
        ship
    }

    fn identity(&self) -> &NetIdentity {
        &self.identity
    }

    fn identity_mut(&mut self) -> &mut NetIdentity {
        &mut self.identity
    }

    fn serialize_state(&self) -> ShipState {
        ShipState {
            position: round_vec(self.position),
            velocity: round_vec(self.velocity),
            rotation: round_to(self.rotation),
            angular_velocity: round_to(self.angular_velocity),
            thrusting: self.thrusting,
            health: round_to(self.health),
            charge: round_to(self.charge),
        }
    }

    fn update_state(&mut self, state: &ShipState, latency: f64) {
        let (position, velocity) = advance_with_thrust(
            state.position,
            state.velocity,
            Self::acceleration(state.thrusting, state.rotation),
            MAX_SPEED,
            latency,
        );
        self.position = position;
        self.velocity = velocity;
        self.rotation = advance_rotation(state.rotation, state.angular_velocity, latency);
        self.angular_velocity = state.angular_velocity;
        self.thrusting = state.thrusting;
        self.health = state.health;
        self.charge = state.charge;
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
            }
            NetAction::PowerUp(power) => {
                self.charge = (self.charge + power.amount).clamp(0.0, MAX_CHARGE);
            }
        }
        self.identity.mark_dirty();
    }

    fn advance(&mut self, dt: f32) {
        let (position, velocity) = advance_with_thrust(
            self.position,
            self.velocity,
            Self::acceleration(self.thrusting, self.rotation),
            MAX_SPEED,
            f64::from(dt) * 1000.0,
        );
        self.position = position;
        self.velocity = velocity;
        self.rotation = normalize_rotation(self.rotation + self.angular_velocity * dt);
    }

    fn is_expired(&self) -> bool {
        self.health <= 0.0
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn state(position: Vec2, velocity: Vec2) -> ShipState {
        ShipState {
            position,
            velocity,
            rotation: 0.0,
            angular_velocity: 0.0,
            thrusting: false,
            health: MAX_HEALTH,
            charge: 0.0,
        }
    }

    fn replica(state: &ShipState, latency: f64) -> Ship {
        Ship::from_state(NetIdentity::new(Uuid::new_v4(), true), state, latency)
    }

    #[test]
    fn test_late_snapshot_is_extrapolated() {
        let snapshot = state(Vec2::ZERO, Vec2::new(10.0, 0.0));
        let mut ship = replica(&snapshot, 500.0);
        assert!((ship.position - Vec2::new(5.0, 0.0)).length() < 1e-4);

        for _ in 0..3 {
            ship.update_state(&snapshot, 500.0);
            assert!((ship.position - Vec2::new(5.0, 0.0)).length() < 1e-4);
            assert_eq!(ship.velocity, Vec2::new(10.0, 0.0));
        }
    }

    #[test]
    fn test_thrusting_snapshot_blends_velocity() {
        let mut snapshot = state(Vec2::ZERO, Vec2::ZERO);
        snapshot.thrusting = true;

        let ship = replica(&snapshot, 1000.0);
        assert!((ship.velocity - Vec2::new(THRUST_ACCELERATION, 0.0)).length() < 1e-3);
        assert!((ship.position - Vec2::new(THRUST_ACCELERATION / 2.0, 0.0)).length() < 1e-3);
    }

    #[test]
    fn test_non_spatial_fields_are_verbatim() {
        let mut snapshot = state(Vec2::ZERO, Vec2::ZERO);
        snapshot.health = 42.0;
        snapshot.charge = 17.0;

        let ship = replica(&snapshot, 800.0);
        assert_eq!(ship.health, 42.0);
        assert_eq!(ship.charge, 17.0);
    }

    #[test]
    fn test_controls_mark_dirty_only_on_change() {
        let mut ship = Ship::spawn(Vec2::ZERO, 0.0);
        ship.set_thrust(false);
        ship.steer(0.0);
        assert!(!ship.identity().is_dirty());

        ship.set_thrust(true);
        assert!(ship.identity_mut().consume_dirty());
        ship.steer(1.5);
        assert!(ship.identity_mut().consume_dirty());
        ship.steer(1.5);
        assert!(!ship.identity().is_dirty());
    }

    #[test]
    fn test_damage_clamps_and_expires() {
        let mut ship = Ship::spawn(Vec2::ZERO, 0.0);
        ship.receive_action(&NetAction::damage(30.0), 0.0);
        assert_eq!(ship.health, 70.0);
        assert!(ship.identity().is_dirty());

        ship.receive_action(&NetAction::damage(500.0), 0.0);
        assert_eq!(ship.health, 0.0);
        assert!(ship.is_expired());
    }

    #[test]
    fn test_deflect_reflects_velocity() {
        let mut ship = Ship::spawn(Vec2::ZERO, 0.0);
        ship.velocity = Vec2::new(10.0, -20.0);
        ship.receive_action(&NetAction::deflect(0.5, Vec2::new(0.0, 3.0)), 0.0);
        assert!((ship.velocity - Vec2::new(5.0, 10.0)).length() < 1e-4);

        ship.receive_action(&NetAction::deflect(0.5, Vec2::ZERO), 0.0);
        assert!((ship.velocity - Vec2::new(5.0, 10.0)).length() < 1e-4);
    }

    #[test]
    fn test_power_up_caps_charge() {
        let mut ship = Ship::spawn(Vec2::ZERO, 0.0);
        ship.receive_action(&NetAction::power_up(60.0), 0.0);
        ship.receive_action(&NetAction::power_up(60.0), 0.0);
        assert_eq!(ship.charge, MAX_CHARGE);
    }

    #[test]
    fn test_advance_integrates_motion() {
        let mut ship = Ship::spawn(Vec2::ZERO, 0.0);
        ship.velocity = Vec2::new(0.0, 30.0);
        ship.angular_velocity = 1.0;
        ship.advance(0.5);
        assert!((ship.position - Vec2::new(0.0, 15.0)).length() < 1e-4);
        assert!((ship.rotation - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_serialized_state_is_rounded() {
        let mut ship = Ship::spawn(Vec2::new(1.23456, -7.891), 0.0);
        ship.charge = 3.14159;

        let state = ship.serialize_state();
        assert_eq!(state.position, Vec2::new(1.23, -7.89));
        assert_eq!(state.charge, 3.14);
    }
}
