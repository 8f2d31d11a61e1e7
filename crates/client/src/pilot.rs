use glam::Vec2;

use driftnet::entity::{Debris, Ship};
use driftnet::NetAction;

pub const ARENA_RADIUS: f32 = 600.0;
const TURN_RATE: f32 = 1.2;
const CRUISE_SPEED: f32 = 180.0;

/// Scripted flying for a headless peer: alternate turns, burn up to
/// cruise speed, bounce off the arena edge.
#[derive(Debug, Clone)]
pub struct Pilot {
    turn_period: u64,
}

impl Pilot {
    pub fn new(tick_rate: u32) -> Self {
        Self {
            turn_period: u64::from(tick_rate.max(1)) * 3,
        }
    }

    /// Updates the ship's controls for this tick. Returns a bounce to send
    /// through the network when the ship has left the arena.
    pub fn fly(&self, tick: u64, ship: &mut Ship) -> Option<NetAction> {
        let phase = tick % self.turn_period;
        let turn = if phase < self.turn_period / 2 { TURN_RATE } else { -TURN_RATE };
        ship.steer(turn);
        ship.set_thrust(ship.velocity.length() < CRUISE_SPEED);

        outside_arena(ship.position, ship.velocity)
    }
}

/// A Deflect that turns an escaping body back toward the centre, or `None`
/// while it is inside or already heading home.
pub fn outside_arena(position: Vec2, velocity: Vec2) -> Option<NetAction> {
    if position.length() <= ARENA_RADIUS || velocity.dot(position) <= 0.0 {
        return None;
    }
    Some(NetAction::deflect(0.9, -position.normalize_or_zero()))
}

pub fn scatter_debris(count: usize) -> Vec<Debris> {
    (0..count)
        .map(|i| {
            let angle = i as f32 / count.max(1) as f32 * std::f32::consts::TAU;
            let direction = Vec2::from_angle(angle);
            Debris::spawn(direction * ARENA_RADIUS * 0.5, direction.perp() * 40.0, 0.6, 12.0)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pilot_alternates_turns() {
        let pilot = Pilot::new(10);
        let mut ship = Ship::spawn(Vec2::ZERO, 0.0);

        pilot.fly(0, &mut ship);
        assert_eq!(ship.angular_velocity, TURN_RATE);
        assert!(ship.thrusting);

        pilot.fly(20, &mut ship);
        assert_eq!(ship.angular_velocity, -TURN_RATE);
    }

    #[test]
    fn test_bounce_only_when_escaping() {
        assert!(outside_arena(Vec2::new(10.0, 0.0), Vec2::X).is_none());
        assert!(outside_arena(Vec2::new(ARENA_RADIUS + 1.0, 0.0), -Vec2::X).is_none());

        match outside_arena(Vec2::new(ARENA_RADIUS + 1.0, 0.0), Vec2::X) {
            Some(NetAction::Deflect(deflect)) => assert_eq!(deflect.direction, -Vec2::X),
            other => panic!("Expected deflect, got {:?}", other),
        }
    }

    #[test]
    fn test_debris_is_spread_around_centre() {
        let debris = scatter_debris(4);
        assert_eq!(debris.len(), 4);
        for piece in &debris {
            assert!((piece.position.length() - ARENA_RADIUS * 0.5).abs() < 1e-3);
        }
    }
}
