use glam::Vec2;
use uuid::Uuid;

use driftnet::entity::{Debris, Pickup, Projectile, Ship};
use driftnet::{NetAction, NetSystem};

const SHIP_RADIUS: f32 = 14.0;
const MUZZLE_SPEED: f32 = 420.0;
const PROJECTILE_DAMAGE: f32 = 10.0;

pub fn fire(ship: &Ship) -> Projectile {
    let heading = ship.heading();
    Projectile::fire(
        ship.position + heading * SHIP_RADIUS,
        ship.velocity + heading * MUZZLE_SPEED,
        PROJECTILE_DAMAGE,
    )
}

/// A projectile of ours touching something we do not own.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub projectile: Uuid,
    pub target: Uuid,
    pub damage: f32,
}

pub fn find_hits(system: &NetSystem) -> Vec<Hit> {
    let mut targets: Vec<(Uuid, Vec2, f32)> = Vec::new();
    let mut shots: Vec<(Uuid, Vec2, f32)> = Vec::new();

    for actor in system.iter() {
        let identity = actor.net_identity();
        if let Some(projectile) = actor.downcast_ref::<Projectile>() {
            if identity.is_authoritative() && !projectile.is_spent() {
                shots.push((identity.uuid(), projectile.position, projectile.damage));
            }
        } else if identity.is_replica() {
            if let Some(ship) = actor.downcast_ref::<Ship>() {
                targets.push((identity.uuid(), ship.position, SHIP_RADIUS));
            } else if let Some(debris) = actor.downcast_ref::<Debris>() {
                targets.push((identity.uuid(), debris.position, debris.radius));
            }
        }
    }

    let mut hits = Vec::new();
    for (projectile, position, damage) in shots {
        let target = targets
            .iter()
            .find(|(_, centre, radius)| position.distance(*centre) <= *radius);
        if let Some((target, _, _)) = target {
            hits.push(Hit {
                projectile,
                target: *target,
                damage,
            });
        }
    }
    hits
}

/// Own pickups within reach of the ship.
pub fn find_pickups(system: &NetSystem, ship: &Ship) -> Vec<Uuid> {
    system
        .iter()
        .filter(|actor| actor.net_identity().is_authoritative())
        .filter_map(|actor| {
            let pickup = actor.downcast_ref::<Pickup>()?;
            (!pickup.collected && pickup.position.distance(ship.position) <= SHIP_RADIUS * 2.0)
                .then_some(actor.uuid())
        })
        .collect()
}

pub fn damage(hit: &Hit) -> NetAction {
    NetAction::damage(hit.damage)
}
