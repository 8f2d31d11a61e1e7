mod debris;
mod pickup;
mod projectile;
mod ship;

pub use debris::{Debris, DebrisState};
pub use pickup::{Pickup, PickupState};
pub use projectile::{Projectile, ProjectileState};
pub use ship::{Ship, ShipState};
