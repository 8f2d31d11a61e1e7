mod factory;
mod kinds;
mod reckoning;
mod system;

use std::any::Any;

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use crate::net::{EntityType, NetAction, ProtocolError};

pub use factory::{Constructor, EntityFactory};
pub use kinds::{Debris, DebrisState, Pickup, PickupState, Projectile, ProjectileState, Ship, ShipState};
pub use reckoning::{
    advance_position, advance_rotation, advance_with_thrust, elapsed_secs, normalize_rotation,
    round_to, round_vec,
};
pub use system::{NetSystem, SyncReport};

/// Network identity of a replicated entity: who owns it and whether its
/// state needs rebroadcasting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetIdentity {
    uuid: Uuid,
    replica: bool,
    dirty: bool,
}

impl NetIdentity {
    pub fn new(uuid: Uuid, replica: bool) -> Self {
        Self {
            uuid,
            replica,
            dirty: false,
        }
    }

    /// A fresh identity owned by this peer.
    pub fn authoritative() -> Self {
        Self::new(Uuid::new_v4(), false)
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn is_replica(&self) -> bool {
        self.replica
    }

    pub fn is_authoritative(&self) -> bool {
        !self.replica
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Clears the flag and reports whether an update should go out. Replicas
    /// never transmit, dirty or not.
    pub fn consume_dirty(&mut self) -> bool {
        let send = self.dirty && !self.replica;
        self.dirty = false;
        send
    }

    /// Host migration: same entity, new owner.
    pub(crate) fn rebind(&mut self, replica: bool) {
        *self = Self::new(self.uuid, replica);
    }
}

/// Typed replication contract implemented by every entity kind.
pub trait Replicated: Any + Send + Sized {
    const ENTITY_TYPE: EntityType;
    type State: Serialize + DeserializeOwned;

    /// Builds the entity and applies `state` before it is ever observed.
    fn from_state(identity: NetIdentity, state: &Self::State, latency: f64) -> Self;

    fn identity(&self) -> &NetIdentity;

    fn identity_mut(&mut self) -> &mut NetIdentity;

    /// Pure snapshot of the fields that matter to other peers.
    fn serialize_state(&self) -> Self::State;

    /// Accepts a snapshot `latency` ms old. Identical input must leave the
    /// entity in the same state no matter how often it is applied.
    fn update_state(&mut self, state: &Self::State, latency: f64);

    fn receive_action(&mut self, action: &NetAction, latency: f64) {
        log::debug!(
            "{:?} {} ignores {:?} ({:.0} ms)",
            Self::ENTITY_TYPE,
            self.identity().uuid(),
            action.action_type(),
            latency
        );
    }

    fn advance(&mut self, _dt: f32) {}

    fn is_expired(&self) -> bool {
        false
    }
}

/// Object-safe face of [`Replicated`] used by the lifecycle manager.
pub trait NetActor: Send {
    fn entity_type(&self) -> EntityType;
    fn net_identity(&self) -> &NetIdentity;
    fn net_identity_mut(&mut self) -> &mut NetIdentity;
    fn encode_state(&self) -> Result<Value, ProtocolError>;
    fn decode_state(&mut self, state: &Value, latency: f64) -> Result<(), ProtocolError>;
    fn apply_action(&mut self, action: &NetAction, latency: f64);
    fn step(&mut self, dt: f32);
    fn expired(&self) -> bool;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Replicated> NetActor for T {
    fn entity_type(&self) -> EntityType {
        T::ENTITY_TYPE
    }

    fn net_identity(&self) -> &NetIdentity {
        self.identity()
    }

    fn net_identity_mut(&mut self) -> &mut NetIdentity {
        self.identity_mut()
    }

    fn encode_state(&self) -> Result<Value, ProtocolError> {
        Ok(serde_json::to_value(self.serialize_state())?)
    }

    fn decode_state(&mut self, state: &Value, latency: f64) -> Result<(), ProtocolError> {
        let state = T::State::deserialize(state)?;
        self.update_state(&state, latency);
        Ok(())
    }

    fn apply_action(&mut self, action: &NetAction, latency: f64) {
        self.receive_action(action, latency);
    }

    fn step(&mut self, dt: f32) {
        self.advance(dt);
    }

    fn expired(&self) -> bool {
        self.is_expired()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl<'a> dyn NetActor + 'a {
    pub fn uuid(&self) -> Uuid {
        self.net_identity().uuid()
    }

    pub fn downcast_ref<T: Replicated>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Replicated>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consume_dirty_clears_unconditionally() {
        let mut identity = NetIdentity::authoritative();
        assert!(!identity.consume_dirty());

        identity.mark_dirty();
        assert!(identity.is_dirty());
        assert!(identity.consume_dirty());
        assert!(!identity.is_dirty());
        assert!(!identity.consume_dirty());
    }

    #[test]
    fn test_replica_never_transmits() {
        let mut identity = NetIdentity::new(Uuid::new_v4(), true);
        identity.mark_dirty();
        assert!(!identity.consume_dirty());
        assert!(!identity.is_dirty());
    }

    #[test]
    fn test_rebind_keeps_uuid() {
        let mut identity = NetIdentity::new(Uuid::new_v4(), true);
        let uuid = identity.uuid();
        identity.mark_dirty();

        identity.rebind(false);
        assert_eq!(identity.uuid(), uuid);
        assert!(identity.is_authoritative());
        assert!(!identity.is_dirty());
    }
}
