use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use super::kinds::{Debris, Pickup, Projectile, Ship};
use super::{NetActor, NetIdentity, Replicated};
use crate::net::{EntityType, ProtocolError};

/// Builds a boxed entity from a wire snapshot.
pub type Constructor = fn(NetIdentity, &Value, f64) -> Result<Box<dyn NetActor>, ProtocolError>;

fn construct<T: Replicated>(
    identity: NetIdentity,
    state: &Value,
    latency: f64,
) -> Result<Box<dyn NetActor>, ProtocolError> {
    let state = T::State::deserialize(state)?;
    Ok(Box::new(T::from_state(identity, &state, latency)))
}

/// Entity type tag to constructor table used when a Create or an Update for
/// an unknown uuid arrives.
#[derive(Debug, Default)]
pub struct EntityFactory {
    constructors: HashMap<EntityType, Constructor>,
}

impl EntityFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn standard() -> Self {
        let mut factory = Self::new();
        factory
            .register::<Ship>()
            .register::<Projectile>()
            .register::<Debris>()
            .register::<Pickup>();
        factory
    }

    /// Registers `T` under its entity type, replacing any previous entry.
    pub fn register<T: Replicated>(&mut self) -> &mut Self {
        self.constructors.insert(T::ENTITY_TYPE, construct::<T>);
        self
    }

    pub fn supports(&self, entity_type: EntityType) -> bool {
        self.constructors.contains_key(&entity_type)
    }

    pub fn build(
        &self,
        entity_type: EntityType,
        identity: NetIdentity,
        state: &Value,
        latency: f64,
    ) -> Result<Box<dyn NetActor>, ProtocolError> {
        let constructor = self
            .constructors
            .get(&entity_type)
            .ok_or(ProtocolError::UnknownEntityType(u8::from(entity_type)))?;
        constructor(identity, state, latency)
    }

    pub fn spawn(
        &self,
        entity_type: EntityType,
        identity: NetIdentity,
        state: &Value,
        latency: f64,
    ) -> Option<Box<dyn NetActor>> {
        match self.build(entity_type, identity, state, latency) {
            Ok(actor) => Some(actor),
            Err(e) => {
                log::warn!("Cannot spawn {:?} {}: {}", entity_type, identity.uuid(), e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec2;
    use serde_json::json;
    use uuid::Uuid;

    use super::*;

    #[test]
    fn test_standard_factory_supports_every_kind() {
        let factory = EntityFactory::standard();
        for entity_type in [
            EntityType::Ship,
            EntityType::Projectile,
            EntityType::Debris,
            EntityType::Pickup,
        ] {
            assert!(factory.supports(entity_type));
        }
    }

    #[test]
    fn test_missing_constructor_is_an_error() {
        let mut factory = EntityFactory::new();
        factory.register::<Pickup>();

        let identity = NetIdentity::new(Uuid::new_v4(), true);
        let result = factory.build(EntityType::Ship, identity, &json!({}), 0.0);
        assert!(matches!(result, Err(ProtocolError::UnknownEntityType(0))));
        assert!(factory.spawn(EntityType::Ship, identity, &json!({}), 0.0).is_none());
    }

    #[test]
    fn test_build_applies_state_with_latency() {
        let factory = EntityFactory::standard();
        let identity = NetIdentity::new(Uuid::new_v4(), true);
        let state = json!({ "position": [0.0, 0.0], "velocity": [10.0, 0.0], "ttl": 2000.0, "damage": 10.0 });

        let actor = factory
            .build(EntityType::Projectile, identity, &state, 500.0)
            .unwrap();
        let projectile = actor.downcast_ref::<Projectile>().unwrap();
        assert!((projectile.position - Vec2::new(5.0, 0.0)).length() < 1e-4);
        assert!(actor.net_identity().is_replica());
    }

    #[test]
    fn test_malformed_state_is_rejected() {
        let factory = EntityFactory::standard();
        let identity = NetIdentity::new(Uuid::new_v4(), true);
        let result = factory.build(EntityType::Pickup, identity, &json!({ "position": "nowhere" }), 0.0);
        assert!(matches!(result, Err(ProtocolError::Malformed(_))));
    }
}
