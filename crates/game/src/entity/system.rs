use std::collections::HashMap;

use uuid::Uuid;

use super::{EntityFactory, NetActor, NetIdentity, Replicated};
use crate::net::{
    EntityAction, EntityRef, EntityWithState, EventBody, NetAction, NetEvent, ReplicationSession,
    Slice,
};

/// What one drain of the session changed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub killed: usize,
    pub spawned: usize,
    pub updated: usize,
    pub migrated: usize,
    pub actions: usize,
}

impl SyncReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Tracks every live replicated entity on this peer and reconciles it with
/// network input once per tick.
pub struct NetSystem {
    entities: HashMap<Uuid, Box<dyn NetActor>>,
    factory: EntityFactory,
}

impl Default for NetSystem {
    fn default() -> Self {
        Self::new(EntityFactory::standard())
    }
}

impl NetSystem {
    pub fn new(factory: EntityFactory) -> Self {
        Self {
            entities: HashMap::new(),
            factory,
        }
    }

    pub fn factory(&self) -> &EntityFactory {
        &self.factory
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn contains(&self, uuid: &Uuid) -> bool {
        self.entities.contains_key(uuid)
    }

    pub fn get(&self, uuid: &Uuid) -> Option<&dyn NetActor> {
        self.entities.get(uuid).map(|actor| &**actor as &dyn NetActor)
    }

    pub fn get_mut(&mut self, uuid: &Uuid) -> Option<&mut dyn NetActor> {
        self.entities
            .get_mut(uuid)
            .map(|actor| &mut **actor as &mut dyn NetActor)
    }

    pub fn get_as<T: Replicated>(&self, uuid: &Uuid) -> Option<&T> {
        self.entities.get(uuid)?.downcast_ref::<T>()
    }

    pub fn get_as_mut<T: Replicated>(&mut self, uuid: &Uuid) -> Option<&mut T> {
        self.entities.get_mut(uuid)?.downcast_mut::<T>()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn NetActor> {
        self.entities.values().map(|actor| &**actor as &dyn NetActor)
    }

    /// Starts tracking an entity. Authoritative entities announce themselves
    /// with a Create; their dirty flag is cleared since the Create already
    /// carries the current state.
    pub fn attach(&mut self, mut actor: Box<dyn NetActor>, session: &ReplicationSession) -> Uuid {
        let uuid = actor.uuid();
        if actor.net_identity().is_authoritative() {
            if let Some(event) = create_event(&*actor) {
                session.send_event(event);
            }
            actor.net_identity_mut().consume_dirty();
        }

        if self.entities.insert(uuid, actor).is_some() {
            log::debug!("Replaced tracked entity {}", uuid);
        }
        uuid
    }

    pub fn attach_entity<T: Replicated>(&mut self, entity: T, session: &ReplicationSession) -> Uuid {
        self.attach(Box::new(entity), session)
    }

    /// Stops tracking an entity, announcing a Kill if this peer owns it.
    pub fn detach(&mut self, uuid: &Uuid, session: &ReplicationSession) -> Option<Box<dyn NetActor>> {
        let actor = self.entities.remove(uuid)?;
        if actor.net_identity().is_authoritative() {
            session.send_event(kill_event(&*actor));
        }
        Some(actor)
    }

    /// Drains the session and applies everything that arrived since the
    /// previous tick. After a reconnect every owned entity is announced
    /// again first.
    pub fn process_inbound(&mut self, session: &ReplicationSession) -> SyncReport {
        if session.take_resumed() {
            let announced = self.announce_all(session);
            log::info!("Resynced {} entities after reconnect", announced);
        }
        self.apply(session.slice_state())
    }

    /// Kills first, then updates, then creates, then actions.
    pub fn apply(&mut self, slice: Slice) -> SyncReport {
        let mut report = SyncReport::default();

        for uuid in &slice.kills {
            if self.entities.remove(uuid).is_some() {
                report.killed += 1;
            }
        }

        for update in slice.updates {
            let entity = update.event;
            let replica = !entity.is_replica;

            if let Some(actor) = self.entities.get_mut(&entity.uuid) {
                if actor.net_identity().is_replica() != replica {
                    log::info!(
                        "{:?} {} now {}",
                        entity.entity_type,
                        entity.uuid,
                        if replica { "remote" } else { "owned" }
                    );
                    actor.net_identity_mut().rebind(replica);
                    report.migrated += 1;
                }
                match actor.decode_state(&entity.state, update.latency) {
                    Ok(()) => report.updated += 1,
                    Err(e) => log::debug!("Dropping update for {}: {}", entity.uuid, e),
                }
                continue;
            }

            let identity = NetIdentity::new(entity.uuid, replica);
            if let Some(actor) = self
                .factory
                .spawn(entity.entity_type, identity, &entity.state, update.latency)
            {
                self.entities.insert(entity.uuid, actor);
                report.spawned += 1;
            }
        }

        for create in slice.creates {
            let entity = create.event;
            if self.entities.remove(&entity.uuid).is_some() {
                log::debug!("Create replaces existing {}", entity.uuid);
            }

            let identity = NetIdentity::new(entity.uuid, !entity.is_replica);
            if let Some(actor) = self
                .factory
                .spawn(entity.entity_type, identity, &entity.state, create.latency)
            {
                self.entities.insert(entity.uuid, actor);
                report.spawned += 1;
            }
        }

        for received in slice.actions {
            let action = received.event;
            match self.entities.get_mut(&action.uuid) {
                Some(actor) => {
                    actor.apply_action(&action.action, received.latency);
                    report.actions += 1;
                }
                None => log::debug!(
                    "Dropping {:?} for missing entity {}",
                    action.action.action_type(),
                    action.uuid
                ),
            }
        }

        report
    }

    pub fn step(&mut self, dt: f32) {
        for actor in self.entities.values_mut() {
            actor.step(dt);
        }
    }

    /// Removes expired entities. Only owned ones announce a Kill; expired
    /// replicas disappear locally and wait for the owner's Kill.
    pub fn reap_expired(&mut self, session: &ReplicationSession) -> usize {
        let expired: Vec<Uuid> = self
            .entities
            .iter()
            .filter(|(_, actor)| actor.expired())
            .map(|(uuid, _)| *uuid)
            .collect();

        for uuid in &expired {
            if let Some(actor) = self.entities.remove(uuid) {
                if actor.net_identity().is_authoritative() {
                    session.send_event(kill_event(&*actor));
                }
            }
        }
        expired.len()
    }

    /// Sends at most one Update per dirty owned entity and clears every
    /// dirty flag.
    pub fn flush_outbound(&mut self, session: &ReplicationSession) -> usize {
        let mut sent = 0;
        for actor in self.entities.values_mut() {
            if !actor.net_identity_mut().consume_dirty() {
                continue;
            }
            match actor.encode_state() {
                Ok(state) => {
                    session.send_event(NetEvent::broadcast(EventBody::Update(EntityWithState {
                        uuid: actor.uuid(),
                        entity_type: actor.entity_type(),
                        state,
                        is_replica: actor.net_identity().is_replica(),
                    })));
                    sent += 1;
                }
                Err(e) => log::warn!("Failed to encode {}: {}", actor.uuid(), e),
            }
        }
        sent
    }

    /// Applies an action to the local copy right away, then broadcasts it.
    /// Returns false when no entity with that uuid is tracked.
    pub fn send_action(&mut self, uuid: &Uuid, action: NetAction, session: &ReplicationSession) -> bool {
        let Some(actor) = self.entities.get_mut(uuid) else {
            return false;
        };
        actor.apply_action(&action, 0.0);
        session.send_event(NetEvent::broadcast(EventBody::Action(EntityAction {
            uuid: *uuid,
            entity_type: actor.entity_type(),
            action,
        })));
        true
    }

    /// Announces every owned entity as a Create inside a single batch.
    pub fn announce_all(&mut self, session: &ReplicationSession) -> usize {
        let mut creates = Vec::new();
        for actor in self.entities.values_mut() {
            if actor.net_identity().is_replica() {
                continue;
            }
            if let Some(event) = create_event(&**actor) {
                creates.push(event);
            }
            actor.net_identity_mut().consume_dirty();
        }

        let count = creates.len();
        if count > 0 {
            session.send_event(NetEvent::broadcast(EventBody::EntitiesList(creates)));
        }
        count
    }
}

fn create_event(actor: &dyn NetActor) -> Option<NetEvent> {
    match actor.encode_state() {
        Ok(state) => Some(NetEvent::broadcast(EventBody::Create(EntityWithState {
            uuid: actor.uuid(),
            entity_type: actor.entity_type(),
            state,
            is_replica: actor.net_identity().is_replica(),
        }))),
        Err(e) => {
            log::warn!("Failed to encode {}: {}", actor.uuid(), e);
            None
        }
    }
}

fn kill_event(actor: &dyn NetActor) -> NetEvent {
    NetEvent::broadcast(EventBody::Kill(EntityRef {
        uuid: actor.uuid(),
        entity_type: actor.entity_type(),
    }))
}

#[cfg(test)]
mod tests {
    use glam::Vec2;
    use serde_json::json;

    use super::*;
    use crate::entity::{Pickup, Projectile, Ship};
    use crate::net::{EntityType, Outbox, Received, SessionConfig};

    struct Peer {
        system: NetSystem,
        session: ReplicationSession,
        outbox: Outbox,
    }

    impl Peer {
        fn new() -> Self {
            let (session, outbox) = ReplicationSession::detached(SessionConfig::default());
            Self {
                system: NetSystem::default(),
                session,
                outbox,
            }
        }

        fn deliver_to(&mut self, other: &Peer) -> usize {
            let frames = self.outbox.drain();
            for frame in &frames {
                other.session.receive_frame(frame);
            }
            frames.len()
        }

        fn tick(&mut self) -> SyncReport {
            self.system.process_inbound(&self.session)
        }
    }

    fn received(entity: EntityWithState) -> Received<EntityWithState> {
        Received {
            event: entity,
            latency: 0.0,
        }
    }

    fn ship_state(x: f32, health: f32) -> serde_json::Value {
        json!({
            "position": [x, 0.0],
            "velocity": [0.0, 0.0],
            "rotation": 0.0,
            "angularVelocity": 0.0,
            "health": health,
        })
    }

    #[test]
    fn test_attach_announces_owned_entities_only() {
        let mut peer = Peer::new();
        let ship = Ship::spawn(Vec2::new(10.0, 20.0), 0.0);
        let uuid = peer.system.attach_entity(ship, &peer.session);

        let frames = peer.outbox.drain();
        assert_eq!(frames.len(), 1);
        match NetEvent::parse(&frames[0]).unwrap().body {
            EventBody::Create(entity) => {
                assert_eq!(entity.uuid, uuid);
                assert_eq!(entity.entity_type, EntityType::Ship);
                assert!(!entity.is_replica);
            }
            other => panic!("Expected Create, got {:?}", other),
        }

        let mut remote = Pickup::spawn(Vec2::ZERO, 10.0);
        *remote.identity_mut() = NetIdentity::new(Uuid::new_v4(), true);
        peer.system.attach_entity(remote, &peer.session);
        assert!(peer.outbox.drain().is_empty());
        assert_eq!(peer.system.len(), 2);
    }

    #[test]
    fn test_create_spawns_replica_on_other_peer() {
        let mut a = Peer::new();
        let mut b = Peer::new();
        let uuid = a.system.attach_entity(Ship::spawn(Vec2::new(3.0, 4.0), 1.0), &a.session);

        a.deliver_to(&b);
        let report = b.tick();
        assert_eq!(report.spawned, 1);

        let replica = b.system.get_as::<Ship>(&uuid).unwrap();
        assert!(replica.identity().is_replica());
        assert_eq!(replica.position, Vec2::new(3.0, 4.0));
    }

    #[test]
    fn test_kill_then_create_in_one_tick_recreates() {
        let mut system = NetSystem::default();
        let uuid = Uuid::new_v4();
        let mut slice = Slice::default();
        slice.creates.push(received(EntityWithState {
            uuid,
            entity_type: EntityType::Ship,
            state: ship_state(1.0, 50.0),
            is_replica: false,
        }));
        system.apply(slice);

        let mut slice = Slice::default();
        slice.kills.insert(uuid);
        slice.creates.push(received(EntityWithState {
            uuid,
            entity_type: EntityType::Ship,
            state: ship_state(9.0, 80.0),
            is_replica: false,
        }));
        let report = system.apply(slice);

        assert_eq!(report.killed, 1);
        assert_eq!(report.spawned, 1);
        assert_eq!(system.len(), 1);
        let ship = system.get_as::<Ship>(&uuid).unwrap();
        assert_eq!(ship.position, Vec2::new(9.0, 0.0));
        assert_eq!(ship.health, 80.0);
    }

    #[test]
    fn test_create_survives_kill_staged_after_it() {
        let mut system = NetSystem::default();
        let uuid = Uuid::new_v4();
        let mut slice = Slice::default();
        slice.stage(NetEvent::broadcast(EventBody::Create(EntityWithState {
            uuid,
            entity_type: EntityType::Ship,
            state: ship_state(4.0, 50.0),
            is_replica: false,
        })));
        slice.stage(NetEvent::broadcast(EventBody::Kill(EntityRef {
            uuid,
            entity_type: EntityType::Ship,
        })));

        let report = system.apply(slice);
        assert_eq!(report.killed, 0);
        assert_eq!(report.spawned, 1);
        assert_eq!(system.len(), 1);
        assert_eq!(system.get_as::<Ship>(&uuid).unwrap().health, 50.0);
    }

    #[test]
    fn test_repeated_kills_are_harmless() {
        let mut a = Peer::new();
        let mut b = Peer::new();
        let uuid = a.system.attach_entity(Ship::spawn(Vec2::ZERO, 0.0), &a.session);
        a.deliver_to(&b);
        b.tick();

        a.system.detach(&uuid, &a.session);
        a.session.send_event(NetEvent::broadcast(EventBody::Kill(EntityRef {
            uuid,
            entity_type: EntityType::Ship,
        })));
        a.deliver_to(&b);

        let report = b.tick();
        assert_eq!(report.killed, 1);
        assert!(!b.system.contains(&uuid));

        let mut slice = Slice::default();
        slice.kills.insert(uuid);
        assert_eq!(b.system.apply(slice).killed, 0);
    }

    #[test]
    fn test_update_for_unknown_entity_spawns_it() {
        let mut system = NetSystem::default();
        let uuid = Uuid::new_v4();
        let mut slice = Slice::default();
        slice.updates.push(received(EntityWithState {
            uuid,
            entity_type: EntityType::Ship,
            state: ship_state(2.0, 100.0),
            is_replica: false,
        }));

        let report = system.apply(slice);
        assert_eq!(report.spawned, 1);
        assert!(system.get(&uuid).unwrap().net_identity().is_replica());
    }

    #[test]
    fn test_unsupported_type_is_ignored() {
        let mut factory = EntityFactory::new();
        factory.register::<Ship>();
        let mut system = NetSystem::new(factory);

        let mut slice = Slice::default();
        slice.creates.push(received(EntityWithState {
            uuid: Uuid::new_v4(),
            entity_type: EntityType::Pickup,
            state: json!({ "position": [0.0, 0.0], "power": 5.0 }),
            is_replica: false,
        }));
        slice.updates.push(received(EntityWithState {
            uuid: Uuid::new_v4(),
            entity_type: EntityType::Debris,
            state: json!({}),
            is_replica: false,
        }));

        let report = system.apply(slice);
        assert!(report.is_empty());
        assert!(system.is_empty());
    }

    #[test]
    fn test_duplicate_create_replaces() {
        let mut system = NetSystem::default();
        let uuid = Uuid::new_v4();
        let mut slice = Slice::default();
        for x in [1.0, 2.0] {
            slice.creates.push(received(EntityWithState {
                uuid,
                entity_type: EntityType::Ship,
                state: ship_state(x, 100.0),
                is_replica: false,
            }));
        }

        let report = system.apply(slice);
        assert_eq!(report.spawned, 2);
        assert_eq!(system.len(), 1);
        assert_eq!(system.get_as::<Ship>(&uuid).unwrap().position, Vec2::new(2.0, 0.0));
    }

    #[test]
    fn test_only_authoritative_copy_broadcasts() {
        let mut a = Peer::new();
        let mut b = Peer::new();
        let uuid = a.system.attach_entity(Ship::spawn(Vec2::ZERO, 0.0), &a.session);
        a.deliver_to(&b);
        b.tick();

        a.system.get_as_mut::<Ship>(&uuid).unwrap().set_thrust(true);
        b.system.get_as_mut::<Ship>(&uuid).unwrap().set_thrust(true);

        assert_eq!(a.system.flush_outbound(&a.session), 1);
        assert_eq!(b.system.flush_outbound(&b.session), 0);
        assert_eq!(a.outbox.drain().len(), 1);
        assert!(b.outbox.drain().is_empty());

        assert!(!b.system.get(&uuid).unwrap().net_identity().is_dirty());
        assert_eq!(a.system.flush_outbound(&a.session), 0);
    }

    #[test]
    fn test_update_migrates_ownership() {
        let mut system = NetSystem::default();
        let (session, _outbox) = ReplicationSession::detached(SessionConfig::default());
        let uuid = system.attach_entity(Ship::spawn(Vec2::ZERO, 0.0), &session);

        let mut slice = Slice::default();
        slice.updates.push(received(EntityWithState {
            uuid,
            entity_type: EntityType::Ship,
            state: ship_state(7.0, 60.0),
            is_replica: false,
        }));
        let report = system.apply(slice);

        assert_eq!(report.migrated, 1);
        assert_eq!(report.updated, 1);
        let ship = system.get_as::<Ship>(&uuid).unwrap();
        assert!(ship.identity().is_replica());
        assert_eq!(ship.health, 60.0);
    }

    #[test]
    fn test_action_applies_locally_then_remotely() {
        let mut a = Peer::new();
        let mut b = Peer::new();
        let uuid = a.system.attach_entity(Ship::spawn(Vec2::ZERO, 0.0), &a.session);
        a.deliver_to(&b);
        b.tick();

        assert!(b.system.send_action(&uuid, NetAction::damage(25.0), &b.session));
        assert_eq!(b.system.get_as::<Ship>(&uuid).unwrap().health, 75.0);

        b.deliver_to(&a);
        let report = a.tick();
        assert_eq!(report.actions, 1);
        assert_eq!(a.system.get_as::<Ship>(&uuid).unwrap().health, 75.0);
        assert_eq!(a.system.flush_outbound(&a.session), 1);

        assert!(!b.system.send_action(&Uuid::new_v4(), NetAction::damage(1.0), &b.session));
    }

    #[test]
    fn test_action_for_missing_entity_is_dropped() {
        let mut system = NetSystem::default();
        let mut slice = Slice::default();
        slice.actions.push(Received {
            event: EntityAction {
                uuid: Uuid::new_v4(),
                entity_type: EntityType::Ship,
                action: NetAction::damage(10.0),
            },
            latency: 0.0,
        });
        assert_eq!(system.apply(slice).actions, 0);
    }

    #[test]
    fn test_reap_announces_owned_kills() {
        let mut peer = Peer::new();
        let owned = peer
            .system
            .attach_entity(Projectile::fire(Vec2::ZERO, Vec2::X, 5.0), &peer.session);
        let mut remote = Projectile::fire(Vec2::ZERO, Vec2::X, 5.0);
        *remote.identity_mut() = NetIdentity::new(Uuid::new_v4(), true);
        peer.system.attach_entity(remote, &peer.session);
        peer.outbox.drain();

        peer.system.step(5.0);
        assert_eq!(peer.system.reap_expired(&peer.session), 2);
        assert!(peer.system.is_empty());

        let frames = peer.outbox.drain();
        assert_eq!(frames.len(), 1);
        match NetEvent::parse(&frames[0]).unwrap().body {
            EventBody::Kill(entity) => assert_eq!(entity.uuid, owned),
            other => panic!("Expected Kill, got {:?}", other),
        }
    }

    #[test]
    fn test_announce_all_batches_owned_creates() {
        let mut a = Peer::new();
        let mut b = Peer::new();
        a.system.attach_entity(Ship::spawn(Vec2::ZERO, 0.0), &a.session);
        a.system.attach_entity(Pickup::spawn(Vec2::ONE, 20.0), &a.session);
        a.outbox.drain();

        assert_eq!(a.system.announce_all(&a.session), 2);
        assert_eq!(a.deliver_to(&b), 1);

        let report = b.tick();
        assert_eq!(report.spawned, 2);
        assert_eq!(b.system.len(), 2);
        assert!(b.system.iter().all(|actor| actor.net_identity().is_replica()));

        assert_eq!(b.system.announce_all(&b.session), 0);
        assert!(b.outbox.drain().is_empty());
    }
}
