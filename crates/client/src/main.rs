mod combat;
mod config;
mod pilot;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use glam::Vec2;
use uuid::Uuid;

use driftnet::entity::{Debris, Pickup, Projectile, Ship};
use driftnet::{
    LatencySimulation, NetAction, NetSystem, ReplicationSession, SessionConfig, TickLoop,
};

use config::PeerConfig;
use pilot::{ARENA_RADIUS, Pilot};

#[derive(Parser)]
#[command(name = "driftnet-peer")]
#[command(about = "Headless driftnet peer that flies a ship through the relay")]
struct Args {
    #[arg(
        short,
        long,
        default_value_t = format!("127.0.0.1:{}", driftnet::DEFAULT_PORT),
        help = "Relay address to connect to"
    )]
    server: String,

    #[arg(short, long, default_value_t = driftnet::DEFAULT_TICK_RATE)]
    tick_rate: u32,

    #[arg(long, default_value_t = 45, help = "Ticks between shots, 0 to hold fire")]
    fire_interval: u64,

    #[arg(long, default_value_t = 2, help = "Debris pieces owned by this peer")]
    debris: usize,

    #[arg(long, default_value_t = 0, help = "Minimum simulated send latency in ms")]
    min_latency: u32,

    #[arg(long, default_value_t = 0, help = "Maximum simulated send latency in ms")]
    max_latency: u32,

    #[arg(long, default_value_t = 0, help = "Jitter in ms")]
    jitter: u32,

    #[arg(long, default_value_t = 5, help = "Seconds between stats lines")]
    stats_interval: u64,
}

impl Args {
    fn into_config(self) -> PeerConfig {
        let max_latency = self.max_latency.max(self.min_latency);
        let send_latency = LatencySimulation {
            enabled: max_latency > 0 || self.jitter > 0,
            min_latency_ms: self.min_latency,
            max_latency_ms: max_latency,
            jitter_ms: self.jitter,
        };

        PeerConfig {
            session: SessionConfig {
                server_addr: self.server,
                send_latency,
                ..SessionConfig::default()
            },
            tick_rate: self.tick_rate.max(1),
            fire_interval: self.fire_interval,
            debris: self.debris,
            stats_interval: Duration::from_secs(self.stats_interval.max(1)),
        }
    }
}

struct Peer<'a> {
    session: &'a ReplicationSession,
    config: &'a PeerConfig,
    system: NetSystem,
    pilot: Pilot,
    ship: Uuid,
}

impl<'a> Peer<'a> {
    fn new(config: &'a PeerConfig, session: &'a ReplicationSession) -> Self {
        let mut system = NetSystem::default();
        let ship = system.attach_entity(Ship::spawn(spawn_point(0), 0.0), session);
        for debris in pilot::scatter_debris(config.debris) {
            system.attach_entity(debris, session);
        }
        log::info!("Ship {} launched", ship);

        Self {
            session,
            config,
            system,
            pilot: Pilot::new(config.tick_rate),
            ship,
        }
    }

    fn tick(&mut self, tick: u64, dt: f32) {
        let report = self.system.process_inbound(self.session);
        if !report.is_empty() {
            log::debug!("Tick {}: {:?}", tick, report);
        }

        self.fly(tick);
        self.fire(tick);
        self.spawn_pickup(tick);
        self.resolve_hits();
        self.collect_pickups();
        self.contain_debris();

        self.system.step(dt);
        self.system.reap_expired(self.session);
        self.system.flush_outbound(self.session);

        let stats_ticks = self.config.stats_interval.as_secs() * u64::from(self.config.tick_rate);
        if stats_ticks > 0 && tick % stats_ticks == 0 {
            self.log_stats();
        }
    }

    fn fly(&mut self, tick: u64) {
        if !self.system.contains(&self.ship) {
            self.ship = self
                .system
                .attach_entity(Ship::spawn(spawn_point(tick), 0.0), self.session);
            log::info!("Ship destroyed, respawned as {}", self.ship);
        }

        let bounce = self
            .system
            .get_as_mut::<Ship>(&self.ship)
            .and_then(|ship| self.pilot.fly(tick, ship));
        if let Some(action) = bounce {
            self.system.send_action(&self.ship, action, self.session);
        }
    }

    fn fire(&mut self, tick: u64) {
        if self.config.fire_interval == 0 || tick % self.config.fire_interval != 0 {
            return;
        }
        let Some(projectile) = self.system.get_as::<Ship>(&self.ship).map(combat::fire) else {
            return;
        };
        self.system.attach_entity(projectile, self.session);
    }

    fn spawn_pickup(&mut self, tick: u64) {
        let interval = u64::from(self.config.tick_rate) * 10;
        if tick == 0 || tick % interval != 0 {
            return;
        }
        let position = Vec2::from_angle(tick as f32 * 0.37) * ARENA_RADIUS * 0.3;
        self.system.attach_entity(Pickup::spawn(position, 25.0), self.session);
    }

    fn resolve_hits(&mut self) {
        for hit in combat::find_hits(&self.system) {
            self.system.send_action(&hit.target, combat::damage(&hit), self.session);
            if let Some(projectile) = self.system.get_as_mut::<Projectile>(&hit.projectile) {
                projectile.spend();
            }
        }
    }

    fn collect_pickups(&mut self) {
        let Some(ship) = self.system.get_as::<Ship>(&self.ship) else {
            return;
        };
        for uuid in combat::find_pickups(&self.system, ship) {
            let Some(power) = self.system.get_as_mut::<Pickup>(&uuid).map(Pickup::collect) else {
                continue;
            };
            self.system
                .send_action(&self.ship, NetAction::power_up(power), self.session);
        }
    }

    fn contain_debris(&mut self) {
        let escaping: Vec<(Uuid, NetAction)> = self
            .system
            .iter()
            .filter(|actor| actor.net_identity().is_authoritative())
            .filter_map(|actor| {
                let debris = actor.downcast_ref::<Debris>()?;
                pilot::outside_arena(debris.position, debris.velocity).map(|action| (actor.uuid(), action))
            })
            .collect();

        for (uuid, action) in escaping {
            self.system.send_action(&uuid, action, self.session);
        }
    }

    fn log_stats(&self) {
        let stats = self.session.stats();
        log::info!(
            "{} | ping {:.1} ms | offset {:.1} ms | sent {} ({} B) | received {} ({} B) | dropped {} | reconnects {} | entities {}",
            if self.session.is_online() { "online" } else { "offline" },
            stats.ping_ms,
            stats.clock_offset_ms,
            stats.frames_sent,
            stats.bytes_sent,
            stats.frames_received,
            stats.bytes_received,
            stats.frames_dropped,
            stats.reconnects,
            self.system.len()
        );
    }

    /// Announces a Kill for everything this peer owns.
    fn leave(&mut self) {
        let owned: Vec<Uuid> = self
            .system
            .iter()
            .filter(|actor| actor.net_identity().is_authoritative())
            .map(|actor| actor.uuid())
            .collect();
        for uuid in &owned {
            self.system.detach(uuid, self.session);
        }
        log::info!("Withdrew {} entities", owned.len());
    }
}

fn spawn_point(seed: u64) -> Vec2 {
    Vec2::from_angle(seed as f32 * 1.7 + std::process::id() as f32) * ARENA_RADIUS * 0.6
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Args::parse().into_config();
    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let session = {
        let _guard = runtime.enter();
        ReplicationSession::connect(config.session.clone())
            .with_context(|| format!("Failed to start session for {}", config.session.server_addr))?
    };

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        runtime.spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("Interrupted, leaving the arena");
                running.store(false, Ordering::SeqCst);
            }
        });
    }

    let mut peer = Peer::new(&config, &session);
    {
        let mut ticker = TickLoop::new(config.tick_rate, |tick, dt| peer.tick(tick, dt));
        let mut last = Instant::now();
        while running.load(Ordering::SeqCst) {
            let now = Instant::now();
            ticker.update((now - last).as_secs_f32());
            last = now;
            std::thread::sleep(Duration::from_millis(1));
        }
    }
    peer.leave();

    session.shutdown();
    runtime.block_on(async {
        let deadline = Instant::now() + Duration::from_secs(1);
        while session.is_online() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    });
    Ok(())
}
