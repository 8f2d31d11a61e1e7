use std::time::Duration;

use driftnet::SessionConfig;

#[derive(Debug, Clone)]
pub struct PeerConfig {
    pub session: SessionConfig,
    pub tick_rate: u32,
    /// Ticks between shots; zero disables firing.
    pub fire_interval: u64,
    pub debris: usize,
    pub stats_interval: Duration,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            tick_rate: driftnet::DEFAULT_TICK_RATE,
            fire_interval: 45,
            debris: 2,
            stats_interval: Duration::from_secs(5),
        }
    }
}
