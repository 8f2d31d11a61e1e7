use std::time::Duration;

/// Artificial send delay for exercising degraded networks. Each send draws
/// its own delay, so frames may overtake each other.
#[derive(Debug, Clone, Default)]
pub struct LatencySimulation {
    pub enabled: bool,
    pub min_latency_ms: u32,
    pub max_latency_ms: u32,
    pub jitter_ms: u32,
}

impl LatencySimulation {
    pub fn fixed(latency_ms: u32) -> Self {
        Self {
            enabled: latency_ms > 0,
            min_latency_ms: latency_ms,
            max_latency_ms: latency_ms,
            jitter_ms: 0,
        }
    }

    pub fn delay(&self) -> Duration {
        if !self.enabled || self.max_latency_ms == 0 {
            return Duration::ZERO;
        }
        let base = self.min_latency_ms;
        let range = self.max_latency_ms.saturating_sub(self.min_latency_ms);
        let jitter = if self.jitter_ms > 0 {
            (rand_percent() * self.jitter_ms as f32) as u32
        } else {
            0
        };
        Duration::from_millis(u64::from(base + (rand_percent() * range as f32) as u32 + jitter))
    }
}

#[derive(Debug, Clone, Default)]
pub struct NetworkStats {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub frames_dropped: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub reconnects: u64,
    pub ping_ms: f64,
    pub clock_offset_ms: f64,
}

pub fn rand_percent() -> f32 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let mut hasher = RandomState::new().build_hasher();
    hasher.write_u128(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default(),
    );
    (hasher.finish() % 10000) as f32 / 10000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_simulation_has_no_delay() {
        let sim = LatencySimulation::default();
        assert_eq!(sim.delay(), Duration::ZERO);
        assert_eq!(LatencySimulation::fixed(0).delay(), Duration::ZERO);
    }

    #[test]
    fn test_fixed_delay() {
        let sim = LatencySimulation::fixed(120);
        assert_eq!(sim.delay(), Duration::from_millis(120));
    }

    #[test]
    fn test_delay_stays_within_range() {
        let sim = LatencySimulation {
            enabled: true,
            min_latency_ms: 50,
            max_latency_ms: 100,
            jitter_ms: 10,
        };
        for _ in 0..100 {
            let delay = sim.delay().as_millis();
            assert!((50..=110).contains(&delay), "delay {} out of range", delay);
        }
    }

    #[test]
    fn test_rand_percent_range() {
        for _ in 0..100 {
            let p = rand_percent();
            assert!((0.0..1.0).contains(&p));
        }
    }
}
