use std::time::Instant;

use super::event::{EventBody, NetEvent, Ping, Pong};
use super::protocol::Receiver;

/// Monotonic milliseconds since construction.
#[derive(Debug, Clone, Copy)]
pub struct LocalClock {
    origin: Instant,
}

impl Default for LocalClock {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockState {
    Unsynced,
    Synced,
}

/// Ping/pong clock estimate. Each pong replaces both values outright; there
/// is no averaging across samples.
#[derive(Debug, Clone, Copy)]
pub struct ClockSync {
    state: ClockState,
    ping_ms: f64,
    offset_ms: f64,
    samples: u64,
}

impl Default for ClockSync {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockSync {
    pub fn new() -> Self {
        Self {
            state: ClockState::Unsynced,
            ping_ms: 0.0,
            offset_ms: 0.0,
            samples: 0,
        }
    }

    pub fn state(&self) -> ClockState {
        self.state
    }

    pub fn is_synced(&self) -> bool {
        self.state == ClockState::Synced
    }

    /// Half of the last measured round trip.
    pub fn ping_ms(&self) -> f64 {
        self.ping_ms
    }

    pub fn offset_ms(&self) -> f64 {
        self.offset_ms
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn synced_time(&self, local_now: f64) -> f64 {
        local_now + self.offset_ms
    }

    pub fn latency_of(&self, event_time: f64, local_now: f64) -> f64 {
        self.synced_time(local_now) - event_time
    }

    pub fn ping_event(&self, local_now: f64) -> NetEvent {
        let mut event = NetEvent::new(
            Receiver::AllClients,
            EventBody::Ping(Ping {
                ping_time: local_now,
            }),
        );
        event.stamp(self.synced_time(local_now));
        event
    }

    pub fn on_pong(&mut self, pong: &Pong, local_now: f64) {
        let round_trip = local_now - pong.ping_time;
        let midpoint = (pong.ping_time + local_now) / 2.0;

        self.ping_ms = round_trip / 2.0;
        self.offset_ms = pong.server_time - midpoint;
        self.samples += 1;
        self.state = ClockState::Synced;

        log::debug!(
            "Clock sample: ping {:.1} ms, offset {:.1} ms",
            self.ping_ms,
            self.offset_ms
        );
    }
}

/// Reply to a ping using the answering side's clock as the reference.
pub fn answer_ping(ping: &Ping, remote_now: f64) -> NetEvent {
    let mut event = NetEvent::new(
        Receiver::AllClients,
        EventBody::Pong(Pong {
            ping_time: ping.ping_time,
            server_time: remote_now,
        }),
    );
    event.stamp(remote_now);
    event
}
