/// Frame deltas above this are clamped so a stalled process does not
/// replay seconds of ticks at once.
const MAX_FRAME_DELTA: f32 = 0.25;

pub struct FixedTimestep {
    tick_rate: u32,
    dt: f32,
    accumulator: f32,
}

impl FixedTimestep {
    pub fn new(tick_rate: u32) -> Self {
        let tick_rate = tick_rate.max(1);
        Self {
            tick_rate,
            dt: 1.0 / tick_rate as f32,
            accumulator: 0.0,
        }
    }

    pub fn tick_rate(&self) -> u32 {
        self.tick_rate
    }

    pub fn dt(&self) -> f32 {
        self.dt
    }

    pub fn accumulate(&mut self, delta: f32) {
        self.accumulator += delta.clamp(0.0, MAX_FRAME_DELTA);
    }

    pub fn should_tick(&self) -> bool {
        self.accumulator >= self.dt
    }

    pub fn consume_tick(&mut self) -> bool {
        if self.accumulator >= self.dt {
            self.accumulator -= self.dt;
            true
        } else {
            false
        }
    }

    pub fn alpha(&self) -> f32 {
        self.accumulator / self.dt
    }

    pub fn reset(&mut self) {
        self.accumulator = 0.0;
    }
}

/// Runs `tick_fn(tick, dt)` once per whole fixed step contained in the
/// wall-clock time fed to [`TickLoop::update`].
pub struct TickLoop<F> {
    timestep: FixedTimestep,
    tick: u64,
    tick_fn: F,
}

impl<F> TickLoop<F>
where
    F: FnMut(u64, f32),
{
    pub fn new(tick_rate: u32, tick_fn: F) -> Self {
        Self {
            timestep: FixedTimestep::new(tick_rate),
            tick: 0,
            tick_fn,
        }
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn timestep(&self) -> &FixedTimestep {
        &self.timestep
    }

    pub fn update(&mut self, delta: f32) -> u32 {
        self.timestep.accumulate(delta);

        let dt = self.timestep.dt();
        let mut ticks_run = 0;
        while self.timestep.consume_tick() {
            (self.tick_fn)(self.tick, dt);
            self.tick += 1;
            ticks_run += 1;
        }
        ticks_run
    }
}
