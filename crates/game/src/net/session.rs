use std::collections::{HashSet, VecDeque};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::runtime::{Handle, TryCurrentError};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use super::clock::{ClockSync, LocalClock};
use super::event::{EntityAction, EntityWithState, EventBody, EventRegistry, NetEvent};
use super::frame::{Frame, FrameReader};
use super::protocol::{DEFAULT_PORT, MAX_FRAME_SIZE, PING_INTERVAL_MS, RECONNECT_BACKOFF_MS};
use super::stats::{LatencySimulation, NetworkStats};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no tokio runtime to drive the session: {0}")]
    NoRuntime(#[from] TryCurrentError),
    #[error("server address is empty")]
    EmptyAddress,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub server_addr: String,
    pub ping_interval: Duration,
    pub reconnect_backoff: Duration,
    pub send_latency: LatencySimulation,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            server_addr: format!("127.0.0.1:{}", DEFAULT_PORT),
            ping_interval: Duration::from_millis(PING_INTERVAL_MS),
            reconnect_backoff: Duration::from_millis(RECONNECT_BACKOFF_MS),
            send_latency: LatencySimulation::default(),
        }
    }
}

/// An inbound event together with the latency measured when it arrived.
#[derive(Debug, Clone, PartialEq)]
pub struct Received<T> {
    pub event: T,
    pub latency: f64,
}

/// Everything that arrived since the previous drain.
#[derive(Debug, Default)]
pub struct Slice {
    pub creates: Vec<Received<EntityWithState>>,
    pub updates: Vec<Received<EntityWithState>>,
    pub kills: HashSet<Uuid>,
    pub actions: Vec<Received<EntityAction>>,
}

impl Slice {
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty()
            && self.updates.is_empty()
            && self.kills.is_empty()
            && self.actions.is_empty()
    }

    /// Sorts an event into its accumulator. Arrival order between
    /// accumulators is not kept; the drain applies kills, updates and
    /// creates in that order.
    pub fn stage(&mut self, event: NetEvent) {
        let latency = event.latency;
        match event.body {
            EventBody::Create(entity) => self.creates.push(Received {
                event: entity,
                latency,
            }),
            EventBody::Update(entity) => self.updates.push(Received {
                event: entity,
                latency,
            }),
            EventBody::Kill(entity) => {
                self.kills.insert(entity.uuid);
            }
            EventBody::Action(action) => self.actions.push(Received {
                event: action,
                latency,
            }),
            EventBody::EntitiesList(events) => {
                for event in events {
                    self.stage(event);
                }
            }
            EventBody::Ping(_) | EventBody::Pong(_) => {}
        }
    }
}

#[derive(Debug)]
enum Command {
    Send(String),
    Shutdown,
}

enum Disconnect {
    Lost,
    Shutdown,
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
struct Shared {
    inbox: Mutex<Slice>,
    clock: Mutex<ClockSync>,
    stats: Mutex<NetworkStats>,
    local: LocalClock,
    online: AtomicBool,
    resumed: AtomicBool,
    running: AtomicBool,
}

impl Shared {
    fn new() -> Self {
        Self {
            inbox: Mutex::new(Slice::default()),
            clock: Mutex::new(ClockSync::new()),
            stats: Mutex::new(NetworkStats::default()),
            local: LocalClock::new(),
            online: AtomicBool::new(false),
            resumed: AtomicBool::new(false),
            running: AtomicBool::new(true),
        }
    }

    fn synced_time(&self) -> f64 {
        lock(&self.clock).synced_time(self.local.now_ms())
    }

    fn drop_frame(&self, frame: &Frame) {
        log::debug!("Dropping unreadable frame: {:?}", frame);
        let mut stats = lock(&self.stats);
        stats.frames_received += 1;
        stats.frames_dropped += 1;
    }

    fn receive_frame(&self, text: &str) {
        {
            let mut stats = lock(&self.stats);
            stats.frames_received += 1;
            stats.bytes_received += text.len() as u64;
        }

        if text.len() > MAX_FRAME_SIZE {
            log::warn!("Dropping oversized frame ({} bytes)", text.len());
            lock(&self.stats).frames_dropped += 1;
            return;
        }

        let Some(mut event) = EventRegistry::standard().parse(text) else {
            lock(&self.stats).frames_dropped += 1;
            return;
        };

        let local_now = self.local.now_ms();
        match &event.body {
            EventBody::Pong(pong) => {
                lock(&self.clock).on_pong(pong, local_now);
                return;
            }
            EventBody::Ping(_) => {
                log::debug!("Ignoring ping addressed to the relay");
                return;
            }
            _ => {}
        }

        let synced_now = lock(&self.clock).synced_time(local_now);
        event.measure_latency(synced_now);
        lock(&self.inbox).stage(event);
    }
}

/// Outbound frames of a session that has no socket. Lets tests and
/// in-process wiring observe exactly what would have been written.
#[derive(Debug)]
pub struct Outbox {
    receiver: mpsc::UnboundedReceiver<Command>,
}

impl Outbox {
    pub fn drain(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(command) = self.receiver.try_recv() {
            if let Command::Send(frame) = command {
                frames.push(frame);
            }
        }
        frames
    }
}

/// Per-peer replication runtime. Socket I/O runs on a background task and
/// only ever touches the staged accumulators; the simulation observes
/// network input solely through [`ReplicationSession::slice_state`].
#[derive(Debug)]
pub struct ReplicationSession {
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<Command>,
    runtime: Option<Handle>,
    config: SessionConfig,
}

impl ReplicationSession {
    /// Starts the connection task on the current tokio runtime. Returns
    /// immediately; the socket is opened (and reopened) in the background.
    pub fn connect(config: SessionConfig) -> Result<Self, SessionError> {
        if config.server_addr.trim().is_empty() {
            return Err(SessionError::EmptyAddress);
        }
        let runtime = Handle::try_current()?;

        let (commands, receiver) = mpsc::unbounded_channel();
        let session = Self {
            shared: Arc::new(Shared::new()),
            commands,
            runtime: Some(runtime.clone()),
            config,
        };

        log::info!("Connecting to {}", session.config.server_addr);
        runtime.spawn(run_connection(
            Arc::clone(&session.shared),
            session.config.clone(),
            receiver,
        ));
        Ok(session)
    }

    /// A session with no socket; outbound frames collect in the returned
    /// [`Outbox`] and inbound frames are fed through `receive_frame`.
    pub fn detached(config: SessionConfig) -> (Self, Outbox) {
        let (commands, receiver) = mpsc::unbounded_channel();
        let session = Self {
            shared: Arc::new(Shared::new()),
            commands,
            runtime: Handle::try_current().ok(),
            config,
        };
        (session, Outbox { receiver })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn is_online(&self) -> bool {
        self.shared.online.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// True once after every successful reconnect.
    pub fn take_resumed(&self) -> bool {
        self.shared.resumed.swap(false, Ordering::SeqCst)
    }

    pub fn clock(&self) -> ClockSync {
        *lock(&self.shared.clock)
    }

    pub fn local_time(&self) -> f64 {
        self.shared.local.now_ms()
    }

    pub fn synced_time(&self) -> f64 {
        self.shared.synced_time()
    }

    pub fn stats(&self) -> NetworkStats {
        let clock = self.clock();
        let mut stats = lock(&self.shared.stats).clone();
        stats.ping_ms = clock.ping_ms();
        stats.clock_offset_ms = clock.offset_ms();
        stats
    }

    /// Parses and stages one inbound frame.
    pub fn receive_frame(&self, text: &str) {
        self.shared.receive_frame(text);
    }

    /// Drains all accumulators at once, leaving fresh empty ones behind.
    pub fn slice_state(&self) -> Slice {
        std::mem::take(&mut *lock(&self.shared.inbox))
    }

    /// Stamps, serializes and queues an event. With simulated latency each
    /// call is delayed independently and cannot be cancelled.
    pub fn send_event(&self, mut event: NetEvent) {
        event.stamp(self.synced_time());
        let frame = match event.serialize() {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("Failed to serialize {:?}: {}", event.event_type(), e);
                return;
            }
        };

        let delay = self.config.send_latency.delay();
        match &self.runtime {
            Some(runtime) if !delay.is_zero() => {
                let commands = self.commands.clone();
                runtime.spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = commands.send(Command::Send(frame));
                });
            }
            _ => self.enqueue(frame),
        }
    }

    fn enqueue(&self, frame: String) {
        if self.commands.send(Command::Send(frame)).is_err() {
            log::debug!("Session stopped, dropping outbound frame");
        }
    }

    /// Flushes whatever is already queued, then closes the socket and stops
    /// reconnecting.
    pub fn shutdown(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        let _ = self.commands.send(Command::Shutdown);
    }
}

async fn run_connection(
    shared: Arc<Shared>,
    config: SessionConfig,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let mut pending = VecDeque::new();
    let mut connected_before = false;

    while shared.running.load(Ordering::SeqCst) {
        match TcpStream::connect(config.server_addr.as_str()).await {
            Ok(stream) => {
                let _ = stream.set_nodelay(true);
                log::info!("Connected to relay at {}", config.server_addr);
                if connected_before {
                    lock(&shared.stats).reconnects += 1;
                    shared.resumed.store(true, Ordering::SeqCst);
                }
                shared.online.store(true, Ordering::SeqCst);
                connected_before = true;

                let outcome = drive_connection(&shared, &config, stream, &mut commands, &mut pending).await;
                shared.online.store(false, Ordering::SeqCst);
                match outcome {
                    Disconnect::Shutdown => break,
                    Disconnect::Lost => {
                        log::warn!("Relay connection lost, {} frames queued", pending.len());
                    }
                }
            }
            Err(e) => {
                log::warn!("Failed to connect to {}: {}", config.server_addr, e);
            }
        }

        if !wait_for_retry(&config, &mut commands, &mut pending).await {
            break;
        }
    }

    shared.running.store(false, Ordering::SeqCst);
    log::info!("Replication session stopped");
}

/// Sleeps out the reconnect backoff while queueing outbound frames. Returns
/// false when the session was shut down.
async fn wait_for_retry(
    config: &SessionConfig,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    pending: &mut VecDeque<String>,
) -> bool {
    let backoff = tokio::time::sleep(config.reconnect_backoff);
    tokio::pin!(backoff);

    loop {
        tokio::select! {
            _ = &mut backoff => return true,
            command = commands.recv() => match command {
                Some(Command::Send(frame)) => pending.push_back(frame),
                Some(Command::Shutdown) | None => return false,
            },
        }
    }
}

async fn drive_connection(
    shared: &Shared,
    config: &SessionConfig,
    stream: TcpStream,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    pending: &mut VecDeque<String>,
) -> Disconnect {
    let (reader, mut writer) = stream.into_split();
    let mut frames = FrameReader::new(BufReader::new(reader), MAX_FRAME_SIZE);

    while let Some(frame) = pending.pop_front() {
        if let Err(e) = write_frame(shared, &mut writer, &frame).await {
            log::warn!("Failed to flush queued frame: {}", e);
            pending.push_front(frame);
            return Disconnect::Lost;
        }
    }

    let mut ping_timer = tokio::time::interval(config.ping_interval);
    ping_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            frame = frames.next_frame() => match frame {
                Ok(Some(Frame::Text(text))) => shared.receive_frame(&text),
                Ok(Some(bad)) => shared.drop_frame(&bad),
                Ok(None) => return Disconnect::Lost,
                Err(e) => {
                    log::warn!("Relay read error: {}", e);
                    return Disconnect::Lost;
                }
            },
            command = commands.recv() => match command {
                Some(Command::Send(frame)) => {
                    if let Err(e) = write_frame(shared, &mut writer, &frame).await {
                        log::warn!("Relay write error: {}", e);
                        pending.push_back(frame);
                        return Disconnect::Lost;
                    }
                }
                Some(Command::Shutdown) | None => {
                    let _ = writer.shutdown().await;
                    return Disconnect::Shutdown;
                }
            },
            _ = ping_timer.tick() => {
                let ping = lock(&shared.clock).ping_event(shared.local.now_ms());
                match ping.serialize() {
                    Ok(frame) => {
                        if let Err(e) = write_frame(shared, &mut writer, &frame).await {
                            log::warn!("Failed to send ping: {}", e);
                            return Disconnect::Lost;
                        }
                    }
                    Err(e) => log::warn!("Failed to serialize ping: {}", e),
                }
            }
        }
    }
}

async fn write_frame(shared: &Shared, writer: &mut OwnedWriteHalf, frame: &str) -> io::Result<()> {
    let mut line = String::with_capacity(frame.len() + 1);
    line.push_str(frame);
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;

    let mut stats = lock(&shared.stats);
    stats.frames_sent += 1;
    stats.bytes_sent += line.len() as u64;
    Ok(())
}
