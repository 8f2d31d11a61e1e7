use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use super::config::RelayConfig;
use super::events::{DisconnectReason, RelayEvent};
use super::peers::{PeerMessage, PeerRegistry};
use crate::net::{
    EventBody, EventRegistry, Frame, FrameReader, LocalClock, MAX_FRAME_SIZE, answer_ping, lock,
};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Everything a peer task needs, cloned once per connection.
#[derive(Clone)]
struct RelayContext {
    peers: Arc<Mutex<PeerRegistry>>,
    clock: LocalClock,
    events: mpsc::UnboundedSender<RelayEvent>,
}

impl RelayContext {
    fn emit(&self, event: RelayEvent) {
        let _ = self.events.send(event);
    }
}

/// Fan-out relay. Holds no entity state: every valid frame from one peer is
/// forwarded verbatim to all others, and pings are answered from the
/// relay's own clock.
pub struct RelayServer {
    listener: TcpListener,
    config: RelayConfig,
    context: RelayContext,
}

impl RelayServer {
    pub async fn bind(config: RelayConfig) -> io::Result<(Self, mpsc::UnboundedReceiver<RelayEvent>)> {
        let listener = TcpListener::bind(config.bind_addr()).await?;
        let (events, receiver) = mpsc::unbounded_channel();
        let context = RelayContext {
            peers: Arc::new(Mutex::new(PeerRegistry::new(config.max_peers))),
            clock: LocalClock::new(),
            events,
        };

        Ok((
            Self {
                listener,
                config,
                context,
            },
            receiver,
        ))
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn peer_count(&self) -> usize {
        lock(&self.context.peers).count()
    }

    /// Accepts peers until `shutdown` resolves, then closes every peer
    /// socket and waits briefly for the writers to finish.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => self.admit(stream, addr, &mut tasks),
                    Err(e) => {
                        self.context.emit(RelayEvent::Error {
                            message: format!("Accept failed: {}", e),
                        });
                    }
                },
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        let closing = lock(&self.context.peers).close_all();
        log::info!("Closing {} peer connections", closing);

        let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            log::warn!("{} peers did not close in time", tasks.len());
            tasks.shutdown().await;
        }
    }

    fn admit(&self, stream: TcpStream, addr: SocketAddr, tasks: &mut JoinSet<()>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let registered = lock(&self.context.peers).register(addr, sender.clone());
        let peer_id = match registered {
            Ok(peer_id) => peer_id,
            Err(reason) => {
                log::debug!("Rejected {}: {}", addr, reason);
                self.context.emit(RelayEvent::PeerRejected {
                    addr,
                    reason: reason.to_string(),
                });
                return;
            }
        };

        log::debug!("Peer {} connected from {}", peer_id, addr);
        self.context.emit(RelayEvent::PeerConnected { peer_id, addr });
        tasks.spawn(serve_peer(
            peer_id,
            stream,
            sender,
            receiver,
            self.context.clone(),
        ));
    }
}

async fn serve_peer(
    peer_id: u32,
    stream: TcpStream,
    sender: mpsc::UnboundedSender<PeerMessage>,
    receiver: mpsc::UnboundedReceiver<PeerMessage>,
    context: RelayContext,
) {
    let _ = stream.set_nodelay(true);
    let (reader, writer) = stream.into_split();
    let writer_task = tokio::spawn(write_peer(writer, receiver));

    let mut reason = read_peer(peer_id, reader, &sender, &context).await;

    {
        let mut peers = lock(&context.peers);
        if peers.is_closing() {
            reason = DisconnectReason::Shutdown;
        }
        peers.remove(peer_id);
    }
    let _ = sender.send(PeerMessage::Close);
    let _ = writer_task.await;

    log::debug!("Peer {} {}", peer_id, reason.as_str());
    context.emit(RelayEvent::PeerDisconnected { peer_id, reason });
}

async fn read_peer(
    peer_id: u32,
    reader: OwnedReadHalf,
    own: &mpsc::UnboundedSender<PeerMessage>,
    context: &RelayContext,
) -> DisconnectReason {
    let mut frames = FrameReader::new(BufReader::new(reader), MAX_FRAME_SIZE);
    loop {
        match frames.next_frame().await {
            Ok(Some(Frame::Text(text))) => relay_frame(peer_id, &text, own, context),
            Ok(Some(Frame::Invalid)) => log::debug!("Peer {} sent a frame that is not UTF-8", peer_id),
            Ok(Some(Frame::Oversized)) => {
                log::warn!("Peer {} sent a frame over {} bytes", peer_id, MAX_FRAME_SIZE)
            }
            Ok(None) => return DisconnectReason::Closed,
            Err(e) => {
                log::warn!("Peer {} read error: {}", peer_id, e);
                return DisconnectReason::Error;
            }
        }
    }
}

fn relay_frame(
    peer_id: u32,
    text: &str,
    own: &mpsc::UnboundedSender<PeerMessage>,
    context: &RelayContext,
) {
    let Some(event) = EventRegistry::standard().parse(text) else {
        return;
    };

    match event.body {
        EventBody::Ping(ping) => {
            let pong = answer_ping(&ping, context.clock.now_ms());
            match pong.serialize() {
                Ok(frame) => {
                    let _ = own.send(PeerMessage::frame(&frame));
                }
                Err(e) => log::warn!("Failed to serialize pong: {}", e),
            }
        }
        EventBody::Pong(_) => log::debug!("Peer {} sent a pong, ignoring", peer_id),
        _ => {
            let delivered = lock(&context.peers).broadcast_except(peer_id, text);
            log::trace!("Peer {} frame forwarded to {} peers", peer_id, delivered);
        }
    }
}

async fn write_peer(mut writer: OwnedWriteHalf, mut receiver: mpsc::UnboundedReceiver<PeerMessage>) {
    while let Some(message) = receiver.recv().await {
        match message {
            PeerMessage::Frame(frame) => {
                if let Err(e) = writer.write_all(frame.as_bytes()).await {
                    log::debug!("Peer write failed: {}", e);
                    break;
                }
            }
            PeerMessage::Close => break,
        }
    }
    let _ = writer.shutdown().await;
}
