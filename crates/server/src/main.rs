use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;

use driftnet::{RelayConfig, RelayEvent, RelayServer};

#[derive(Parser)]
#[command(name = "driftnet-relay")]
#[command(about = "Driftnet relay: forwards every peer's events to all other peers")]
struct Args {
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    #[arg(short, long, default_value_t = driftnet::DEFAULT_PORT)]
    port: u16,

    #[arg(short, long, default_value_t = 32)]
    max_peers: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = RelayConfig {
        bind: args.bind,
        port: args.port,
        max_peers: args.max_peers,
    };

    let bind_addr = config.bind_addr();
    let (server, events) = RelayServer::bind(config)
        .await
        .with_context(|| format!("Failed to bind relay on {}", bind_addr))?;
    log::info!(
        "Relay listening on {} (max {} peers)",
        server.local_addr()?,
        server.config().max_peers
    );

    let reporter = tokio::spawn(report_events(events));
    server.run_until(shutdown_signal()).await;
    let _ = reporter.await;

    log::info!("Relay stopped");
    Ok(())
}

async fn report_events(mut events: mpsc::UnboundedReceiver<RelayEvent>) {
    let mut online = 0usize;
    while let Some(event) = events.recv().await {
        match event {
            RelayEvent::PeerConnected { peer_id, addr } => {
                online += 1;
                log::info!("Peer {} connected from {} ({} online)", peer_id, addr, online);
            }
            RelayEvent::PeerDisconnected { peer_id, reason } => {
                online = online.saturating_sub(1);
                log::info!("Peer {} {} ({} online)", peer_id, reason.as_str(), online);
            }
            RelayEvent::PeerRejected { addr, reason } => {
                log::warn!("Connection denied to {}: {}", addr, reason);
            }
            RelayEvent::Error { message } => {
                log::error!("{}", message);
            }
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => log::info!("Ctrl-C received, shutting down"),
        _ = terminate => log::info!("SIGTERM received, shutting down"),
    }
}
