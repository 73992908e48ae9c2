//! Delivery Referee Server - authoritative match referee
//!
//! This is the main entry point for the referee server. It owns:
//! - the match engine and its steady tick loop
//! - WebSocket connections for the tracker and operator console
//! - HTTP endpoints for snapshots and controller frames

mod app;
mod config;
mod game;
mod http;
mod link;
mod util;
mod ws;

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::AppState;
use crate::config::Config;
use crate::game::snapshot::SnapshotBuilder;
use crate::http::build_router;
use crate::util::time::{
    init_server_time, unix_millis, Timer, SIMULATION_TPS, SNAPSHOT_TPS, TICK_MS,
};
use crate::ws::protocol::MatchEvent;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level);

    // Initialize server time tracking
    init_server_time();

    info!("Starting Delivery Referee Server");
    info!("Server address: {}", config.server_addr);

    // Create application state (generates the court)
    let state = AppState::new(config.clone())?;

    // Spawn the referee tick loop
    let tick_state = state.clone();
    tokio::spawn(async move {
        run_tick_loop(tick_state).await;
    });

    // Build router
    let router = build_router(state);

    // Start server
    let addr: SocketAddr = config.server_addr;
    let listener = TcpListener::bind(addr).await?;

    info!("Server listening on {}", addr);
    info!("Health check: http://{}/health", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Drive the engine at a steady cadence. This task is the only caller
/// of refresh; every other entry point goes through the same mutex.
async fn run_tick_loop(state: AppState) {
    let mut tick_interval = tokio::time::interval(Duration::from_millis(TICK_MS));
    tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut snapshots = SnapshotBuilder::new(SIMULATION_TPS / SNAPSHOT_TPS);

    loop {
        tick_interval.tick().await;
        let timer = Timer::new();
        let now = unix_millis();

        let (events, snapshot) = {
            let mut engine = state.engine.lock();
            let events = match engine.refresh(now) {
                Ok(events) => events,
                Err(e) => {
                    // A refresh failure is a driver bug, not a runtime
                    // condition; stop refereeing rather than corrupt state.
                    error!(error = %e, "tick refresh failed, stopping the referee loop");
                    break;
                }
            };

            if events
                .iter()
                .any(|event| matches!(event, MatchEvent::TimeExpired))
            {
                snapshots.force_next();
            }

            let snapshot = snapshots
                .should_send()
                .then(|| snapshots.build(&engine, now));
            (events, snapshot)
        };

        state.broadcast_events(events);
        if let Some(message) = snapshot {
            let _ = state.events.send(message);
        }

        if timer.elapsed_ms() > TICK_MS {
            warn!(
                elapsed_ms = timer.elapsed_ms(),
                "tick processing exceeded the tick budget"
            );
        }
    }
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
