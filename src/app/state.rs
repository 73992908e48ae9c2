//! Application state shared across routes

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::config::Config;
use crate::game::{MatchEngine, MatchError, MatchRules};
use crate::ws::protocol::{MatchEvent, ServerMsg};

/// Shared application state.
///
/// The engine is not reentrant and holds no locking of its own; this
/// mutex is the external serialization its contract requires. The lock
/// is never held across an await point.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub engine: Arc<Mutex<MatchEngine>>,
    /// Fan-out channel for snapshots and events; every ws session
    /// subscribes.
    pub events: broadcast::Sender<ServerMsg>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, MatchError> {
        // A fixed seed reproduces the court layout and order schedules
        // for scrimmage replays.
        let seed = config.match_seed.unwrap_or_else(rand::random);
        let engine = MatchEngine::new(MatchRules::default(), seed)?;

        let (events, _) = broadcast::channel(256);

        Ok(Self {
            config: Arc::new(config),
            engine: Arc::new(Mutex::new(engine)),
            events,
        })
    }

    /// Broadcast engine events to every connected session
    pub fn broadcast_events(&self, events: Vec<MatchEvent>) {
        if !events.is_empty() {
            let _ = self.events.send(ServerMsg::Events { events });
        }
    }

    /// Broadcast a fresh snapshot, bypassing the tick cadence
    pub fn broadcast_snapshot(&self, now: i64) {
        let snapshot = self.engine.lock().snapshot(now);
        let _ = self.events.send(ServerMsg::Snapshot { snapshot });
    }
}
