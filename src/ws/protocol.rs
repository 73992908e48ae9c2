//! WebSocket protocol message definitions
//! These are the wire types exchanged with the tracker, the operator
//! console, and spectating overlays

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::court::ChargingStation;
use crate::game::geometry::{Point, Rect};
use crate::game::order::OrderStatus;
use crate::game::{Camp, ForcedOrderAction, MatchStatus, PerCamp, Stage};

/// Messages sent from clients to the referee
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Authoritative vehicle position report from the tracker
    Position {
        camp: Camp,
        x: i32,
        y: i32,
        /// Tracker timestamp in Unix milliseconds
        t: i64,
    },

    /// Start a camp/stage run
    Start { camp: Camp, stage: Stage },

    /// Pause the running match
    Pause,

    /// Continue a paused match
    Resume,

    /// End the current run
    End,

    /// Record a manual foul against the active camp
    Foul,

    /// Place a charging station at the active vehicle's position
    PlaceChargingStation,

    /// Forced order contact with an explicit direction selector
    ForceOrder { action: ForcedOrderAction },

    /// Ping for latency measurement
    Ping { t: i64 },
}

/// Messages sent from the referee to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Welcome message after connection
    Welcome { session_id: Uuid, server_time: i64 },

    /// Match state snapshot (sent at regular intervals)
    Snapshot { snapshot: MatchSnapshot },

    /// Events that occurred since the last broadcast
    Events { events: Vec<MatchEvent> },

    /// Error message
    Error { code: String, message: String },

    /// Pong response
    Pong { t: i64 },
}

/// Read-only view of the observable match state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchSnapshot {
    pub stage: Stage,
    pub status: MatchStatus,
    /// Active camp; None before the first start
    pub camp: Option<Camp>,
    /// Elapsed game time in milliseconds; None before the first start
    pub game_time_ms: Option<i64>,
    /// Remaining run time in milliseconds; None outside a timed stage
    pub remaining_time_ms: Option<i64>,
    /// Cumulative score ledger, both camps
    pub score: PerCamp<f64>,
    /// Vehicle telemetry; None before the first start
    pub vehicles: Option<PerCamp<VehicleView>>,
    pub obstacles: Vec<Rect>,
    pub charging_stations: Vec<ChargingStation>,
    pub orders: Vec<OrderView>,
}

/// Vehicle telemetry in a snapshot
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VehicleView {
    pub position: Option<Point>,
    pub remaining_power: i64,
    /// Remaining fraction of the initial power budget
    pub power_ratio: f64,
}

/// Order state in a snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderView {
    pub id: i32,
    pub departure: Point,
    pub destination: Point,
    pub generated_at_ms: i64,
    pub time_limit_ms: i64,
    pub commission: f64,
    pub status: OrderStatus,
    pub taken_at_ms: Option<i64>,
    pub delivered_at_ms: Option<i64>,
}

/// Discrete state-change events emitted by the engine for presentation
/// layers (sound, overlays). The engine itself holds no feedback state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum MatchEvent {
    /// A scheduled order was released
    OrderSpawned { id: i32 },

    /// An order moved into delivery
    OrderTaken { id: i32 },

    /// An order was delivered
    OrderDelivered { id: i32, score: f64 },

    /// First entry into the inner court this run
    MovedIntoInnerCourt,

    /// The parking penalty began/stopped accruing
    ParkingPenaltyStarted,
    ParkingPenaltyStopped,

    /// The vehicle entered/left an obstacle
    ObstacleEntered,
    ObstacleExited,

    /// The vehicle entered/left its own charging influence
    ChargingStarted,
    ChargingStopped,

    /// The vehicle entered/left an opponent's charging influence
    DischargingStarted,
    DischargingStopped,

    /// Exhausted power was traded for match time
    AutoRecharged { power: i64, time_cost_ms: i64 },

    /// A charging station was placed
    ChargingStationPlaced { camp: Camp, position: Point },

    /// A manual foul was recorded
    Foul { camp: Camp },

    /// The run clock ran out and the run ended
    TimeExpired,
}
