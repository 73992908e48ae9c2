//! Match state machine and the authoritative per-tick rules

use std::sync::Arc;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ws::protocol::MatchEvent;

use super::court::{self, ChargingStation, CourtError};
use super::geometry::{Point, Rect};
use super::order::{
    Order, OrderFeed, OrderSchedule, OrderStateError, OrderStatus, ScheduleError, ScheduleParams,
};
use super::vehicle::Vehicle;
use super::{Camp, ForcedOrderAction, PerCamp};

/// Match stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Before the first half; runs cannot start here
    PreMatch,
    FirstHalf,
    SecondHalf,
}

impl Stage {
    /// Run duration for a timed stage
    pub fn duration_ms(self) -> Option<i64> {
        match self {
            Stage::PreMatch => None,
            Stage::FirstHalf => Some(60_000),
            Stage::SecondHalf => Some(180_000),
        }
    }

    /// Scheduled order count for a timed stage
    pub fn order_count(self) -> Option<usize> {
        match self {
            Stage::PreMatch => None,
            Stage::FirstHalf => Some(10),
            Stage::SecondHalf => Some(60),
        }
    }
}

/// Match status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Unstarted,
    Running,
    Paused,
    Ended,
}

/// Scoring and power tunables. Rates are per millisecond of tick
/// duration.
#[derive(Debug, Clone)]
pub struct MatchRules {
    /// The camp scheduled to run first in each stage; its start freezes
    /// the stage's order schedule, the other camp replays it.
    pub first_runner: Camp,

    pub score_inner_court_entry: f64,
    pub delivery_overtime_rate: f64,
    pub wall_contact_rate: f64,
    pub parking_overtime_rate: f64,
    pub parking_grace_ms: i64,
    pub score_place_station: f64,
    pub score_foul: f64,

    pub obstacle_discharge_rate: f64,
    pub station_charge_rate: f64,
    pub station_discharge_rate: f64,
    pub station_influence_radius: f64,
    pub station_max_per_camp: usize,

    pub order_contact_radius: f64,
    pub forced_contact_radius: f64,
    pub delivery_capacity: usize,
    pub order_time_limit_range_ms: (i64, i64),
    pub commission_range: (f64, f64),

    pub initial_power: i64,
    pub auto_recharge_rate: f64,
    pub auto_recharge_step_ms: i64,
}

impl Default for MatchRules {
    fn default() -> Self {
        Self {
            first_runner: Camp::A,
            score_inner_court_entry: 10.0,
            delivery_overtime_rate: -0.005,
            wall_contact_rate: -0.01,
            parking_overtime_rate: -0.005,
            parking_grace_ms: 5_000,
            score_place_station: 5.0,
            score_foul: -50.0,
            obstacle_discharge_rate: -0.1,
            station_charge_rate: 1.0,
            station_discharge_rate: -0.1,
            station_influence_radius: 20.0,
            station_max_per_camp: 3,
            order_contact_radius: 8.0,
            forced_contact_radius: 16.0,
            delivery_capacity: 5,
            order_time_limit_range_ms: (20_000, 60_000),
            commission_range: (10.0, 50.0),
            initial_power: 4_000,
            auto_recharge_rate: 0.02,
            auto_recharge_step_ms: 5_000,
        }
    }
}

/// Contract violations and fatal configuration failures. These surface
/// driver bugs, not runtime conditions; callers must not retry them.
#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    #[error("cannot start while the match is {0:?}")]
    AlreadyStarted(MatchStatus),

    #[error("a run cannot start in the pre-match stage")]
    PreMatchStage,

    #[error("the {0:?} schedule is not frozen; the first runner has not started that stage")]
    ScheduleNotFrozen(Stage),

    #[error("cannot pause while the match is {0:?}")]
    NotRunning(MatchStatus),

    #[error("cannot resume while the match is {0:?}")]
    NotPaused(MatchStatus),

    #[error("cannot end while the match is {0:?}")]
    NotInProgress(MatchStatus),

    #[error("no active camp while the match is running")]
    NoActiveCamp,

    #[error("the match clock has not been started")]
    ClockNotStarted,

    #[error(transparent)]
    Court(#[from] CourtError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error(transparent)]
    OrderState(#[from] OrderStateError),
}

/// The schedule frozen by a stage's first run
#[derive(Debug)]
struct FrozenSchedule {
    stage: Stage,
    schedule: Arc<OrderSchedule>,
}

/// Previous-tick zone membership, used to emit state-change events.
/// Cleared on every start.
#[derive(Debug, Default, Clone, Copy)]
struct ContactState {
    obstacle: bool,
    charging: bool,
    discharging: bool,
    parking: bool,
}

/// The authoritative match engine.
///
/// Owns the court, the score ledger, the order feed, and both vehicles.
/// All entry points must be externally serialized; the engine holds no
/// locking of its own. Each tick reads a single caller-supplied instant
/// and derives every time-based quantity from it.
pub struct MatchEngine {
    rules: MatchRules,
    rng: ChaCha8Rng,

    obstacles: Vec<Rect>,
    /// Accumulates across the whole match; a camp's stations persist
    /// into later runs and affect the opposing camp.
    stations: Vec<ChargingStation>,

    camp: Option<Camp>,
    stage: Stage,
    status: MatchStatus,
    run_id: Option<Uuid>,

    start_time: Option<i64>,
    pause_time: Option<i64>,
    last_tick_time: Option<i64>,
    last_tick_duration: i64,

    score: PerCamp<f64>,
    vehicles: Option<PerCamp<Vehicle>>,
    orders: Vec<Order>,
    frozen: Option<FrozenSchedule>,
    feed: Option<OrderFeed>,

    entered_inner_court: bool,
    contact: ContactState,
}

impl MatchEngine {
    /// Construct an engine for one match. Obstacles are generated here,
    /// once, and shared by all four camp/stage runs.
    pub fn new(rules: MatchRules, seed: u64) -> Result<Self, MatchError> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let obstacles = court::generate_obstacles(&mut rng)?;
        info!(seed, obstacle_count = obstacles.len(), "court generated");

        Ok(Self {
            rules,
            rng,
            obstacles,
            stations: Vec::new(),
            camp: None,
            stage: Stage::PreMatch,
            status: MatchStatus::Unstarted,
            run_id: None,
            start_time: None,
            pause_time: None,
            last_tick_time: None,
            last_tick_duration: 0,
            score: PerCamp::default(),
            vehicles: None,
            orders: Vec::new(),
            frozen: None,
            feed: None,
            entered_inner_court: false,
            contact: ContactState::default(),
        })
    }

    /// Start a camp/stage run. Valid only from Unstarted or Ended.
    pub fn start(&mut self, camp: Camp, stage: Stage, now: i64) -> Result<(), MatchError> {
        if self.status != MatchStatus::Unstarted && self.status != MatchStatus::Ended {
            return Err(MatchError::AlreadyStarted(self.status));
        }

        let (duration_ms, order_count) = match (stage.duration_ms(), stage.order_count()) {
            (Some(duration), Some(count)) => (duration, count),
            _ => return Err(MatchError::PreMatchStage),
        };

        let schedule = if camp == self.rules.first_runner {
            let params = ScheduleParams {
                count: order_count,
                area: court::COURT,
                generation_window_ms: (0, duration_ms),
                time_limit_range_ms: self.rules.order_time_limit_range_ms,
                commission_range: self.rules.commission_range,
            };
            let schedule = Arc::new(OrderSchedule::freeze(
                &params,
                &self.obstacles,
                &mut self.rng,
            )?);
            self.frozen = Some(FrozenSchedule {
                stage,
                schedule: Arc::clone(&schedule),
            });
            schedule
        } else {
            match &self.frozen {
                Some(frozen) if frozen.stage == stage => Arc::clone(&frozen.schedule),
                _ => return Err(MatchError::ScheduleNotFrozen(stage)),
            }
        };

        let run_id = Uuid::new_v4();
        self.camp = Some(camp);
        self.stage = stage;
        self.status = MatchStatus::Running;
        self.run_id = Some(run_id);
        self.start_time = Some(now);
        self.pause_time = None;
        self.vehicles = Some(PerCamp::new(
            Vehicle::new(Camp::A, self.rules.initial_power),
            Vehicle::new(Camp::B, self.rules.initial_power),
        ));
        self.orders.clear();
        self.feed = Some(OrderFeed::new(schedule));
        self.entered_inner_court = false;
        self.contact = ContactState::default();

        info!(
            run_id = %run_id,
            ?camp,
            ?stage,
            scheduled_orders = self
                .frozen
                .as_ref()
                .map(|frozen| frozen.schedule.len())
                .unwrap_or(0),
            "run started"
        );
        Ok(())
    }

    /// Pause the running match
    pub fn pause(&mut self, now: i64) -> Result<(), MatchError> {
        if self.status != MatchStatus::Running {
            return Err(MatchError::NotRunning(self.status));
        }
        self.status = MatchStatus::Paused;
        self.pause_time = Some(now);
        info!("run paused");
        Ok(())
    }

    /// Continue a paused match. The paused interval is excluded from
    /// elapsed game time by shifting the start time forward.
    pub fn resume(&mut self, now: i64) -> Result<(), MatchError> {
        if self.status != MatchStatus::Paused {
            return Err(MatchError::NotPaused(self.status));
        }
        let pause_time = self.pause_time.take().ok_or(MatchError::ClockNotStarted)?;
        if let Some(start) = self.start_time.as_mut() {
            *start += now - pause_time;
        }
        self.status = MatchStatus::Running;
        info!(paused_ms = now - pause_time, "run resumed");
        Ok(())
    }

    /// End the current run. Terminal for this camp/stage run; the engine
    /// is restartable from Ended for the next run.
    pub fn end(&mut self) -> Result<(), MatchError> {
        if self.status != MatchStatus::Running && self.status != MatchStatus::Paused {
            return Err(MatchError::NotInProgress(self.status));
        }
        self.status = MatchStatus::Ended;
        info!(
            run_id = ?self.run_id,
            score_a = self.score.a,
            score_b = self.score.b,
            "run ended"
        );
        Ok(())
    }

    /// Elapsed game time in milliseconds; None before the first start
    pub fn game_time(&self, now: i64) -> Option<i64> {
        self.start_time.map(|start| now - start)
    }

    /// Remaining run time, floored at zero; None outside a timed stage
    pub fn remaining_time(&self, now: i64) -> Option<i64> {
        let duration = self.stage.duration_ms()?;
        let elapsed = self.game_time(now)?;
        Some((duration - elapsed).max(0))
    }

    /// Advance the match by one tick. No-op unless Running.
    ///
    /// Reads the current instant exactly once; every rule below derives
    /// its time quantities from it. Rules apply to the active camp's
    /// vehicle in a fixed order, with order generation intentionally
    /// last so a freshly spawned order cannot be claimed within the tick
    /// it appears.
    pub fn refresh(&mut self, now: i64) -> Result<Vec<MatchEvent>, MatchError> {
        let dt = self.last_tick_time.map(|t| now - t).unwrap_or(0);
        self.last_tick_duration = dt;
        self.last_tick_time = Some(now);

        if self.status != MatchStatus::Running {
            return Ok(Vec::new());
        }

        let camp = self.camp.ok_or(MatchError::NoActiveCamp)?;
        let game_time = self.game_time(now).ok_or(MatchError::ClockNotStarted)?;
        let remaining = self.remaining_time(now).ok_or(MatchError::PreMatchStage)?;

        let mut events = Vec::new();

        if remaining <= 0 {
            self.end()?;
            events.push(MatchEvent::TimeExpired);
            return Ok(events);
        }

        self.scan_orders(
            camp,
            game_time,
            self.rules.order_contact_radius,
            None,
            &mut events,
        )?;
        self.score_movement(camp, now, dt, &mut events);
        self.score_wall_contact(camp, dt);
        self.apply_obstacles(camp, dt, &mut events);
        self.apply_charging_stations(camp, dt, &mut events);
        self.auto_recharge(camp, &mut events);
        self.release_orders(game_time, &mut events);

        Ok(events)
    }

    /// Record an authoritative tracker position report. Ignored before
    /// the first start, when no vehicles exist yet.
    pub fn report_position(&mut self, camp: Camp, position: Point, now: i64) {
        match self.vehicles.as_mut() {
            Some(vehicles) => vehicles[camp].report_position(position, now),
            None => debug!(?camp, "position report before the first start ignored"),
        }
    }

    /// Record a manual foul against the active camp. Immediate, not tied
    /// to a tick; skipped when no run has ever started.
    pub fn foul(&mut self) -> Option<MatchEvent> {
        let camp = self.camp?;
        self.score[camp] += self.rules.score_foul;
        warn!(?camp, "foul recorded");
        Some(MatchEvent::Foul { camp })
    }

    /// Place a charging station at the active vehicle's position.
    /// First half only, at most three per camp, and the vehicle position
    /// must be known; otherwise the command has no effect.
    pub fn place_charging_station(&mut self) -> Option<MatchEvent> {
        let camp = self.camp?;
        if self.stage != Stage::FirstHalf {
            return None;
        }
        let position = self.vehicles.as_ref().and_then(|v| v[camp].position())?;
        let owned = self.stations.iter().filter(|s| s.camp == camp).count();
        if owned >= self.rules.station_max_per_camp {
            return None;
        }

        self.stations.push(ChargingStation::new(
            camp,
            position,
            self.rules.station_influence_radius,
        ));
        self.score[camp] += self.rules.score_place_station;
        info!(?camp, x = position.x, y = position.y, "charging station placed");
        Some(MatchEvent::ChargingStationPlaced { camp, position })
    }

    /// Forced order contact: the larger radius and an explicit direction
    /// selector instead of the automatic both-direction scan.
    pub fn force_order(
        &mut self,
        action: ForcedOrderAction,
        now: i64,
    ) -> Result<Vec<MatchEvent>, MatchError> {
        let mut events = Vec::new();
        let (Some(camp), Some(game_time)) = (self.camp, self.game_time(now)) else {
            return Ok(events);
        };
        self.scan_orders(
            camp,
            game_time,
            self.rules.forced_contact_radius,
            Some(action),
            &mut events,
        )?;
        Ok(events)
    }

    pub fn status(&self) -> MatchStatus {
        self.status
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn camp(&self) -> Option<Camp> {
        self.camp
    }

    pub fn score(&self, camp: Camp) -> f64 {
        self.score[camp]
    }

    pub fn scores(&self) -> PerCamp<f64> {
        self.score
    }

    pub fn obstacles(&self) -> &[Rect] {
        &self.obstacles
    }

    pub fn charging_stations(&self) -> &[ChargingStation] {
        &self.stations
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn vehicle(&self, camp: Camp) -> Option<&Vehicle> {
        self.vehicles.as_ref().map(|vehicles| &vehicles[camp])
    }

    pub fn last_tick_duration(&self) -> i64 {
        self.last_tick_duration
    }

    /// Take orders at their departure and deliver orders at their
    /// destination within the contact radius. `only` restricts the scan
    /// to one direction (the forced variant); None scans both.
    fn scan_orders(
        &mut self,
        camp: Camp,
        game_time: i64,
        radius: f64,
        only: Option<ForcedOrderAction>,
        events: &mut Vec<MatchEvent>,
    ) -> Result<(), MatchError> {
        let Some(position) = self.vehicles.as_ref().and_then(|v| v[camp].position()) else {
            return Ok(());
        };

        let take_allowed = only != Some(ForcedOrderAction::Deliver);
        let deliver_allowed = only != Some(ForcedOrderAction::Take);
        let capacity = self.rules.delivery_capacity;
        let overtime_rate = self.rules.delivery_overtime_rate;

        let mut in_delivery = self
            .orders
            .iter()
            .filter(|order| order.status() == OrderStatus::InDelivery)
            .count();
        let mut score_delta = 0.0;

        for order in &mut self.orders {
            match order.status() {
                OrderStatus::Pending if take_allowed => {
                    if in_delivery >= capacity {
                        continue;
                    }
                    if order.departure().distance(position) <= radius {
                        order.take(game_time)?;
                        in_delivery += 1;
                        events.push(MatchEvent::OrderTaken { id: order.id() });
                    }
                }
                OrderStatus::InDelivery if deliver_allowed => {
                    if order.destination().distance(position) <= radius {
                        order.deliver(game_time)?;
                        let overtime = order.overtime().unwrap_or(0);
                        let score = delivery_score(overtime_rate, order.commission(), overtime);
                        score_delta += score;
                        events.push(MatchEvent::OrderDelivered {
                            id: order.id(),
                            score,
                        });
                    }
                }
                _ => {}
            }
        }

        self.score[camp] += score_delta;
        Ok(())
    }

    /// Inner-court entry bonus (one-shot per run) and the parking
    /// penalty with its one-tick hysteresis.
    fn score_movement(&mut self, camp: Camp, now: i64, dt: i64, events: &mut Vec<MatchEvent>) {
        let Some(vehicle) = self.vehicles.as_ref().map(|v| &v[camp]) else {
            return;
        };
        let Some(position) = vehicle.position() else {
            return;
        };

        if !self.entered_inner_court && court::INNER_COURT.contains(position) {
            self.entered_inner_court = true;
            self.score[camp] += self.rules.score_inner_court_entry;
            events.push(MatchEvent::MovedIntoInnerCourt);
        }

        let parked_over = vehicle
            .parking_duration(now)
            .map(|parked| parked >= self.rules.parking_grace_ms + dt)
            .unwrap_or(false);
        if parked_over {
            self.score[camp] += self.rules.parking_overtime_rate * dt as f64;
        }
        if parked_over != self.contact.parking {
            self.contact.parking = parked_over;
            events.push(if parked_over {
                MatchEvent::ParkingPenaltyStarted
            } else {
                MatchEvent::ParkingPenaltyStopped
            });
        }
    }

    fn score_wall_contact(&mut self, camp: Camp, dt: i64) {
        let Some(position) = self.vehicles.as_ref().and_then(|v| v[camp].position()) else {
            return;
        };
        if court::WALLS.iter().any(|wall| wall.contains(position)) {
            self.score[camp] += self.rules.wall_contact_rate * dt as f64;
        }
    }

    fn apply_obstacles(&mut self, camp: Camp, dt: i64, events: &mut Vec<MatchEvent>) {
        let Some(position) = self.vehicles.as_ref().and_then(|v| v[camp].position()) else {
            return;
        };

        let inside = self
            .obstacles
            .iter()
            .any(|obstacle| obstacle.contains(position));
        if inside {
            let delta = (self.rules.obstacle_discharge_rate * dt as f64).round() as i64;
            if let Some(vehicles) = self.vehicles.as_mut() {
                vehicles[camp].adjust_power(delta);
            }
        }
        if inside != self.contact.obstacle {
            self.contact.obstacle = inside;
            events.push(if inside {
                MatchEvent::ObstacleEntered
            } else {
                MatchEvent::ObstacleExited
            });
        }
    }

    /// Second half only. Own and opponent influence are evaluated
    /// independently every tick.
    fn apply_charging_stations(&mut self, camp: Camp, dt: i64, events: &mut Vec<MatchEvent>) {
        if self.stage != Stage::SecondHalf {
            return;
        }
        let Some(position) = self.vehicles.as_ref().and_then(|v| v[camp].position()) else {
            return;
        };

        let in_own = self
            .stations
            .iter()
            .any(|station| station.camp == camp && station.influences(position));
        let in_opponent = self
            .stations
            .iter()
            .any(|station| station.camp == camp.opponent() && station.influences(position));

        if in_own {
            let delta = (self.rules.station_charge_rate * dt as f64).round() as i64;
            if let Some(vehicles) = self.vehicles.as_mut() {
                vehicles[camp].adjust_power(delta);
            }
        }
        if in_own != self.contact.charging {
            self.contact.charging = in_own;
            events.push(if in_own {
                MatchEvent::ChargingStarted
            } else {
                MatchEvent::ChargingStopped
            });
        }

        if in_opponent {
            let delta = (self.rules.station_discharge_rate * dt as f64).round() as i64;
            if let Some(vehicles) = self.vehicles.as_mut() {
                vehicles[camp].adjust_power(delta);
            }
        }
        if in_opponent != self.contact.discharging {
            self.contact.discharging = in_opponent;
            events.push(if in_opponent {
                MatchEvent::DischargingStarted
            } else {
                MatchEvent::DischargingStopped
            });
        }
    }

    /// Exchange match time for power when the budget is exhausted
    fn auto_recharge(&mut self, camp: Camp, events: &mut Vec<MatchEvent>) {
        let step = self.rules.auto_recharge_step_ms;
        let power = (self.rules.auto_recharge_rate * step as f64).round() as i64;

        let Some(vehicle) = self.vehicles.as_mut().map(|v| &mut v[camp]) else {
            return;
        };
        if vehicle.position().is_none() || !vehicle.is_exhausted() {
            return;
        }

        if let Some(start) = self.start_time.as_mut() {
            *start -= step;
        }
        vehicle.adjust_power(power);
        events.push(MatchEvent::AutoRecharged {
            power,
            time_cost_ms: step,
        });
    }

    /// Release at most one due order. Runs after every other rule so a
    /// new order cannot be contacted in the tick it spawns.
    fn release_orders(&mut self, game_time: i64, events: &mut Vec<MatchEvent>) {
        let Some(feed) = self.feed.as_mut() else {
            return;
        };
        if let Some(order) = feed.next_due(game_time) {
            debug!(id = order.id(), released = feed.released(), "order released");
            events.push(MatchEvent::OrderSpawned { id: order.id() });
            self.orders.push(order);
        }
    }
}

/// Commission minus the overtime penalty, floored at zero
fn delivery_score(overtime_rate: f64, commission: f64, overtime_ms: i64) -> f64 {
    (commission + overtime_rate * overtime_ms as f64).max(0.0)
}

#[cfg(test)]
mod tests;
