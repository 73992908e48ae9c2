//! Read-only snapshot building and broadcast cadence

use crate::ws::protocol::{MatchSnapshot, OrderView, ServerMsg, VehicleView};

use super::r#match::MatchEngine;
use super::vehicle::Vehicle;
use super::{Camp, PerCamp};

impl MatchEngine {
    /// Build a read-only view of the observable match state
    pub fn snapshot(&self, now: i64) -> MatchSnapshot {
        let vehicles = match (self.vehicle(Camp::A), self.vehicle(Camp::B)) {
            (Some(a), Some(b)) => Some(PerCamp::new(vehicle_view(a), vehicle_view(b))),
            _ => None,
        };

        MatchSnapshot {
            stage: self.stage(),
            status: self.status(),
            camp: self.camp(),
            game_time_ms: self.game_time(now),
            remaining_time_ms: self.remaining_time(now),
            score: self.scores(),
            vehicles,
            obstacles: self.obstacles().to_vec(),
            charging_stations: self.charging_stations().to_vec(),
            orders: self
                .orders()
                .iter()
                .map(|order| OrderView {
                    id: order.id(),
                    departure: order.departure(),
                    destination: order.destination(),
                    generated_at_ms: order.generated_at(),
                    time_limit_ms: order.time_limit_ms(),
                    commission: order.commission(),
                    status: order.status(),
                    taken_at_ms: order.taken_at(),
                    delivered_at_ms: order.delivered_at(),
                })
                .collect(),
        }
    }
}

fn vehicle_view(vehicle: &Vehicle) -> VehicleView {
    VehicleView {
        position: vehicle.position(),
        remaining_power: vehicle.remaining_power(),
        power_ratio: vehicle.power_ratio(),
    }
}

/// Paces snapshot broadcasts to a divisor of the tick rate
pub struct SnapshotBuilder {
    /// Tick counter since last snapshot
    ticks_since_snapshot: u32,
    /// Snapshot interval in ticks
    snapshot_interval: u32,
}

impl SnapshotBuilder {
    pub fn new(snapshot_interval: u32) -> Self {
        Self {
            ticks_since_snapshot: 0,
            snapshot_interval,
        }
    }

    /// Check if it's time to send a snapshot
    pub fn should_send(&mut self) -> bool {
        self.ticks_since_snapshot += 1;
        if self.ticks_since_snapshot >= self.snapshot_interval {
            self.ticks_since_snapshot = 0;
            true
        } else {
            false
        }
    }

    /// Force a snapshot on the next check (used after control commands)
    pub fn force_next(&mut self) {
        self.ticks_since_snapshot = self.snapshot_interval;
    }

    /// Build a snapshot message
    pub fn build(&self, engine: &MatchEngine, now: i64) -> ServerMsg {
        ServerMsg::Snapshot {
            snapshot: engine.snapshot(now),
        }
    }
}
