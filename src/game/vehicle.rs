//! Vehicle power budget and parking detection

use super::geometry::Point;
use super::Camp;

/// Position change below this distance is treated as tracker noise and
/// does not reset the parking clock.
const MOVEMENT_NOISE_THRESHOLD: f64 = 1.0;

/// Per-camp vehicle state (authoritative).
///
/// The position is owned by the external tracker; every report overwrites
/// the previous value. The power budget is an abstract travel allowance
/// consumed inside obstacles and opponent stations and regenerated by own
/// stations or auto-recharge.
#[derive(Debug, Clone)]
pub struct Vehicle {
    pub camp: Camp,
    position: Option<Point>,
    initial_power: i64,
    remaining_power: i64,
    last_moved_at: Option<i64>,
}

impl Vehicle {
    pub fn new(camp: Camp, initial_power: i64) -> Self {
        Self {
            camp,
            position: None,
            initial_power,
            remaining_power: initial_power,
            last_moved_at: None,
        }
    }

    /// Record an authoritative position report from the tracker
    pub fn report_position(&mut self, position: Point, now: i64) {
        let moved = match self.position {
            Some(previous) => previous.distance(position) > MOVEMENT_NOISE_THRESHOLD,
            None => true,
        };

        self.position = Some(position);
        if moved {
            self.last_moved_at = Some(now);
        }
    }

    pub fn position(&self) -> Option<Point> {
        self.position
    }

    /// Elapsed time since the last position update that exceeded the
    /// movement-noise threshold. None until a position is known.
    pub fn parking_duration(&self, now: i64) -> Option<i64> {
        self.last_moved_at.map(|at| now - at)
    }

    /// Apply a signed power delta; discharge is negative. The budget is
    /// floored at zero and never silently capped above the initial value.
    pub fn adjust_power(&mut self, delta: i64) {
        self.remaining_power = (self.remaining_power + delta).max(0);
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining_power == 0
    }

    pub fn remaining_power(&self) -> i64 {
        self.remaining_power
    }

    /// Remaining fraction of the initial budget, for telemetry only
    pub fn power_ratio(&self) -> f64 {
        if self.initial_power == 0 {
            return 0.0;
        }
        self.remaining_power as f64 / self.initial_power as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_floors_at_zero() {
        let mut vehicle = Vehicle::new(Camp::A, 100);
        vehicle.adjust_power(-30);
        assert_eq!(vehicle.remaining_power(), 70);
        assert!(!vehicle.is_exhausted());

        vehicle.adjust_power(-500);
        assert_eq!(vehicle.remaining_power(), 0);
        assert!(vehicle.is_exhausted());
    }

    #[test]
    fn charging_may_exceed_the_initial_budget() {
        let mut vehicle = Vehicle::new(Camp::B, 100);
        vehicle.adjust_power(50);
        assert_eq!(vehicle.remaining_power(), 150);
        assert!((vehicle.power_ratio() - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn parking_clock_resets_on_meaningful_movement() {
        let mut vehicle = Vehicle::new(Camp::A, 100);
        assert_eq!(vehicle.parking_duration(1_000), None);

        vehicle.report_position(Point::new(50, 50), 1_000);
        assert_eq!(vehicle.parking_duration(4_000), Some(3_000));

        vehicle.report_position(Point::new(80, 50), 4_000);
        assert_eq!(vehicle.parking_duration(4_500), Some(500));
    }

    #[test]
    fn noise_level_movement_does_not_reset_the_clock() {
        let mut vehicle = Vehicle::new(Camp::A, 100);
        vehicle.report_position(Point::new(50, 50), 1_000);
        vehicle.report_position(Point::new(51, 50), 2_000);
        assert_eq!(vehicle.position(), Some(Point::new(51, 50)));
        assert_eq!(vehicle.parking_duration(6_000), Some(5_000));
    }
}
