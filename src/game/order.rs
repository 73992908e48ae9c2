//! Delivery orders and the frozen, replayable order schedule

use std::sync::Arc;

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::geometry::{Point, Rect};

/// Order lifecycle status; transitions are strictly monotonic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    InDelivery,
    Delivered,
}

/// A single delivery task. All timestamps are in game-time milliseconds
/// and immutable once set.
#[derive(Debug, Clone)]
pub struct Order {
    id: i32,
    departure: Point,
    destination: Point,
    generated_at: i64,
    time_limit_ms: i64,
    commission: f64,
    status: OrderStatus,
    taken_at: Option<i64>,
    delivered_at: Option<i64>,
}

/// Contract violation: an order operation from the wrong state
#[derive(Debug, thiserror::Error)]
#[error("order {id} cannot {action} while {status:?}")]
pub struct OrderStateError {
    pub id: i32,
    pub action: &'static str,
    pub status: OrderStatus,
}

impl Order {
    pub fn new(
        id: i32,
        departure: Point,
        destination: Point,
        generated_at: i64,
        time_limit_ms: i64,
        commission: f64,
    ) -> Self {
        Self {
            id,
            departure,
            destination,
            generated_at,
            time_limit_ms,
            commission,
            status: OrderStatus::Pending,
            taken_at: None,
            delivered_at: None,
        }
    }

    /// Pick the order up. Valid only while Pending.
    pub fn take(&mut self, now: i64) -> Result<(), OrderStateError> {
        if self.status != OrderStatus::Pending {
            return Err(OrderStateError {
                id: self.id,
                action: "be taken",
                status: self.status,
            });
        }
        self.status = OrderStatus::InDelivery;
        self.taken_at = Some(now);
        Ok(())
    }

    /// Complete the delivery. Valid only while InDelivery.
    pub fn deliver(&mut self, now: i64) -> Result<(), OrderStateError> {
        if self.status != OrderStatus::InDelivery {
            return Err(OrderStateError {
                id: self.id,
                action: "be delivered",
                status: self.status,
            });
        }
        self.status = OrderStatus::Delivered;
        self.delivered_at = Some(now);
        Ok(())
    }

    /// Milliseconds the delivery ran past its time limit; zero when on
    /// time, None until delivered.
    pub fn overtime(&self) -> Option<i64> {
        match (self.taken_at, self.delivered_at) {
            (Some(taken), Some(delivered)) => {
                Some((delivered - taken - self.time_limit_ms).max(0))
            }
            _ => None,
        }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn departure(&self) -> Point {
        self.departure
    }

    pub fn destination(&self) -> Point {
        self.destination
    }

    pub fn generated_at(&self) -> i64 {
        self.generated_at
    }

    pub fn time_limit_ms(&self) -> i64 {
        self.time_limit_ms
    }

    pub fn commission(&self) -> f64 {
        self.commission
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn taken_at(&self) -> Option<i64> {
        self.taken_at
    }

    pub fn delivered_at(&self) -> Option<i64> {
        self.delivered_at
    }
}

/// Schedule generation errors
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("no order point cleared the obstacles after {attempts} attempts")]
    PointPlacement { attempts: u32 },
}

/// Parameters for freezing an order schedule
#[derive(Debug, Clone)]
pub struct ScheduleParams {
    pub count: usize,
    pub area: Rect,
    pub generation_window_ms: (i64, i64),
    pub time_limit_range_ms: (i64, i64),
    pub commission_range: (f64, f64),
}

#[derive(Debug, Clone)]
struct ScheduleEntry {
    departure: Point,
    destination: Point,
    generated_at: i64,
    time_limit_ms: i64,
    commission: f64,
}

/// An immutable order schedule, frozen once per stage by the stage's
/// first run and replayed verbatim by the second. Neither a departure
/// nor a destination point falls inside an obstacle; the fixed walls are
/// intentionally not consulted.
#[derive(Debug)]
pub struct OrderSchedule {
    entries: Vec<ScheduleEntry>,
}

const MAX_POINT_ATTEMPTS: u32 = 10_000;

impl OrderSchedule {
    /// Compute the complete schedule: release times sorted ascending,
    /// obstacle-clear endpoints, commissions and time limits drawn once.
    pub fn freeze(
        params: &ScheduleParams,
        obstacles: &[Rect],
        rng: &mut ChaCha8Rng,
    ) -> Result<Self, ScheduleError> {
        let mut times: Vec<i64> = (0..params.count)
            .map(|_| rng.gen_range(params.generation_window_ms.0..params.generation_window_ms.1))
            .collect();
        times.sort_unstable();

        let mut entries = Vec::with_capacity(params.count);
        for generated_at in times {
            let departure = sample_clear_point(params.area, obstacles, rng)?;
            let destination = sample_clear_point(params.area, obstacles, rng)?;
            entries.push(ScheduleEntry {
                departure,
                destination,
                generated_at,
                time_limit_ms: rng
                    .gen_range(params.time_limit_range_ms.0..params.time_limit_range_ms.1),
                commission: rng.gen_range(params.commission_range.0..params.commission_range.1),
            });
        }

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn sample_clear_point(
    area: Rect,
    obstacles: &[Rect],
    rng: &mut ChaCha8Rng,
) -> Result<Point, ScheduleError> {
    for _ in 0..MAX_POINT_ATTEMPTS {
        let point = Point::new(
            rng.gen_range(area.top_left.x..area.bottom_right.x),
            rng.gen_range(area.top_left.y..area.bottom_right.y),
        );
        if obstacles.iter().all(|obstacle| !obstacle.contains(point)) {
            return Ok(point);
        }
    }
    Err(ScheduleError::PointPlacement {
        attempts: MAX_POINT_ATTEMPTS,
    })
}

/// A run's private replay cursor over a frozen schedule.
///
/// Each run owns its own feed; the second runner of a stage gets a fresh
/// feed over the same schedule and therefore sees an identical sequence
/// of orders. This is the fairness mechanism.
#[derive(Debug)]
pub struct OrderFeed {
    schedule: Arc<OrderSchedule>,
    cursor: usize,
}

impl OrderFeed {
    pub fn new(schedule: Arc<OrderSchedule>) -> Self {
        Self {
            schedule,
            cursor: 0,
        }
    }

    /// Release the next scheduled order if its generation time has
    /// passed. Called once per tick; releases at most one order.
    pub fn next_due(&mut self, game_time: i64) -> Option<Order> {
        let entry = self.schedule.entries.get(self.cursor)?;
        if entry.generated_at > game_time {
            return None;
        }

        let order = Order::new(
            self.cursor as i32,
            entry.departure,
            entry.destination,
            entry.generated_at,
            entry.time_limit_ms,
            entry.commission,
        );
        self.cursor += 1;
        Some(order)
    }

    pub fn released(&self) -> usize {
        self.cursor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::court;
    use rand::SeedableRng;

    fn test_params() -> ScheduleParams {
        ScheduleParams {
            count: 10,
            area: court::COURT,
            generation_window_ms: (0, 60_000),
            time_limit_range_ms: (20_000, 60_000),
            commission_range: (10.0, 50.0),
        }
    }

    #[test]
    fn lifecycle_is_strictly_monotonic() {
        let mut order = Order::new(0, Point::new(1, 1), Point::new(9, 9), 0, 30_000, 25.0);
        assert_eq!(order.status(), OrderStatus::Pending);

        order.take(1_000).unwrap();
        assert_eq!(order.status(), OrderStatus::InDelivery);
        assert_eq!(order.taken_at(), Some(1_000));

        order.deliver(5_000).unwrap();
        assert_eq!(order.status(), OrderStatus::Delivered);
        assert_eq!(order.delivered_at(), Some(5_000));
    }

    #[test]
    fn wrong_state_operations_are_contract_violations() {
        let mut order = Order::new(3, Point::new(1, 1), Point::new(9, 9), 0, 30_000, 25.0);
        assert!(order.deliver(1_000).is_err());

        order.take(1_000).unwrap();
        assert!(order.take(2_000).is_err());

        order.deliver(3_000).unwrap();
        assert!(order.deliver(4_000).is_err());
        assert!(order.take(4_000).is_err());

        // Timestamps survived the rejected calls untouched.
        assert_eq!(order.taken_at(), Some(1_000));
        assert_eq!(order.delivered_at(), Some(3_000));
    }

    #[test]
    fn overtime_floors_at_zero() {
        let mut on_time = Order::new(0, Point::new(1, 1), Point::new(9, 9), 0, 30_000, 25.0);
        on_time.take(1_000).unwrap();
        on_time.deliver(21_000).unwrap();
        assert_eq!(on_time.overtime(), Some(0));

        let mut late = Order::new(1, Point::new(1, 1), Point::new(9, 9), 0, 30_000, 25.0);
        late.take(1_000).unwrap();
        late.deliver(33_000).unwrap();
        assert_eq!(late.overtime(), Some(2_000));
    }

    #[test]
    fn frozen_schedule_avoids_obstacles_and_sorts_times() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let obstacles = court::generate_obstacles(&mut rng).unwrap();
        let schedule = OrderSchedule::freeze(&test_params(), &obstacles, &mut rng).unwrap();

        assert_eq!(schedule.len(), 10);
        let mut previous = i64::MIN;
        for entry in &schedule.entries {
            assert!(entry.generated_at >= previous);
            previous = entry.generated_at;
            for obstacle in &obstacles {
                assert!(!obstacle.contains(entry.departure));
                assert!(!obstacle.contains(entry.destination));
            }
            assert!(entry.time_limit_ms >= 20_000 && entry.time_limit_ms < 60_000);
            assert!(entry.commission >= 10.0 && entry.commission < 50.0);
        }
    }

    #[test]
    fn feed_releases_in_time_order_one_per_tick() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let schedule =
            Arc::new(OrderSchedule::freeze(&test_params(), &[], &mut rng).unwrap());
        let first_due = schedule.entries[0].generated_at;

        let mut feed = OrderFeed::new(schedule);
        if first_due > 0 {
            assert!(feed.next_due(first_due - 1).is_none());
        }

        // Even with every order due, a single call releases one order.
        let released = feed.next_due(60_000).unwrap();
        assert_eq!(released.id(), 0);
        assert_eq!(feed.released(), 1);
        assert_eq!(feed.next_due(60_000).unwrap().id(), 1);
    }

    #[test]
    fn two_feeds_over_one_schedule_replay_identically() {
        let mut rng = ChaCha8Rng::seed_from_u64(23);
        let obstacles = court::generate_obstacles(&mut rng).unwrap();
        let schedule =
            Arc::new(OrderSchedule::freeze(&test_params(), &obstacles, &mut rng).unwrap());

        let mut first = OrderFeed::new(schedule.clone());
        let mut second = OrderFeed::new(schedule);

        for game_time in (0..60_000).step_by(100) {
            let a = first.next_due(game_time);
            let b = second.next_due(game_time);
            match (a, b) {
                (None, None) => {}
                (Some(a), Some(b)) => {
                    assert_eq!(a.id(), b.id());
                    assert_eq!(a.departure(), b.departure());
                    assert_eq!(a.destination(), b.destination());
                    assert_eq!(a.generated_at(), b.generated_at());
                    assert_eq!(a.time_limit_ms(), b.time_limit_ms());
                    assert!((a.commission() - b.commission()).abs() < f64::EPSILON);
                }
                _ => panic!("feeds diverged"),
            }
        }
        assert_eq!(first.released(), 10);
        assert_eq!(second.released(), 10);
    }
}
