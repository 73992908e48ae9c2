//! Fixed court layout and random obstacle generation

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::geometry::{Point, Rect};
use super::Camp;

/// The full court area
pub const COURT: Rect = Rect::new(Point::new(0, 0), Point::new(254, 254));

/// The inner court area
pub const INNER_COURT: Rect = Rect::new(Point::new(40, 40), Point::new(214, 214));

/// The fixed walls framing the inner court, two per side with a gate
/// between them.
pub const WALLS: [Rect; 8] = [
    // Top
    Rect::new(Point::new(38, 38), Point::new(107, 40)),
    Rect::new(Point::new(147, 38), Point::new(216, 40)),
    // Bottom
    Rect::new(Point::new(38, 214), Point::new(107, 216)),
    Rect::new(Point::new(147, 214), Point::new(216, 216)),
    // Left
    Rect::new(Point::new(38, 38), Point::new(40, 107)),
    Rect::new(Point::new(38, 147), Point::new(40, 216)),
    // Right
    Rect::new(Point::new(214, 38), Point::new(216, 107)),
    Rect::new(Point::new(214, 147), Point::new(216, 216)),
];

/// Number of randomly generated obstacles per match
pub const OBSTACLE_COUNT: usize = 5;

/// Side length range of a generated obstacle
pub const OBSTACLE_SIDE_RANGE: (i32, i32) = (10, 170);

/// Area range of a generated obstacle
pub const OBSTACLE_AREA_RANGE: (i32, i32) = (250, 2500);

/// Placement attempts per obstacle before generation is declared failed
const MAX_PLACEMENT_ATTEMPTS: u32 = 10_000;

/// Court generation errors
#[derive(Debug, thiserror::Error)]
pub enum CourtError {
    #[error("no obstacle placement satisfied the constraints after {attempts} attempts")]
    PlacementExhausted { attempts: u32 },
}

/// Generate the match obstacles by rejection sampling: draw a side pair,
/// reject on area, then place fully inside the inner court.
///
/// Obstacles are generated once per match and shared by all four
/// camp/stage runs. Obstacle-obstacle overlap is allowed.
pub fn generate_obstacles(rng: &mut ChaCha8Rng) -> Result<Vec<Rect>, CourtError> {
    let mut obstacles = Vec::with_capacity(OBSTACLE_COUNT);

    for _ in 0..OBSTACLE_COUNT {
        let mut placed = false;

        for _ in 0..MAX_PLACEMENT_ATTEMPTS {
            let width = rng.gen_range(OBSTACLE_SIDE_RANGE.0..OBSTACLE_SIDE_RANGE.1);
            let height = rng.gen_range(OBSTACLE_SIDE_RANGE.0..OBSTACLE_SIDE_RANGE.1);

            let area = width * height;
            if area < OBSTACLE_AREA_RANGE.0 || area > OBSTACLE_AREA_RANGE.1 {
                continue;
            }

            let x = rng.gen_range(INNER_COURT.top_left.x..INNER_COURT.bottom_right.x - width);
            let y = rng.gen_range(INNER_COURT.top_left.y..INNER_COURT.bottom_right.y - height);

            obstacles.push(Rect::new(
                Point::new(x, y),
                Point::new(x + width, y + height),
            ));
            placed = true;
            break;
        }

        if !placed {
            return Err(CourtError::PlacementExhausted {
                attempts: MAX_PLACEMENT_ATTEMPTS,
            });
        }
    }

    Ok(obstacles)
}

/// A player-placed charging station with a circular influence scope
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChargingStation {
    pub camp: Camp,
    pub position: Point,
    pub influence_radius: f64,
}

impl ChargingStation {
    pub fn new(camp: Camp, position: Point, influence_radius: f64) -> Self {
        Self {
            camp,
            position,
            influence_radius,
        }
    }

    /// Check whether a point lies inside the influence scope
    pub fn influences(&self, point: Point) -> bool {
        self.position.distance(point) <= self.influence_radius
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn obstacles_satisfy_placement_constraints() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let obstacles = generate_obstacles(&mut rng).unwrap();

        assert_eq!(obstacles.len(), OBSTACLE_COUNT);
        for obstacle in &obstacles {
            let area = obstacle.area();
            assert!(area >= OBSTACLE_AREA_RANGE.0 && area <= OBSTACLE_AREA_RANGE.1);
            assert!(INNER_COURT.contains(obstacle.top_left));
            assert!(INNER_COURT.contains(obstacle.bottom_right));
        }
    }

    #[test]
    fn obstacle_generation_is_deterministic_for_a_seed() {
        let mut a = ChaCha8Rng::seed_from_u64(42);
        let mut b = ChaCha8Rng::seed_from_u64(42);
        assert_eq!(
            generate_obstacles(&mut a).unwrap(),
            generate_obstacles(&mut b).unwrap()
        );
    }

    #[test]
    fn station_influence_is_circular() {
        let station = ChargingStation::new(Camp::A, Point::new(100, 100), 20.0);
        assert!(station.influences(Point::new(100, 120)));
        assert!(station.influences(Point::new(114, 114)));
        assert!(!station.influences(Point::new(100, 121)));
    }
}
