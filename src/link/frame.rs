//! Fixed-size binary frame payloads for the embedded vehicle controllers.
//!
//! The physical point-to-point link (framing, checksums, retransmission)
//! is owned by an external gateway; this module only produces validated
//! payloads. Counts and time values are checked against the wire format
//! before encoding and rejected on overflow, never truncated.

use bytes::{BufMut, Bytes, BytesMut};

use crate::game::geometry::Point;
use crate::game::order::OrderStatus;
use crate::game::{Camp, MatchStatus, Stage};
use crate::ws::protocol::{MatchSnapshot, OrderView};

/// Frame identifiers
pub const FRAME_GAME_INFO: u8 = 0x01;
pub const FRAME_STATUS: u8 = 0x02;

/// List counts on the wire are a single byte with the high bit reserved
pub const MAX_LIST_LEN: usize = 0x7f;

/// Wire format violations
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("{field} count {count} exceeds the one-byte limit of 127")]
    CountOverflow { field: &'static str, count: usize },

    #[error("{field} value {value} does not fit a 32-bit signed integer")]
    TimeOverflow { field: &'static str, value: i64 },

    #[error("{field} value {value} does not fit the wire format")]
    ValueOverflow { field: &'static str, value: i64 },

    #[error("coordinate {value} does not fit an unsigned byte")]
    CoordinateOverflow { value: i32 },

    #[error("a {0:?} run carries no duration")]
    MissingDuration(Stage),
}

fn check_count(field: &'static str, count: usize) -> Result<u8, FrameError> {
    if count > MAX_LIST_LEN {
        return Err(FrameError::CountOverflow { field, count });
    }
    Ok(count as u8)
}

fn check_time(field: &'static str, value: i64) -> Result<i32, FrameError> {
    i32::try_from(value).map_err(|_| FrameError::TimeOverflow { field, value })
}

fn put_point(buf: &mut BytesMut, point: Point) -> Result<(), FrameError> {
    let x = u8::try_from(point.x).map_err(|_| FrameError::CoordinateOverflow { value: point.x })?;
    let y = u8::try_from(point.y).map_err(|_| FrameError::CoordinateOverflow { value: point.y })?;
    buf.put_u8(x);
    buf.put_u8(y);
    Ok(())
}

fn stage_code(stage: Stage) -> u8 {
    match stage {
        Stage::PreMatch => 0,
        Stage::FirstHalf => 1,
        Stage::SecondHalf => 2,
    }
}

fn status_code(status: MatchStatus) -> u8 {
    match status {
        MatchStatus::Unstarted => 0,
        MatchStatus::Running => 1,
        MatchStatus::Paused => 2,
        MatchStatus::Ended => 3,
    }
}

fn put_order(buf: &mut BytesMut, order: &OrderView) -> Result<(), FrameError> {
    let id = u8::try_from(order.id).map_err(|_| FrameError::ValueOverflow {
        field: "order id",
        value: order.id as i64,
    })?;
    buf.put_u8(id);
    put_point(buf, order.departure)?;
    put_point(buf, order.destination)?;
    buf.put_i32_le(check_time("order time limit", order.time_limit_ms)?);
    buf.put_f32_le(order.commission as f32);
    Ok(())
}

/// Encode the game-information frame requested by a controller at run
/// start: stage, run duration, the obstacle layout, and the charging
/// stations split into own and opponent lists.
pub fn encode_game_info(snapshot: &MatchSnapshot, camp: Camp) -> Result<Bytes, FrameError> {
    let duration = snapshot
        .stage
        .duration_ms()
        .ok_or(FrameError::MissingDuration(snapshot.stage))?;

    let own: Vec<Point> = snapshot
        .charging_stations
        .iter()
        .filter(|station| station.camp == camp)
        .map(|station| station.position)
        .collect();
    let opponent: Vec<Point> = snapshot
        .charging_stations
        .iter()
        .filter(|station| station.camp != camp)
        .map(|station| station.position)
        .collect();

    let obstacle_count = check_count("obstacle", snapshot.obstacles.len())?;
    let own_count = check_count("own charging station", own.len())?;
    let opponent_count = check_count("opponent charging station", opponent.len())?;
    let duration = check_time("duration", duration)?;

    let mut buf = BytesMut::new();
    buf.put_u8(FRAME_GAME_INFO);
    buf.put_u8(stage_code(snapshot.stage));
    buf.put_i32_le(duration);

    buf.put_u8(obstacle_count);
    for obstacle in &snapshot.obstacles {
        put_point(&mut buf, obstacle.top_left)?;
        put_point(&mut buf, obstacle.bottom_right)?;
    }

    buf.put_u8(own_count);
    for position in own {
        put_point(&mut buf, position)?;
    }
    buf.put_u8(opponent_count);
    for position in opponent {
        put_point(&mut buf, position)?;
    }

    Ok(buf.freeze())
}

/// Encode the periodic status frame: match status, elapsed game time,
/// the camp's score and vehicle telemetry, the in-delivery orders, and
/// the latest pending order.
pub fn encode_status(snapshot: &MatchSnapshot, camp: Camp) -> Result<Bytes, FrameError> {
    let game_time = check_time("game time", snapshot.game_time_ms.unwrap_or(0))?;

    let vehicle = snapshot.vehicles.as_ref().map(|vehicles| vehicles[camp]);
    let position = vehicle
        .and_then(|v| v.position)
        .unwrap_or(Point::new(0, 0));
    let power = vehicle.map(|v| v.remaining_power).unwrap_or(0);
    let power = i32::try_from(power).map_err(|_| FrameError::ValueOverflow {
        field: "remaining power",
        value: power,
    })?;

    let in_delivery: Vec<&OrderView> = snapshot
        .orders
        .iter()
        .filter(|order| order.status == OrderStatus::InDelivery)
        .collect();
    let in_delivery_count = check_count("in-delivery order", in_delivery.len())?;

    let latest_pending = snapshot
        .orders
        .iter()
        .rev()
        .find(|order| order.status == OrderStatus::Pending);

    let mut buf = BytesMut::new();
    buf.put_u8(FRAME_STATUS);
    buf.put_u8(status_code(snapshot.status));
    buf.put_i32_le(game_time);
    buf.put_f32_le(snapshot.score[camp] as f32);
    put_point(&mut buf, position)?;
    buf.put_i32_le(power);

    buf.put_u8(in_delivery_count);
    for order in in_delivery {
        put_order(&mut buf, order)?;
    }

    match latest_pending {
        Some(order) => {
            buf.put_u8(1);
            put_order(&mut buf, order)?;
        }
        None => buf.put_u8(0),
    }

    Ok(buf.freeze())
}
