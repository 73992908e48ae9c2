use super::*;

const T0: i64 = 1_700_000_000_000;

fn engine() -> MatchEngine {
    MatchEngine::new(MatchRules::default(), 99).unwrap()
}

fn engine_with(rules: MatchRules) -> MatchEngine {
    MatchEngine::new(rules, 99).unwrap()
}

/// Rules that keep the proximity scan from ever taking an order, so
/// zone-rule tests are independent of the random schedule.
fn no_take_rules() -> MatchRules {
    MatchRules {
        delivery_capacity: 0,
        ..MatchRules::default()
    }
}

/// A point inside the first top wall, outside the inner court
const WALL_POINT: Point = Point::new(50, 39);

/// A point outside the walls, the inner court, and every obstacle
const NEUTRAL_POINT: Point = Point::new(10, 10);

#[test]
fn start_rejects_the_pre_match_stage() {
    let mut engine = engine();
    assert!(matches!(
        engine.start(Camp::A, Stage::PreMatch, T0),
        Err(MatchError::PreMatchStage)
    ));
}

#[test]
fn second_runner_needs_a_frozen_schedule() {
    let mut engine = engine();
    assert!(matches!(
        engine.start(Camp::B, Stage::FirstHalf, T0),
        Err(MatchError::ScheduleNotFrozen(Stage::FirstHalf))
    ));

    engine.start(Camp::A, Stage::FirstHalf, T0).unwrap();
    engine.end().unwrap();

    // A first-half freeze does not cover the second half.
    assert!(matches!(
        engine.start(Camp::B, Stage::SecondHalf, T0 + 1_000),
        Err(MatchError::ScheduleNotFrozen(Stage::SecondHalf))
    ));

    engine.start(Camp::B, Stage::FirstHalf, T0 + 1_000).unwrap();
    assert_eq!(engine.status(), MatchStatus::Running);
}

#[test]
fn status_transitions_follow_the_state_machine() {
    let mut engine = engine();
    assert!(matches!(engine.pause(T0), Err(MatchError::NotRunning(_))));
    assert!(matches!(engine.resume(T0), Err(MatchError::NotPaused(_))));
    assert!(matches!(engine.end(), Err(MatchError::NotInProgress(_))));

    engine.start(Camp::A, Stage::FirstHalf, T0).unwrap();
    assert!(matches!(
        engine.start(Camp::A, Stage::FirstHalf, T0),
        Err(MatchError::AlreadyStarted(MatchStatus::Running))
    ));

    engine.pause(T0 + 1_000).unwrap();
    assert!(matches!(
        engine.pause(T0 + 2_000),
        Err(MatchError::NotRunning(MatchStatus::Paused))
    ));

    engine.resume(T0 + 3_000).unwrap();
    engine.pause(T0 + 4_000).unwrap();
    // End is valid from Paused as well.
    engine.end().unwrap();
    assert_eq!(engine.status(), MatchStatus::Ended);
    assert!(matches!(engine.end(), Err(MatchError::NotInProgress(_))));

    // Refresh after End is a no-op; per-tick effects have stopped.
    assert!(engine.refresh(T0 + 5_000).unwrap().is_empty());
    assert_eq!(engine.status(), MatchStatus::Ended);

    // The engine is restartable from Ended for the next run.
    engine.start(Camp::A, Stage::SecondHalf, T0 + 6_000).unwrap();
    assert_eq!(engine.status(), MatchStatus::Running);
}

#[test]
fn wall_contact_accrues_per_millisecond() {
    let mut engine = engine_with(no_take_rules());
    engine.start(Camp::A, Stage::FirstHalf, T0).unwrap();
    engine.report_position(Camp::A, WALL_POINT, T0);

    engine.refresh(T0).unwrap();
    for i in 1..=10 {
        engine.refresh(T0 + i * 100).unwrap();
    }

    // Ten 100 ms ticks inside a wall at -0.01 per millisecond.
    assert!((engine.score(Camp::A) - (-10.0)).abs() < 1e-9);
}

#[test]
fn inner_court_bonus_is_granted_once_per_run() {
    let mut engine = engine_with(no_take_rules());
    engine.start(Camp::A, Stage::FirstHalf, T0).unwrap();

    engine.report_position(Camp::A, Point::new(100, 100), T0);
    let events = engine.refresh(T0).unwrap();
    assert!(events.contains(&MatchEvent::MovedIntoInnerCourt));
    assert!((engine.score(Camp::A) - 10.0).abs() < 1e-9);

    // Exit and re-enter: no second bonus.
    engine.report_position(Camp::A, NEUTRAL_POINT, T0 + 100);
    engine.refresh(T0 + 100).unwrap();
    engine.report_position(Camp::A, Point::new(100, 100), T0 + 200);
    let events = engine.refresh(T0 + 200).unwrap();
    assert!(!events.contains(&MatchEvent::MovedIntoInnerCourt));
    assert!((engine.score(Camp::A) - 10.0).abs() < 1e-9);

    // A fresh run grants it again.
    engine.end().unwrap();
    engine.start(Camp::A, Stage::FirstHalf, T0 + 10_000).unwrap();
    engine.report_position(Camp::A, Point::new(100, 100), T0 + 10_000);
    let events = engine.refresh(T0 + 10_000).unwrap();
    assert!(events.contains(&MatchEvent::MovedIntoInnerCourt));
}

#[test]
fn parking_penalty_has_one_tick_hysteresis() {
    let mut engine = engine_with(no_take_rules());
    engine.start(Camp::A, Stage::FirstHalf, T0).unwrap();
    engine.report_position(Camp::A, NEUTRAL_POINT, T0);

    engine.refresh(T0).unwrap();
    let mut started = 0;
    let mut stopped = 0;
    for i in 1..=60 {
        for event in engine.refresh(T0 + i * 100).unwrap() {
            match event {
                MatchEvent::ParkingPenaltyStarted => started += 1,
                MatchEvent::ParkingPenaltyStopped => stopped += 1,
                _ => {}
            }
        }
    }

    // Penalty starts once parked for 5000 ms plus one tick: ticks at
    // 5100..=6000 ms, ten of them at -0.005 per millisecond.
    assert_eq!(started, 1);
    assert_eq!(stopped, 0);
    assert!((engine.score(Camp::A) - (-5.0)).abs() < 1e-9);

    // Meaningful movement resets the clock and stops the penalty.
    engine.report_position(Camp::A, Point::new(20, 10), T0 + 6_100);
    let events = engine.refresh(T0 + 6_100).unwrap();
    assert!(events.contains(&MatchEvent::ParkingPenaltyStopped));
    assert!((engine.score(Camp::A) - (-5.0)).abs() < 1e-9);
}

#[test]
fn forced_delivery_scores_commission_minus_overtime() {
    let mut engine = engine();
    engine.start(Camp::A, Stage::SecondHalf, T0).unwrap();

    let mut now = T0;
    let mut guard = 0;
    while engine.orders().is_empty() {
        now += 100;
        engine.refresh(now).unwrap();
        guard += 1;
        assert!(guard < 1_500, "no order released within 150s of game time");
    }

    let (departure, destination, commission, time_limit) = {
        let order = &engine.orders()[0];
        (
            order.departure(),
            order.destination(),
            order.commission(),
            order.time_limit_ms(),
        )
    };

    let before = engine.score(Camp::A);
    engine.report_position(Camp::A, departure, now);
    let events = engine.force_order(ForcedOrderAction::Take, now).unwrap();
    assert!(events
        .iter()
        .any(|e| matches!(e, MatchEvent::OrderTaken { .. })));

    // Deliver exactly 2000 ms past the time limit.
    let taken_at = engine.orders()[0].taken_at().unwrap();
    let game_now = engine.game_time(now).unwrap();
    let deliver_now = now + (taken_at + time_limit + 2_000 - game_now);

    engine.report_position(Camp::A, destination, deliver_now);
    let events = engine
        .force_order(ForcedOrderAction::Deliver, deliver_now)
        .unwrap();
    assert!(events
        .iter()
        .any(|e| matches!(e, MatchEvent::OrderDelivered { .. })));

    assert_eq!(engine.orders()[0].overtime(), Some(2_000));
    let expected = (commission - 0.005 * 2_000.0).max(0.0);
    assert!((engine.score(Camp::A) - before - expected).abs() < 1e-9);
}

#[test]
fn delivery_score_floors_at_zero() {
    assert!((delivery_score(-0.005, 30.0, 2_000) - 20.0).abs() < f64::EPSILON);
    assert!((delivery_score(-0.005, 30.0, 0) - 30.0).abs() < f64::EPSILON);
    // Overtime larger than the commission never goes negative.
    assert_eq!(delivery_score(-0.005, 30.0, 20_000), 0.0);
}

#[test]
fn forced_scan_honors_selector_and_capacity() {
    let rules = MatchRules {
        order_contact_radius: 0.0,
        forced_contact_radius: 1_000.0,
        delivery_capacity: 2,
        ..MatchRules::default()
    };
    let mut engine = engine_with(rules);
    engine.start(Camp::A, Stage::FirstHalf, T0).unwrap();

    let mut now = T0;
    let mut guard = 0;
    while engine.orders().len() < 4 {
        now += 100;
        engine.refresh(now).unwrap();
        guard += 1;
        assert!(guard < 590, "four orders not released within the first half");
    }

    engine.report_position(Camp::A, NEUTRAL_POINT, now);

    // Take selector: fills up to capacity, delivers nothing.
    let events = engine.force_order(ForcedOrderAction::Take, now).unwrap();
    let taken = events
        .iter()
        .filter(|e| matches!(e, MatchEvent::OrderTaken { .. }))
        .count();
    assert_eq!(taken, 2);
    assert!(!events
        .iter()
        .any(|e| matches!(e, MatchEvent::OrderDelivered { .. })));
    let in_delivery = engine
        .orders()
        .iter()
        .filter(|o| o.status() == OrderStatus::InDelivery)
        .count();
    assert_eq!(in_delivery, 2);

    // Deliver selector: completes both, takes nothing new.
    let events = engine
        .force_order(ForcedOrderAction::Deliver, now + 100)
        .unwrap();
    let delivered = events
        .iter()
        .filter(|e| matches!(e, MatchEvent::OrderDelivered { .. }))
        .count();
    assert_eq!(delivered, 2);
    assert!(!events
        .iter()
        .any(|e| matches!(e, MatchEvent::OrderTaken { .. })));
}

#[test]
fn fourth_charging_station_is_a_noop() {
    let mut engine = engine();
    engine.start(Camp::A, Stage::FirstHalf, T0).unwrap();
    engine.report_position(Camp::A, NEUTRAL_POINT, T0);

    for _ in 0..3 {
        assert!(engine.place_charging_station().is_some());
    }
    assert!((engine.score(Camp::A) - 15.0).abs() < 1e-9);

    assert!(engine.place_charging_station().is_none());
    assert!((engine.score(Camp::A) - 15.0).abs() < 1e-9);
    assert_eq!(engine.charging_stations().len(), 3);

    // Stations persist across runs but cannot be placed in the second half.
    engine.end().unwrap();
    engine.start(Camp::A, Stage::SecondHalf, T0 + 100_000).unwrap();
    engine.report_position(Camp::A, NEUTRAL_POINT, T0 + 100_000);
    assert!(engine.place_charging_station().is_none());
    assert_eq!(engine.charging_stations().len(), 3);
}

#[test]
fn station_placement_requires_a_known_position() {
    let mut engine = engine();
    engine.start(Camp::A, Stage::FirstHalf, T0).unwrap();
    assert!(engine.place_charging_station().is_none());
    assert_eq!(engine.charging_stations().len(), 0);
}

#[test]
fn expiry_ends_the_run_before_any_scoring() {
    let mut engine = engine_with(no_take_rules());
    engine.start(Camp::A, Stage::FirstHalf, T0).unwrap();
    engine.report_position(Camp::A, WALL_POINT, T0);
    engine.refresh(T0).unwrap();

    // The vehicle sits inside a wall, but the expired tick must not
    // apply the contact penalty.
    let events = engine.refresh(T0 + 60_000).unwrap();
    assert_eq!(events, vec![MatchEvent::TimeExpired]);
    assert_eq!(engine.status(), MatchStatus::Ended);
    assert_eq!(engine.score(Camp::A), 0.0);
}

#[test]
fn pausing_excludes_the_paused_interval() {
    let mut engine = engine();
    engine.start(Camp::A, Stage::FirstHalf, T0).unwrap();

    assert_eq!(engine.remaining_time(T0 + 10_000), Some(50_000));
    engine.pause(T0 + 10_000).unwrap();
    engine.resume(T0 + 15_000).unwrap();
    assert_eq!(engine.remaining_time(T0 + 15_000), Some(50_000));
    assert_eq!(engine.remaining_time(T0 + 20_000), Some(45_000));
}

#[test]
fn exhaustion_trades_match_time_for_power() {
    let rules = MatchRules {
        initial_power: 10,
        delivery_capacity: 0,
        ..MatchRules::default()
    };
    let mut engine = engine_with(rules);
    engine.start(Camp::A, Stage::FirstHalf, T0).unwrap();

    let obstacle = engine.obstacles()[0];
    let inside = Point::new(obstacle.top_left.x + 1, obstacle.top_left.y + 1);
    engine.report_position(Camp::A, inside, T0);

    let events = engine.refresh(T0).unwrap();
    assert!(events.contains(&MatchEvent::ObstacleEntered));
    assert_eq!(engine.vehicle(Camp::A).unwrap().remaining_power(), 10);

    // A 100 ms tick discharges the last 10 units; the same tick then
    // rewinds the clock by 5000 ms for 100 units of power.
    let events = engine.refresh(T0 + 100).unwrap();
    assert!(events.iter().any(|e| matches!(
        e,
        MatchEvent::AutoRecharged {
            power: 100,
            time_cost_ms: 5_000
        }
    )));
    assert_eq!(engine.vehicle(Camp::A).unwrap().remaining_power(), 100);
    assert_eq!(engine.game_time(T0 + 100), Some(5_100));
}

#[test]
fn second_run_replays_an_identical_order_sequence() {
    fn run(engine: &mut MatchEngine, camp: Camp, start: i64) -> Vec<(i32, Point, Point, i64, i64, f64)> {
        engine.start(camp, Stage::FirstHalf, start).unwrap();
        for i in 0..=601 {
            engine.refresh(start + i * 100).unwrap();
        }
        assert_eq!(engine.status(), MatchStatus::Ended);
        engine
            .orders()
            .iter()
            .map(|o| {
                (
                    o.id(),
                    o.departure(),
                    o.destination(),
                    o.generated_at(),
                    o.time_limit_ms(),
                    o.commission(),
                )
            })
            .collect()
    }

    let mut engine = engine();
    let first = run(&mut engine, Camp::A, T0);
    let second = run(&mut engine, Camp::B, T0 + 500_000);

    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[test]
fn foul_is_immediate_and_needs_an_active_camp() {
    let mut engine = engine();
    assert!(engine.foul().is_none());
    assert_eq!(engine.score(Camp::A), 0.0);

    engine.start(Camp::B, Stage::FirstHalf, T0).unwrap_err();
    engine.start(Camp::A, Stage::FirstHalf, T0).unwrap();
    assert_eq!(engine.foul(), Some(MatchEvent::Foul { camp: Camp::A }));
    assert!((engine.score(Camp::A) - (-50.0)).abs() < 1e-9);
    assert_eq!(engine.score(Camp::B), 0.0);
}

#[test]
fn commands_before_the_first_start_are_skipped() {
    let mut engine = engine();
    assert!(engine.force_order(ForcedOrderAction::Take, T0).unwrap().is_empty());
    assert!(engine.place_charging_station().is_none());
    // Position reports before any run are ignored, not errors.
    engine.report_position(Camp::A, NEUTRAL_POINT, T0);
    assert!(engine.vehicle(Camp::A).is_none());
}

#[test]
fn snapshot_reflects_engine_state() {
    let mut engine = engine();
    let snapshot = engine.snapshot(T0);
    assert_eq!(snapshot.status, MatchStatus::Unstarted);
    assert_eq!(snapshot.stage, Stage::PreMatch);
    assert!(snapshot.camp.is_none());
    assert!(snapshot.game_time_ms.is_none());
    assert!(snapshot.vehicles.is_none());
    assert_eq!(snapshot.obstacles.len(), 5);
    assert!(snapshot.orders.is_empty());

    engine.start(Camp::A, Stage::FirstHalf, T0).unwrap();
    engine.report_position(Camp::A, NEUTRAL_POINT, T0 + 50);
    let snapshot = engine.snapshot(T0 + 1_000);
    assert_eq!(snapshot.status, MatchStatus::Running);
    assert_eq!(snapshot.game_time_ms, Some(1_000));
    assert_eq!(snapshot.remaining_time_ms, Some(59_000));
    let vehicles = snapshot.vehicles.unwrap();
    assert_eq!(vehicles.a.position, Some(NEUTRAL_POINT));
    assert!((vehicles.a.power_ratio - 1.0).abs() < f64::EPSILON);
    assert!(vehicles.b.position.is_none());
}
