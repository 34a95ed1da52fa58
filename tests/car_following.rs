//! Tests of car following on a single lane.

use assert_approx_eq::assert_approx_eq;
use lane_sim::{
    math::{LineSegment2d, Point2d},
    Direction, LaneAttributes, LaneId, Route, Simulation, SimulationConfig, VehicleClass,
};

fn single_lane(sim: &mut Simulation, length: f64) -> LaneId {
    sim.add_lane(&LaneAttributes {
        curve: &LineSegment2d::from_ends(Point2d::new(0.0, 0.0), Point2d::new(length, 0.0)),
        speed_limit: 20.0,
    })
    .unwrap()
}

/// A free vehicle accelerates towards its desired speed and never reverses.
#[test]
fn vehicle_drives_forward() {
    let mut sim = Simulation::new(SimulationConfig {
        dt: 0.1,
        ..Default::default()
    })
    .unwrap();
    let lane = single_lane(&mut sim, 1000.0);
    let veh = sim
        .spawn_vehicle(lane, 10.0, 0.0, &VehicleClass::default(), Route::Free)
        .unwrap();

    let mut pos = sim.movable(veh).unwrap().x();
    for _ in 0..100 {
        sim.step();
        let next_pos = sim.movable(veh).unwrap().x();
        assert!(next_pos > pos);
        pos = next_pos;
    }
    let v = sim.movable(veh).unwrap().velocity();
    assert!(v > 5.0 && v <= 20.0);
}

/// A follower approaching a stopped leader comes to rest behind it
/// without ever overlapping it.
#[test]
fn follower_stops_behind_stopped_leader() {
    let mut sim = Simulation::new(SimulationConfig {
        dt: 0.2,
        ..Default::default()
    })
    .unwrap();
    let lane = single_lane(&mut sim, 300.0);
    // A red light just ahead of the leader keeps it in place
    sim.add_traffic_light(lane, 102.5).unwrap();

    let class = VehicleClass::default();
    let s0 = class.driver.s0;
    let leader = sim.spawn_vehicle(lane, 100.0, 0.0, &class, Route::Free).unwrap();
    let follower = sim.spawn_vehicle(lane, 50.0, 20.0, &class, Route::Free).unwrap();

    sim.step();
    assert_eq!(sim.neighbor(follower, Direction::Down), Some(leader));
    assert_eq!(sim.neighbor(leader, Direction::Up), Some(follower));

    for _ in 0..600 {
        sim.step();
        let l = sim.movable(leader).unwrap();
        let f = sim.movable(follower).unwrap();
        assert!(f.x() < l.rear(), "overlap at t={}", sim.time());
    }

    let l = sim.movable(leader).unwrap();
    let f = sim.movable(follower).unwrap();
    assert_approx_eq!(l.x(), 100.0, 0.01);
    let gap = l.rear() - f.x();
    assert!(gap > 0.0 && gap < s0 + 1.0, "gap {}", gap);
    assert!(f.velocity() < 0.5);
}
