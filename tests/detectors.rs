//! Tests of detector aggregation.

use assert_approx_eq::assert_approx_eq;
use lane_sim::{
    math::{LineSegment2d, Point2d},
    LaneAttributes, Route, Settings, Simulation, SimulationConfig, VehicleClass,
};

#[test]
fn detector_aggregates_passing_vehicles() {
    let mut settings = Settings::new();
    settings.set("storeDetectorData", true).unwrap();
    settings.set("detectorDelay", 0.0).unwrap();
    let mut sim = Simulation::new(SimulationConfig {
        dt: 0.5,
        settings,
        ..Default::default()
    })
    .unwrap();
    let lane = sim
        .add_lane(&LaneAttributes {
            curve: &LineSegment2d::from_ends(Point2d::new(0.0, 0.0), Point2d::new(1000.0, 0.0)),
            speed_limit: 20.0,
        })
        .unwrap();
    let det = sim.add_detector(lane, 50.0).unwrap();

    // Both vehicles drive at their maximum speed
    let fast = VehicleClass {
        max_speed: 20.0,
        ..Default::default()
    };
    let slow = VehicleClass {
        max_speed: 10.0,
        ..Default::default()
    };
    sim.spawn_vehicle(lane, 48.0, 20.0, &fast, Route::Free).unwrap();
    sim.spawn_vehicle(lane, 5.0, 10.0, &slow, Route::Free).unwrap();

    sim.run(20);
    let detector = sim.rsu(det).unwrap().detector().unwrap();
    assert_eq!(detector.count(), 2);
    assert_approx_eq!(detector.mean_speed().unwrap(), 15.0);
    assert!(sim.detector_records(det).unwrap().is_empty());

    sim.run(110);
    let records = sim.detector_records(det).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].count, 2);
    assert_approx_eq!(records[0].mean_speed, 15.0);
    assert_approx_eq!(records[0].period_end, 60.0);

    let detector = sim.rsu(det).unwrap().detector().unwrap();
    assert_eq!(detector.count(), 0);

    let drained = sim.take_detector_records(det).unwrap();
    assert_eq!(drained.len(), 1);
    assert!(sim.detector_records(det).unwrap().is_empty());

    // No vehicles pass in the second period
    sim.run(120);
    let drained = sim.take_detector_records(det).unwrap();
    assert_eq!(drained.len(), 1);
    assert_eq!(drained[0].count, 0);
    assert_approx_eq!(drained[0].period_start, 60.0);
}

#[test]
fn records_of_other_units_cannot_be_drained() {
    let mut sim = Simulation::new(SimulationConfig::default()).unwrap();
    let lane = sim
        .add_lane(&LaneAttributes {
            curve: &LineSegment2d::from_ends(Point2d::new(0.0, 0.0), Point2d::new(100.0, 0.0)),
            speed_limit: 20.0,
        })
        .unwrap();
    let light = sim.add_traffic_light(lane, 90.0).unwrap();
    assert!(sim.take_detector_records(light).is_err());
}
