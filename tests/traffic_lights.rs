//! Tests of vehicles reacting to a controlled traffic light.

use lane_sim::{
    math::{LineSegment2d, Point2d},
    LaneAttributes, LightStage, LightState, Route, Simulation, SimulationConfig,
    TrafficLightController, VehicleClass,
};

#[test]
fn vehicle_waits_for_green() {
    let mut sim = Simulation::new(SimulationConfig {
        dt: 0.5,
        ..Default::default()
    })
    .unwrap();
    let lane = sim
        .add_lane(&LaneAttributes {
            curve: &LineSegment2d::from_ends(Point2d::new(0.0, 0.0), Point2d::new(500.0, 0.0)),
            speed_limit: 20.0,
        })
        .unwrap();
    let light = sim.add_traffic_light(lane, 200.0).unwrap();

    let mut ctrl = TrafficLightController::new();
    let movement = ctrl.add_movement(&[light], 3.0);
    ctrl.add_stage(LightStage {
        movements: vec![],
        duration: 40.0,
    });
    ctrl.add_stage(LightStage {
        movements: vec![movement],
        duration: 30.0,
    });
    sim.add_controller(ctrl);

    let veh = sim
        .spawn_vehicle(lane, 100.0, 10.0, &VehicleClass::default(), Route::Free)
        .unwrap();

    sim.run(70);
    assert_eq!(sim.rsu(light).unwrap().light_state(), Some(LightState::Red));
    let m = sim.movable(veh).unwrap();
    assert!(m.x() < 200.0);
    assert!(m.velocity() < 1.0);

    sim.run(50);
    assert_eq!(sim.rsu(light).unwrap().light_state(), Some(LightState::Green));
    assert!(sim.movable(veh).map_or(true, |m| m.x() > 200.0));
}
