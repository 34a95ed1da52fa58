use crate::conflict::{infer_kind, overlap_region};
use crate::driver::{Decision, Driver, World};
use crate::error::{NetworkError, NetworkResult};
use crate::generator::{Generator, PendingVehicle, VehicleClass};
use crate::math::{CubicFn, Point2d, Vector2d};
use crate::movable::graph::{self, diagnose};
use crate::movable::{Direction, LaneChange, Movable, Side, Vehicle};
use crate::network::{Lane, LaneAttributes, LaneChangeRule, Network, Route};
use crate::rsu::{
    run_rsus, ConflictKind, ConflictRsu, ConflictSide, Controller, Detector, DetectorRecord,
    LightState, Rsu, RsuKind,
};
use crate::settings::{Settings, SimulationConfig};
use crate::trajectory::{Trajectory, TrajectorySink};
use crate::util::Interval;
use crate::{ControllerId, LaneId, LaneSet, MovableId, MovableSet, RsuId, RsuSet};
use cgmath::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use slotmap::{SecondaryMap, SlotMap};

pub use crate::movable::graph::Diagnostic;

/// The position and heading of a movable in world space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WorldPose {
    /// The position of the front of the movable.
    pub position: Point2d,
    /// The unit direction of travel.
    pub heading: Vector2d,
}

/// A traffic simulation.
pub struct Simulation {
    config: SimulationConfig,
    /// The lanes in the network.
    network: Network,
    /// The road-side units.
    rsus: RsuSet,
    /// The vehicles and lane change shadows being simulated.
    movables: MovableSet,
    /// The driver of every vehicle.
    drivers: SecondaryMap<MovableId, Driver>,
    /// The controllers updating road-side units.
    controllers: SlotMap<ControllerId, Box<dyn Controller>>,
    generators: Vec<Generator>,
    rng: StdRng,
    /// The number of steps simulated.
    step: u64,
    /// The current time in s.
    t: f64,
    trajectories: TrajectorySink,
    /// Diagnostics of the last step, when debugging is enabled.
    diagnostics: Vec<Diagnostic>,
}

/// The lanes a vehicle drove along during one step.
struct Move {
    id: MovableId,
    /// The lane segments driven this step: lane, position before and after.
    segments: Vec<(LaneId, f64, f64)>,
    exited: bool,
}

impl Simulation {
    /// Creates an empty simulation.
    pub fn new(config: SimulationConfig) -> NetworkResult<Self> {
        config.validate()?;
        let capacity = config.settings.trajectory_buffer();
        Ok(Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            network: Network::default(),
            rsus: RsuSet::default(),
            movables: MovableSet::default(),
            drivers: SecondaryMap::new(),
            controllers: SlotMap::with_key(),
            generators: vec![],
            step: 0,
            t: 0.0,
            trajectories: TrajectorySink::new(capacity),
            diagnostics: vec![],
        })
    }

    /// Adds a lane to the network.
    pub fn add_lane(&mut self, attributes: &LaneAttributes) -> NetworkResult<LaneId> {
        self.network.add_lane(attributes)
    }

    /// Specifies that the end of the `from` lane connects to the start of the `to` lane.
    pub fn connect(&mut self, from: LaneId, to: LaneId) -> NetworkResult<()> {
        self.network.connect(from, to)
    }

    /// Specifies that `left` lies directly to the left of `right`, and
    /// which lane changes between them are allowed.
    pub fn connect_lateral(
        &mut self,
        left: LaneId,
        right: LaneId,
        rule: LaneChangeRule,
    ) -> NetworkResult<()> {
        self.network.connect_lateral(left, right, rule)
    }

    /// Marks a lane as a taper that ends by merging into its left lane.
    pub fn set_taper(&mut self, lane: LaneId) -> NetworkResult<()> {
        self.network.set_taper(lane)
    }

    /// Marks a lane as leading to a destination.
    pub fn set_destination(&mut self, lane: LaneId, destination: u32) -> NetworkResult<()> {
        self.network.set_destination(lane, destination)
    }

    /// Adds a detector at position `x` of a lane, configured from the settings.
    pub fn add_detector(&mut self, lane: LaneId, x: f64) -> NetworkResult<RsuId> {
        let settings = &self.config.settings;
        let detector = Detector::new(
            settings.detector_period(),
            settings.detector_delay(),
            settings.store_detector_data(),
        );
        self.add_rsu(lane, x, RsuKind::Detector(detector))
    }

    /// Adds a traffic light stop line at position `x` of a lane. The light starts red.
    pub fn add_traffic_light(&mut self, lane: LaneId, x: f64) -> NetworkResult<RsuId> {
        self.add_rsu(lane, x, RsuKind::TrafficLight(LightState::Red))
    }

    /// Adds a speed reduction at position `x` of a lane. Without a speed,
    /// vehicles slow to the speed limit of the lane.
    pub fn add_speed_reduction(
        &mut self,
        lane: LaneId,
        x: f64,
        speed: Option<f64>,
    ) -> NetworkResult<RsuId> {
        if let Some(speed) = speed {
            if !(speed > 0.0) {
                return Err(NetworkError::InvalidParameter {
                    name: "speed",
                    reason: format!("must be positive, got {}", speed),
                });
            }
        }
        self.add_rsu(lane, x, RsuKind::SpeedReduction { speed })
    }

    /// Adds a conflict between two lanes with explicitly given regions.
    /// Returns the units placed at the end of the region on each lane.
    pub fn add_conflict(
        &mut self,
        kind: ConflictKind,
        a: ConflictSide,
        b: ConflictSide,
    ) -> NetworkResult<[RsuId; 2]> {
        for side in [&a, &b] {
            self.check_position(side.lane, side.end)?;
            if !(side.length >= 0.0) {
                return Err(NetworkError::InvalidParameter {
                    name: "length",
                    reason: format!("conflict length must not be negative, got {}", side.length),
                });
            }
        }
        let unit = |side: &ConflictSide| {
            let conflict = ConflictRsu {
                kind,
                priority: side.priority,
                length: side.length,
                keep_clear: side.keep_clear,
                visibility: side.visibility,
                other: RsuId::default(),
                up: None,
            };
            Rsu::new(side.lane, side.end, RsuKind::Conflict(conflict))
        };
        let id_a = self.rsus.insert(unit(&a));
        let id_b = self.rsus.insert(unit(&b));
        for (id, other) in [(id_a, id_b), (id_b, id_a)] {
            if let RsuKind::Conflict(conflict) = &mut self.rsus[id].kind {
                conflict.other = other;
            }
        }
        self.network.insert_rsu(a.lane, a.end, id_a)?;
        self.network.insert_rsu(b.lane, b.end, id_b)?;
        Ok([id_a, id_b])
    }

    /// Adds a conflict between two lanes at the region where their geometries
    /// overlap. Traffic on `major` has priority. Whether the conflict is a
    /// merge, split or crossing follows from how the lanes are connected.
    pub fn add_conflict_between(
        &mut self,
        major: LaneId,
        minor: LaneId,
    ) -> NetworkResult<[RsuId; 2]> {
        let (major_lane, minor_lane) = (self.network.get(major)?, self.network.get(minor)?);
        let (Some(major_region), Some(minor_region)) = (
            overlap_region(major_lane, minor_lane),
            overlap_region(minor_lane, major_lane),
        ) else {
            return Err(NetworkError::NoConflictRegion(major, minor));
        };
        let kind = infer_kind(major_lane, minor_lane);
        let side = |lane: LaneId, region: Interval<f64>, priority: bool| ConflictSide {
            lane,
            end: region.max,
            length: region.max - region.min,
            priority,
            keep_clear: kind == ConflictKind::Crossing,
            visibility: f64::INFINITY,
        };
        self.add_conflict(
            kind,
            side(major, major_region, true),
            side(minor, minor_region, false),
        )
    }

    /// Registers a controller that is run at the start of every step.
    pub fn add_controller(&mut self, controller: impl Controller + 'static) -> ControllerId {
        self.controllers.insert(Box::new(controller))
    }

    /// Adds a vehicle generator at the start of its lane.
    pub fn add_generator(&mut self, generator: Generator) -> NetworkResult<()> {
        self.network.set_has_generator(generator.lane())?;
        self.generators.push(generator);
        Ok(())
    }

    /// Places a vehicle of the given class on a lane.
    pub fn spawn_vehicle(
        &mut self,
        lane: LaneId,
        x: f64,
        v: f64,
        class: &VehicleClass,
        route: Route,
    ) -> NetworkResult<MovableId> {
        self.check_position(lane, x)?;
        if !(v >= 0.0) {
            return Err(NetworkError::InvalidParameter {
                name: "v",
                reason: format!("speed must not be negative, got {}", v),
            });
        }
        let pending = PendingVehicle {
            length: class.length,
            max_speed: class.max_speed,
            driver: class.driver,
            route,
            equipped: false,
        };
        let id = self.insert_vehicle(pending, lane, x, v);
        if self.network.is_initialised() {
            graph::rebuild(&mut self.network, &mut self.movables);
        }
        Ok(id)
    }

    fn check_position(&self, lane: LaneId, x: f64) -> NetworkResult<()> {
        let length = self.network.get(lane)?.length();
        if !(0.0..=length).contains(&x) {
            return Err(NetworkError::OutsideLane { lane, x, length });
        }
        Ok(())
    }

    fn add_rsu(&mut self, lane: LaneId, x: f64, kind: RsuKind) -> NetworkResult<RsuId> {
        self.check_position(lane, x)?;
        let id = self.rsus.insert(Rsu::new(lane, x, kind));
        self.network.insert_rsu(lane, x, id)?;
        Ok(id)
    }

    fn insert_vehicle(&mut self, pending: PendingVehicle, lane: LaneId, x: f64, v: f64) -> MovableId {
        let trajectory_period = self
            .config
            .settings
            .store_trajectory_data()
            .then(|| self.config.settings.trajectory_period());
        let id = self.movables.insert_with_key(|id| {
            let vehicle = Vehicle {
                route: pending.route,
                max_speed: pending.max_speed,
                lane_change: None,
                trajectory: trajectory_period.map(|period| Trajectory::new(id, period)),
                equipped: pending.equipped,
            };
            Movable::new_vehicle(id, lane, x, pending.length, v, vehicle)
        });
        self.drivers.insert(id, Driver::new(pending.driver));
        log::info!("vehicle {:?} created on {:?} at {:.1} m, {:.1} m/s", id, lane, x, v);
        id
    }

    /// Places the automatic units and derives the network information,
    /// if anything changed since the last step.
    fn ensure_initialised(&mut self) {
        if self.network.is_initialised() {
            return;
        }
        let splits = self
            .network
            .lanes()
            .values()
            .filter(|lane| lane.is_split())
            .filter(|lane| {
                !lane
                    .rsus()
                    .any(|rsu| matches!(self.rsus[rsu].kind, RsuKind::Split))
            })
            .map(|lane| (lane.id(), lane.length()))
            .collect::<Vec<_>>();
        for (lane, length) in splits {
            let id = self.rsus.insert(Rsu::new(lane, length, RsuKind::Split));
            if self.network.insert_rsu(lane, length, id).is_err() {
                self.rsus.remove(id);
            }
        }
        self.network.init();
        graph::rebuild(&mut self.network, &mut self.movables);
    }

    /// Runs up to `n` steps, stopping early once the simulated period has passed.
    /// Returns the number of steps run.
    pub fn run(&mut self, n: usize) -> usize {
        let mut steps = 0;
        while steps < n && self.t < self.config.period {
            self.step();
            steps += 1;
        }
        steps
    }

    /// Advances the simulation by one time step.
    pub fn step(&mut self) {
        self.ensure_initialised();
        self.run_controllers();
        self.generate();
        let decisions = self.decide();
        self.apply_decisions(decisions);
        self.integrate();
        graph::rebuild(&mut self.network, &mut self.movables);
        if self.finish_lane_changes() {
            graph::rebuild(&mut self.network, &mut self.movables);
        }
        if self.config.settings.debug() {
            self.diagnostics = diagnose(&self.network, &self.movables);
        }
        self.step += 1;
        self.t = self.step as f64 * self.config.dt;
    }

    /// Runs the controllers and the bookkeeping of the road-side units.
    fn run_controllers(&mut self) {
        for controller in self.controllers.values_mut() {
            controller.run(self.t, self.config.dt, &mut self.rsus);
        }
        run_rsus(&mut self.rsus, &self.network, &self.movables, self.t);
    }

    /// Queues arriving vehicles and inserts at most one per generator.
    fn generate(&mut self) {
        let mut inserts = vec![];
        for generator in &mut self.generators {
            generator.arrivals(self.t, &mut self.rng);
            if let Some((pending, x, v)) = generator.try_insert(&self.network, &self.movables) {
                inserts.push((generator.lane(), pending, x, v));
            }
        }
        if inserts.is_empty() {
            return;
        }
        for (lane, pending, x, v) in inserts {
            self.insert_vehicle(pending, lane, x, v);
        }
        graph::rebuild(&mut self.network, &mut self.movables);
    }

    /// Lets every driver decide on the state at the start of the step.
    fn decide(&mut self) -> Vec<(MovableId, Decision)> {
        let ids = self
            .movables
            .iter()
            .filter(|(_, m)| !m.is_shadow())
            .map(|(id, _)| id)
            .collect::<Vec<_>>();
        let mut decisions = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(mut driver) = self.drivers.remove(id) else {
                continue;
            };
            let world = World {
                network: &self.network,
                rsus: &self.rsus,
                movables: &self.movables,
                drivers: &self.drivers,
                step: self.step,
                dt: self.config.dt,
            };
            let decision = driver.drive(&world, id);
            self.drivers.insert(id, driver);
            decisions.push((id, decision));
        }
        decisions
    }

    fn apply_decisions(&mut self, decisions: Vec<(MovableId, Decision)>) {
        for (id, decision) in decisions {
            let movable = &mut self.movables[id];
            movable.a = decision.a;
            movable.indicator = decision.indicator;

            if let Some((side, rate)) = decision.lane_change {
                self.start_lane_change(id, side, rate);
            }
            if let Some((follower, desire)) = decision.follower_headway {
                let owner = self.movables[follower].owner();
                if let Some(driver) = self.drivers.get_mut(owner) {
                    driver.shorten_headway(desire);
                }
            }
        }
    }

    /// Creates the shadow of a vehicle on the target lane.
    fn start_lane_change(&mut self, id: MovableId, side: Side, rate: f64) {
        let owner = self.movables[id].clone();
        if owner.vehicle().map_or(true, |veh| veh.is_changing_lane()) {
            return;
        }
        let Some(target) = self.network[owner.lane].side(side) else {
            return;
        };
        let Some(x) = self.network.adjacent_x(owner.lane, side, owner.x) else {
            return;
        };
        let shadow = self
            .movables
            .insert_with_key(|shadow| Movable::new_shadow(shadow, &owner, target, x));
        if let Some(vehicle) = self.movables[id].vehicle_mut() {
            vehicle.lane_change = Some(LaneChange {
                side,
                progress: 0.0,
                rate,
                shadow,
            });
        }
        log::debug!("vehicle {:?} starts a lane change to the {:?}", id, side);
    }

    /// Moves every vehicle and its shadow along its lanes.
    fn integrate(&mut self) {
        let dt = self.config.dt;
        let ids = self
            .movables
            .iter()
            .filter(|(_, m)| !m.is_shadow())
            .map(|(id, _)| id)
            .collect::<Vec<_>>();

        let mut moves = vec![];
        for id in ids {
            let movable = &mut self.movables[id];
            let (v, a) = (movable.v, movable.a);
            let dx = if v + a * dt < 0.0 {
                -0.5 * v * v / a
            } else {
                v * dt + 0.5 * a * dt * dt
            };
            movable.v = f64::max(v + a * dt, 0.0);
            let route = movable.vehicle().map_or(Route::Free, |veh| veh.route);

            let mut lane = movable.lane;
            let mut x = movable.x + dx;
            let mut segments = vec![(lane, movable.x, x)];
            let mut exited = false;
            while x > self.network[lane].length() {
                let length = self.network[lane].length();
                match self.network.next_lane(lane, &route) {
                    Some(next) => {
                        x -= length;
                        lane = next;
                        segments.push((lane, 0.0, x));
                    }
                    None => {
                        exited = true;
                        break;
                    }
                }
            }
            movable.lane = lane;
            movable.x = x;
            if let Some(lc) = movable.vehicle_mut().and_then(|veh| veh.lane_change.as_mut()) {
                lc.progress += lc.rate;
            }
            moves.push(Move { id, segments, exited });
        }

        let t = self.t + dt;
        for mv in moves {
            self.register_passes(&mv);
            if mv.exited {
                self.remove_vehicle(mv.id);
                continue;
            }
            self.move_shadow(mv.id);
            let movable = &mut self.movables[mv.id];
            if let Some(mut trajectory) = movable.vehicle_mut().and_then(|veh| veh.trajectory.take()) {
                trajectory.record(t, movable);
                if let Some(vehicle) = movable.vehicle_mut() {
                    vehicle.trajectory = Some(trajectory);
                }
            }
        }
    }

    /// Counts the vehicle at every detector its front passed.
    fn register_passes(&mut self, mv: &Move) {
        let t = self.t + self.config.dt;
        let v = self.movables[mv.id].v;
        for (lane, from, to) in &mv.segments {
            let passed = self.network[*lane]
                .rsus()
                .filter(|rsu| {
                    let x = self.rsus[*rsu].x;
                    *from < x && x <= *to
                })
                .collect::<Vec<_>>();
            for rsu in passed {
                if let RsuKind::Detector(detector) = &mut self.rsus[rsu].kind {
                    detector.pass(t, v);
                }
            }
        }
    }

    /// Keeps the shadow of a lane changing vehicle beside it, or aborts the
    /// lane change when the target lane ends.
    fn move_shadow(&mut self, id: MovableId) {
        let movable = &self.movables[id];
        let Some(lc) = movable.vehicle().and_then(|veh| veh.lane_change) else {
            return;
        };
        let target = self.network[movable.lane].side(lc.side).and_then(|target| {
            let x = self.network.adjacent_x(movable.lane, lc.side, movable.x)?;
            Some((target, x))
        });
        let (v, a) = (movable.v, movable.a);
        match target {
            Some((target, x)) => {
                if let Some(shadow) = self.movables.get_mut(lc.shadow) {
                    shadow.lane = target;
                    shadow.x = x;
                    shadow.v = v;
                    shadow.a = a;
                }
            }
            None => {
                log::debug!(
                    "vehicle {:?} aborts its lane change, the {:?} lane ended",
                    id,
                    lc.side
                );
                self.movables.remove(lc.shadow);
                let movable = &mut self.movables[id];
                movable.indicator = None;
                if let Some(vehicle) = movable.vehicle_mut() {
                    vehicle.lane_change = None;
                }
            }
        }
    }

    /// Removes a vehicle that left the network, with its shadow and driver.
    fn remove_vehicle(&mut self, id: MovableId) {
        let Some(movable) = self.movables.remove(id) else {
            return;
        };
        self.drivers.remove(id);
        if let Some(counterpart) = movable.counterpart() {
            self.movables.remove(counterpart);
        }
        if let Some(trajectory) = movable
            .vehicle()
            .and_then(|veh| veh.trajectory.clone())
        {
            self.trajectories.push(trajectory);
        }
        log::info!("vehicle {:?} left the network at t={:.1} s", id, self.t);
    }

    /// Moves vehicles that completed a lane change onto the target lane.
    fn finish_lane_changes(&mut self) -> bool {
        let finished = self
            .movables
            .iter()
            .filter_map(|(id, m)| {
                let lc = m.vehicle()?.lane_change?;
                (lc.progress >= 1.0).then_some((id, lc.shadow))
            })
            .collect::<Vec<_>>();
        for (id, shadow) in &finished {
            let Some(shadow) = self.movables.remove(*shadow) else {
                continue;
            };
            let movable = &mut self.movables[*id];
            movable.lane = shadow.lane;
            movable.x = shadow.x;
            movable.indicator = None;
            if let Some(vehicle) = movable.vehicle_mut() {
                vehicle.lane_change = None;
            }
            log::debug!("vehicle {:?} finished its lane change onto {:?}", id, shadow.lane);
        }
        !finished.is_empty()
    }

    /// The current simulation time in s.
    pub fn time(&self) -> f64 {
        self.t
    }

    /// The number of steps simulated so far.
    pub fn step_count(&self) -> u64 {
        self.step
    }

    pub fn settings(&self) -> &Settings {
        &self.config.settings
    }

    pub fn lanes(&self) -> &LaneSet {
        self.network.lanes()
    }

    pub fn lane(&self, id: LaneId) -> Option<&Lane> {
        self.network.lanes().get(id)
    }

    /// Returns an iterator over all vehicles and lane change shadows.
    pub fn movables(&self) -> impl Iterator<Item = &Movable> {
        self.movables.values()
    }

    pub fn movable(&self, id: MovableId) -> Option<&Movable> {
        self.movables.get(id)
    }

    pub fn vehicle(&self, id: MovableId) -> Option<&Vehicle> {
        self.movables.get(id)?.vehicle()
    }

    pub fn driver(&self, id: MovableId) -> Option<&Driver> {
        self.drivers.get(id)
    }

    #[cfg(test)]
    pub(crate) fn driver_mut(&mut self, id: MovableId) -> Option<&mut Driver> {
        self.drivers.get_mut(id)
    }

    pub fn rsu(&self, id: RsuId) -> Option<&Rsu> {
        self.rsus.get(id)
    }

    /// The neighbour of a movable in the given direction.
    pub fn neighbor(&self, id: MovableId, dir: Direction) -> Option<MovableId> {
        self.movables.get(id)?.neighbor(dir)
    }

    /// The world space pose of a movable. A lane changing vehicle is placed
    /// between its own lane and the target lane.
    pub fn world_pose(&self, id: MovableId) -> Option<WorldPose> {
        let movable = self.movables.get(id)?;
        let sample = |lane: LaneId, x: f64| {
            let lane = &self.network[lane];
            lane.curve().sample_centre(x.clamp(0.0, lane.length()))
        };
        let (mut position, mut heading) = sample(movable.lane, movable.x);
        let shadow = movable
            .vehicle()
            .and_then(|veh| veh.lane_change)
            .and_then(|lc| Some((lc.progress, self.movables.get(lc.shadow)?)));
        if let Some((progress, shadow)) = shadow {
            let f = CubicFn::from_ends(0.0, 0.0, 1.0, 1.0).y(progress.clamp(0.0, 1.0));
            let (target, target_heading) = sample(shadow.lane, shadow.x);
            position += (target - position) * f;
            heading = heading.lerp(target_heading, f);
            if heading.magnitude2() > 0.0 {
                heading = heading.normalize();
            }
        }
        Some(WorldPose { position, heading })
    }

    /// The stored aggregation records of a detector.
    pub fn detector_records(&self, rsu: RsuId) -> NetworkResult<&[DetectorRecord]> {
        self.rsus
            .get(rsu)
            .and_then(|rsu| rsu.detector())
            .map(|det| det.records())
            .ok_or(NetworkError::UnknownRsu(rsu))
    }

    /// Drains the stored aggregation records of a detector.
    pub fn take_detector_records(&mut self, rsu: RsuId) -> NetworkResult<Vec<DetectorRecord>> {
        self.rsus
            .get_mut(rsu)
            .and_then(|rsu| rsu.detector_mut())
            .map(|det| det.take_records())
            .ok_or(NetworkError::UnknownRsu(rsu))
    }

    /// Drains the trajectories of vehicles that left the network.
    pub fn take_trajectories(&mut self) -> Vec<Trajectory> {
        self.trajectories.take()
    }

    /// The inconsistencies found in the last step, when debugging is enabled.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::math::LineSegment2d;
    use assert_approx_eq::assert_approx_eq;

    fn straight(sim: &mut Simulation, x1: f64, x2: f64, y: f64) -> LaneId {
        sim.add_lane(&LaneAttributes {
            curve: &LineSegment2d::from_ends(Point2d::new(x1, y), Point2d::new(x2, y)),
            speed_limit: 20.0,
        })
        .unwrap()
    }

    fn sim() -> Simulation {
        Simulation::new(SimulationConfig {
            dt: 0.5,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn free_vehicle_crosses_lanes_and_exits() {
        let mut sim = sim();
        let a = straight(&mut sim, 0.0, 50.0, 0.0);
        let b = straight(&mut sim, 50.0, 100.0, 0.0);
        sim.connect(a, b).unwrap();
        let id = sim
            .spawn_vehicle(a, 45.0, 20.0, &VehicleClass::default(), Route::Free)
            .unwrap();

        sim.step();
        let veh = sim.movable(id).unwrap();
        assert_eq!(veh.lane(), b);
        assert!(veh.x() > 0.0 && veh.x() < 10.0);

        sim.run(20);
        assert!(sim.movable(id).is_none());
        assert!(sim.driver(id).is_none());
    }

    #[test]
    fn world_pose_follows_lane() {
        let mut sim = sim();
        let a = straight(&mut sim, 0.0, 100.0, 5.0);
        let id = sim
            .spawn_vehicle(a, 30.0, 0.0, &VehicleClass::default(), Route::Free)
            .unwrap();
        let pose = sim.world_pose(id).unwrap();
        assert_approx_eq!(pose.position.x, 30.0, 0.01);
        assert_approx_eq!(pose.position.y, 5.0, 0.01);
        assert_approx_eq!(pose.heading.x, 1.0, 0.01);
    }

    #[test]
    fn rejects_positions_outside_lane() {
        let mut sim = sim();
        let a = straight(&mut sim, 0.0, 100.0, 0.0);
        assert!(matches!(
            sim.add_detector(a, 150.0),
            Err(NetworkError::OutsideLane { .. })
        ));
        assert!(sim
            .spawn_vehicle(a, -1.0, 0.0, &VehicleClass::default(), Route::Free)
            .is_err());
    }

    #[test]
    fn split_receives_split_unit() {
        let mut sim = sim();
        let a = straight(&mut sim, 0.0, 100.0, 0.0);
        let b = straight(&mut sim, 100.0, 200.0, 0.0);
        let c = straight(&mut sim, 100.0, 200.0, -10.0);
        sim.connect(a, b).unwrap();
        sim.connect(a, c).unwrap();
        sim.step();
        let lane = sim.lane(a).unwrap();
        let splits = lane
            .rsus()
            .filter(|rsu| matches!(sim.rsu(*rsu).unwrap().kind(), RsuKind::Split))
            .count();
        assert_eq!(splits, 1);
        sim.step();
        assert_eq!(
            sim.lane(a)
                .unwrap()
                .rsus()
                .filter(|rsu| matches!(sim.rsu(*rsu).unwrap().kind(), RsuKind::Split))
                .count(),
            1
        );
    }

    #[test]
    fn generator_inserts_vehicles() {
        let mut sim = Simulation::new(SimulationConfig {
            dt: 0.5,
            seed: 3,
            ..Default::default()
        })
        .unwrap();
        let a = straight(&mut sim, 0.0, 2000.0, 0.0);
        sim.add_generator(Generator::new(a, 1200.0).unwrap()).unwrap();
        sim.run(240);
        assert!(sim.movables().count() > 15);
    }
}
