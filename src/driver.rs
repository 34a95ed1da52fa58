//! The driver model: IDM+ car following, LMRS lane changing and the
//! reactions to road-side units.

use crate::movable::graph::{distance_to_rsu, headway};
use crate::movable::{Direction, Movable, Side, Vehicle};
use crate::network::Network;
use crate::{MovableId, MovableSet, RsuId, RsuSet};
pub(crate) use conflict::ConflictState;
pub use idm::{anticipate, Idm};
use memo::{AccLabel, StepMemo};
use serde::{Deserialize, Serialize};
use slotmap::SecondaryMap;

mod conflict;
mod idm;
mod lmrs;
mod memo;
mod notice;

/// Lane change desire is not evaluated this close to the start of a lane
/// with a generator, in m.
const GENERATOR_ZONE: f64 = 100.0;

/// The parameters of a driver.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverParams {
    /// Stopping distance in m.
    pub s0: f64,
    /// Maximum acceleration in m/s<sup>2</sup>.
    pub a: f64,
    /// Comfortable deceleration in m/s<sup>2</sup>.
    pub b: f64,
    /// Maximum deceleration above the desired speed in m/s<sup>2</sup>.
    pub b0: f64,
    /// Regular desired headway in s.
    pub t_max: f64,
    /// Shortest desired headway in s.
    pub t_min: f64,
    /// Headway relaxation time in s.
    pub tau: f64,
    /// Lane change desire thresholds.
    pub d_free: f64,
    pub d_sync: f64,
    pub d_coop: f64,
    /// Route desire look-ahead time per lane change, in s.
    pub t0: f64,
    /// Route desire look-ahead distance per lane change, and anticipation distance, in m.
    pub x0: f64,
    /// Speed difference yielding a speed desire of 1, in m/s.
    pub v_gain: f64,
    /// Speed below which traffic is considered congested, in m/s.
    pub v_cong: f64,
    /// Deceleration accepted at a desire of 1, in m/s<sup>2</sup>.
    pub b_safe: f64,
    /// Deceleration accepted to stop for an amber light, in m/s<sup>2</sup>.
    pub b_yellow: f64,
    /// Maximum acceleration near intersections in m/s<sup>2</sup>.
    pub a_inter: f64,
    /// Distance within which road-side units are noticed, in m.
    pub range: f64,
    /// Factor on the speed limit giving the desired speed.
    pub f_speed: f64,
    /// Regular lane change duration in s.
    pub duration: f64,
    /// Safety factor on estimated times at conflicts.
    pub est_time_factor: f64,
    /// Stopping distance at conflicts in m.
    pub s0_conflict: f64,
    /// Deceleration before a lane change that can no longer be made, in m/s<sup>2</sup>.
    pub b_dead_end: f64,
    /// Whether a vehicle with priority may yield at conflicts.
    pub yield_with_priority: bool,
}

impl Default for DriverParams {
    fn default() -> Self {
        Self {
            s0: 3.0,
            a: 1.25,
            b: 2.09,
            b0: 0.5,
            t_max: 1.2,
            t_min: 0.56,
            tau: 25.0,
            d_free: 0.365,
            d_sync: 0.577,
            d_coop: 0.788,
            t0: 43.0,
            x0: 295.0,
            v_gain: 69.6 / 3.6,
            v_cong: 60.0 / 3.6,
            b_safe: 2.09,
            b_yellow: 3.5,
            a_inter: 2.0,
            range: 300.0,
            f_speed: 1.0,
            duration: 3.0,
            est_time_factor: 1.75,
            s0_conflict: 0.5,
            b_dead_end: 5.0,
            yield_with_priority: true,
        }
    }
}

impl DriverParams {
    /// The car following parameters with the regular headway.
    pub fn idm(&self) -> Idm {
        Idm {
            s0: self.s0,
            a: self.a,
            b: self.b,
            b0: self.b0,
            t: self.t_max,
        }
    }
}

/// The behaviour of a single vehicle.
#[derive(Clone, Debug)]
pub struct Driver {
    params: DriverParams,
    /// The current, relaxing, desired headway in s.
    t: f64,
    /// The maximum acceleration for this step.
    a: f64,
    /// The acceleration decided so far this step.
    acc: Option<f64>,
    d_left: f64,
    d_right: f64,
    d_left_int: f64,
    d_right_int: f64,
    memo: StepMemo,
    conflicts: ConflictState,
}

/// What a driver decided during one step.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct Decision {
    pub a: f64,
    pub indicator: Option<Side>,
    /// Start a lane change towards a side at the given progress rate per step.
    pub lane_change: Option<(Side, f64)>,
    /// Shorten the headway of the new follower for a lane change desire.
    pub follower_headway: Option<(MovableId, f64)>,
}

/// A read-only view of the simulation state during the decision phase.
pub(crate) struct World<'a> {
    pub network: &'a Network,
    pub rsus: &'a RsuSet,
    pub movables: &'a MovableSet,
    /// The drivers of all vehicles but the one deciding.
    pub drivers: &'a SecondaryMap<MovableId, Driver>,
    pub step: u64,
    pub dt: f64,
}

impl<'a> World<'a> {
    pub fn movable(&self, id: MovableId) -> &'a Movable {
        &self.movables[id]
    }

    pub fn neighbor(&self, id: MovableId, dir: Direction) -> Option<MovableId> {
        self.movables[id].neighbor(dir)
    }

    pub fn headway(&self, from: MovableId, to: MovableId) -> f64 {
        headway(self.network, self.movables, from, to)
    }

    pub fn distance_to_rsu(&self, id: MovableId, rsu: RsuId) -> f64 {
        distance_to_rsu(self.network, self.movables, self.rsus, id, rsu)
    }

    /// The vehicle a movable belongs to.
    pub fn vehicle(&self, id: MovableId) -> &'a Vehicle {
        let owner = self.movables[id].owner();
        self.movables
            .get(owner)
            .and_then(|m| m.vehicle())
            .unwrap_or_else(|| panic!("movable {:?} refers to missing vehicle {:?}", id, owner))
    }

    /// The driver of the vehicle a movable belongs to.
    fn driver(&self, id: MovableId) -> &'a Driver {
        let owner = self.movables[id].owner();
        self.drivers.get(owner).unwrap_or_else(|| {
            panic!(
                "no driver bound to vehicle {:?}; the movable graph refers to a removed vehicle",
                owner
            )
        })
    }
}

/// The parameters of another driver relevant to this one.
#[derive(Clone, Copy, Debug)]
pub(crate) struct DriverView {
    pub idm: Idm,
    pub t_min: f64,
    pub t_max: f64,
    pub desired_velocity: f64,
    pub d_left: f64,
    pub d_right: f64,
    pub blocked: bool,
}

impl DriverView {
    pub fn desire(&self, side: Side) -> f64 {
        match side {
            Side::Left => self.d_left,
            Side::Right => self.d_right,
        }
    }

    /// Car following parameters with the headway shortened for a lane change desire.
    pub fn idm_for_desire(&self, desire: f64) -> Idm {
        let t = shortened_headway(self.idm.t, self.t_min, self.t_max, desire);
        self.idm.with_headway(t)
    }
}

/// The headway interpolated between `t_max` and `t_min` by desire; never longer than `t`.
fn shortened_headway(t: f64, t_min: f64, t_max: f64, desire: f64) -> f64 {
    let desire = desire.clamp(0.0, 1.0);
    f64::min(t, desire * t_min + (1.0 - desire) * t_max)
}

impl Driver {
    pub fn new(params: DriverParams) -> Self {
        Self {
            params,
            t: params.t_max,
            a: params.a,
            acc: None,
            d_left: 0.0,
            d_right: 0.0,
            d_left_int: 0.0,
            d_right_int: 0.0,
            memo: Default::default(),
            conflicts: Default::default(),
        }
    }

    pub fn params(&self) -> &DriverParams {
        &self.params
    }

    /// The current desired headway in s.
    pub fn headway(&self) -> f64 {
        self.t
    }

    /// The lane change desire towards a side.
    pub fn desire(&self, side: Side) -> f64 {
        match side {
            Side::Left => self.d_left,
            Side::Right => self.d_right,
        }
    }

    /// Whether the driver is waiting at a conflict that the competitor blocks.
    pub fn is_blocked(&self) -> bool {
        self.conflicts.blocked
    }

    /// The current car following parameters.
    fn idm(&self) -> Idm {
        Idm {
            s0: self.params.s0,
            a: self.a,
            b: self.params.b,
            b0: self.params.b0,
            t: self.t,
        }
    }

    fn view(&self, world: &World, id: MovableId) -> DriverView {
        DriverView {
            idm: self.idm(),
            t_min: self.params.t_min,
            t_max: self.params.t_max,
            desired_velocity: self.desired_velocity(world, id),
            d_left: self.d_left,
            d_right: self.d_right,
            blocked: self.conflicts.blocked,
        }
    }

    /// A view of the driver of movable `other`, which may be this driver itself.
    fn view_of(&self, world: &World, me: MovableId, other: MovableId) -> DriverView {
        if world.movable(other).owner() == me {
            self.view(world, other)
        } else {
            world.driver(other).view(world, other)
        }
    }

    /// Shortens the headway for a lane change desire; it relaxes back over time.
    pub(crate) fn shorten_headway(&mut self, desire: f64) {
        self.t = shortened_headway(self.t, self.params.t_min, self.params.t_max, desire);
    }

    /// Runs `f` with the headway shortened for a lane change desire, then restores it.
    fn with_desire<R>(&mut self, desire: f64, f: impl FnOnce(&mut Self) -> R) -> R {
        let saved = self.t;
        self.shorten_headway(desire);
        let result = f(self);
        self.t = saved;
        result
    }

    /// The desired speed of movable `id` on its current lane.
    fn desired_velocity(&self, world: &World, id: MovableId) -> f64 {
        let lane = &world.network[world.movable(id).lane];
        self.desired_velocity_on(world.vehicle(id), lane.speed_limit())
    }

    pub(crate) fn desired_velocity_on(&self, vehicle: &Vehicle, speed_limit: f64) -> f64 {
        f64::min(vehicle.max_speed, self.params.f_speed * speed_limit)
    }

    /// Lowers the acceleration of this step to `acc`. The first call in a step sets it.
    fn lower_acceleration(&mut self, acc: f64) {
        self.acc = Some(self.acc.map_or(acc, |current| current.min(acc)));
    }

    /// The car following acceleration of vehicle `id` towards `leader` with the
    /// current parameters, memoised per step.
    fn acceleration(
        &mut self,
        world: &World,
        id: MovableId,
        leader: Option<MovableId>,
        label: AccLabel,
    ) -> f64 {
        let idm = self.idm();
        if let Some(acc) = self.memo.acc(leader, label, idm.key()) {
            return acc;
        }
        let me = world.movable(id);
        let v0 = self.desired_velocity(world, id);
        let acc = match leader {
            Some(leader) => {
                let dv = me.v - world.movable(leader).v;
                idm.longitudinal(me.v, dv, v0, world.headway(id, leader))
            }
            None => idm.longitudinal(me.v, 0.0, v0, f64::INFINITY),
        };
        self.memo.store_acc(leader, label, idm.key(), acc);
        acc
    }

    /// Acceleration limited to no harsher than the safe deceleration.
    fn safe(&self, acc: f64) -> f64 {
        f64::max(acc, -self.params.b_safe)
    }

    /// Decides the acceleration and lateral behaviour of vehicle `id` for this step.
    pub(crate) fn drive(&mut self, world: &World, id: MovableId) -> Decision {
        self.memo.begin(world.step);
        self.acc = None;
        let mut decision = Decision::default();

        self.notice_rsus(world, id);

        let me = world.movable(id);
        let vehicle = world.vehicle(id);
        if let Some(lc) = vehicle.lane_change {
            decision.indicator = Some(lc.side);
            let leader = me.neighbor(Direction::Down);
            let acc = self.acceleration(world, id, leader, AccLabel::Follow);
            self.lower_acceleration(acc);
            let shadow_leader = world
                .movables
                .get(lc.shadow)
                .and_then(|shadow| shadow.neighbor(Direction::Down))
                .filter(|leader| world.movable(*leader).owner() != id);
            let acc = self.acceleration(world, id, shadow_leader, AccLabel::Follow);
            self.lower_acceleration(acc);
        } else {
            self.relax_headway(world.dt);
            let lane = &world.network[me.lane];
            if me.x <= GENERATOR_ZONE && lane.has_generator() {
                self.d_left = 0.0;
                self.d_right = 0.0;
            } else {
                self.lane_change_model(world, id, &mut decision);
            }
            self.follow(world, id);
        }

        self.dead_end(world, id);

        decision.a = self.acc.unwrap_or(0.0);
        decision
    }

    /// Relaxes the headway towards its regular value.
    fn relax_headway(&mut self, dt: f64) {
        let p = &self.params;
        self.t += (p.t_max - self.t) * dt / f64::max(p.tau, dt);
    }

    /// Follows the leader, synchronises with the target lane and yields to
    /// vehicles that want to change into this lane.
    fn follow(&mut self, world: &World, id: MovableId) {
        let me = world.movable(id);
        let leader = me
            .neighbor(Direction::Down)
            .filter(|_| !self.conflicts.ignore_leader);
        let acc = self.acceleration(world, id, leader, AccLabel::Follow);
        self.lower_acceleration(acc);

        let p = self.params;
        let left_leader = me.neighbor(Direction::LeftDown);
        let right_leader = me.neighbor(Direction::RightDown);
        let sync = if self.d_left >= p.d_sync && self.d_left >= self.d_right {
            left_leader.map(|leader| (leader, self.d_left))
        } else if self.d_right >= p.d_sync && self.d_right > self.d_left {
            right_leader.map(|leader| (leader, self.d_right))
        } else {
            None
        };
        if let Some((leader, desire)) = sync {
            let acc = self.with_desire(desire, |driver| {
                driver.acceleration(world, id, Some(leader), AccLabel::Sync)
            });
            self.lower_acceleration(self.safe(acc));
        }

        for side in [Side::Left, Side::Right] {
            let Some(leader) = me.neighbor(Direction::down(side)) else {
                continue;
            };
            let other = world.movable(leader);
            let towards_me = side.opposite();
            if other.neighbor(Direction::up(towards_me)) != Some(id)
                || other.indicator != Some(towards_me)
            {
                continue;
            }
            let desire = self.view_of(world, id, leader).desire(towards_me);
            let acc = self.with_desire(desire, |driver| {
                driver.acceleration(world, id, Some(leader), AccLabel::Yield)
            });
            self.lower_acceleration(self.safe(acc));
        }
    }

    /// Brakes for the end of the lane when lane changes are still required.
    fn dead_end(&mut self, world: &World, id: MovableId) {
        let me = world.movable(id);
        let lane = &world.network[me.lane];
        let route = world.vehicle(id).route;
        if route.n_lane_changes(lane) == 0 {
            return;
        }
        let x_remain = route.x_lane_changes(lane) - me.x - self.params.s0;
        if x_remain <= 0.0 {
            return;
        }
        let b_min = 0.5 * me.v * me.v / x_remain;
        if b_min >= self.params.b_dead_end {
            self.lower_acceleration(-b_min * b_min / self.params.b_dead_end);
        }
    }
}

#[cfg(test)]
pub(super) mod test {
    use super::*;
    use crate::math::{LineSegment2d, Point2d};
    use crate::{LaneAttributes, LaneChangeRule, LaneId, Route, Simulation, SimulationConfig, VehicleClass};
    use assert_approx_eq::assert_approx_eq;

    pub(super) fn sim() -> Simulation {
        Simulation::new(SimulationConfig {
            dt: 0.5,
            ..Default::default()
        })
        .unwrap()
    }

    /// A straight lane with a speed limit of 20 m/s.
    pub(super) fn straight(sim: &mut Simulation, from: (f64, f64), to: (f64, f64)) -> LaneId {
        sim.add_lane(&LaneAttributes {
            curve: &LineSegment2d::from_ends(Point2d::new(from.0, from.1), Point2d::new(to.0, to.1)),
            speed_limit: 20.0,
        })
        .unwrap()
    }

    pub(super) fn spawn(sim: &mut Simulation, lane: LaneId, x: f64, v: f64) -> MovableId {
        spawn_routed(sim, lane, x, v, Route::Free)
    }

    pub(super) fn spawn_routed(
        sim: &mut Simulation,
        lane: LaneId,
        x: f64,
        v: f64,
        route: Route,
    ) -> MovableId {
        sim.spawn_vehicle(lane, x, v, &VehicleClass::default(), route)
            .unwrap()
    }

    /// Two parallel lanes of the given length, left and right, that allow
    /// lane changes both ways.
    pub(super) fn two_lanes(sim: &mut Simulation, length: f64) -> (LaneId, LaneId) {
        let left = straight(sim, (0.0, 3.5), (length, 3.5));
        let right = straight(sim, (0.0, 0.0), (length, 0.0));
        sim.connect_lateral(left, right, LaneChangeRule::Both).unwrap();
        (left, right)
    }

    /// Two 300 m lanes, each continued by another 300 m lane. Only the left
    /// lanes lead to destination 1.
    fn lane_drop(sim: &mut Simulation) -> (LaneId, LaneId) {
        let (left, right) = two_lanes(sim, 300.0);
        let left_next = straight(sim, (300.0, 3.5), (600.0, 3.5));
        let right_next = straight(sim, (300.0, 0.0), (600.0, 0.0));
        sim.connect(left, left_next).unwrap();
        sim.connect(right, right_next).unwrap();
        sim.set_destination(left_next, 1).unwrap();
        (left, right)
    }

    #[test]
    fn shortened_headway_follows_desire() {
        assert_approx_eq!(shortened_headway(1.2, 0.56, 1.2, 0.0), 1.2);
        assert_approx_eq!(shortened_headway(1.2, 0.56, 1.2, 1.0), 0.56);
        assert_approx_eq!(shortened_headway(1.2, 0.56, 1.2, 0.5), 0.88);
        assert_approx_eq!(shortened_headway(1.2, 0.56, 1.2, 3.0), 0.56);
        assert_approx_eq!(shortened_headway(1.2, 0.56, 1.2, -1.0), 1.2);
        // Never lengthens a headway that is already shorter
        assert_approx_eq!(shortened_headway(0.7, 0.56, 1.2, 0.5), 0.7);
    }

    #[test]
    fn scoped_headway_is_restored() {
        let mut driver = Driver::new(DriverParams::default());
        let t = driver.with_desire(1.0, |driver| driver.headway());
        assert_approx_eq!(t, 0.56);
        assert_approx_eq!(driver.headway(), 1.2);
    }

    #[test]
    fn headway_relaxes_towards_regular_value() {
        let mut driver = Driver::new(DriverParams::default());
        driver.shorten_headway(1.0);
        assert_approx_eq!(driver.headway(), 0.56);
        driver.relax_headway(0.5);
        assert_approx_eq!(driver.headway(), 0.56 + 0.64 * 0.5 / 25.0);
        for _ in 0..2000 {
            driver.relax_headway(0.5);
        }
        assert_approx_eq!(driver.headway(), 1.2, 1e-3);
    }

    #[test]
    fn brakes_for_lane_change_that_cannot_be_made() {
        let mut sim = sim();
        let (left, right) = lane_drop(&mut sim);
        let veh = spawn_routed(&mut sim, right, 270.0, 20.0, Route::Destination(1));
        // Blocks the gap on the left lane
        spawn(&mut sim, left, 271.0, 20.0);

        sim.step();
        let p = DriverParams::default();
        let b_min = 0.5 * 20.0 * 20.0 / (300.0 - 270.0 - p.s0);
        assert!(b_min >= p.b_dead_end);
        let m = sim.movable(veh).unwrap();
        assert_approx_eq!(m.acceleration(), -b_min * b_min / p.b_dead_end);
        assert!(sim.vehicle(veh).unwrap().lane_change().is_none());
    }

    #[test]
    fn no_dead_end_braking_within_stopping_distance_of_the_end() {
        let mut sim = sim();
        let (left, right) = lane_drop(&mut sim);
        let veh = spawn_routed(&mut sim, right, 297.5, 15.0, Route::Destination(1));
        spawn(&mut sim, left, 299.0, 15.0);

        sim.step();
        // Only synchronising with the blocking vehicle slows it down
        let p = DriverParams::default();
        let m = sim.movable(veh).unwrap();
        assert_approx_eq!(m.acceleration(), -p.b_safe);
        assert!(m.velocity() > 10.0);
    }
}
