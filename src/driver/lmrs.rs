//! Lane change desire, gap acceptance and the anticipated speed per lane.

use super::memo::AccLabel;
use super::{Decision, Driver, World};
use crate::movable::graph::find_down;
use crate::movable::{Direction, Side};
use crate::network::Lane;
use crate::{LaneId, MovableId};

/// Reference speed to derive the duration of a lane change close to the
/// point where it must be completed, in m/s.
const LANE_CHANGE_SPEED: f64 = 180.0 / 3.6;

/// Shortest lane change duration in s.
const MIN_LANE_CHANGE_DURATION: f64 = 0.1;

/// The maximum number of leaders scanned for the anticipated speed.
const MAX_SCANNED: usize = 100;

impl Driver {
    /// Computes the lane change desires and decides whether to change lanes
    /// or to indicate.
    pub(super) fn lane_change_model(&mut self, world: &World, id: MovableId, decision: &mut Decision) {
        let p = self.params;
        let me = world.movable(id);
        let lane = &world.network[me.lane];
        let left = lane.side(Side::Left);
        let right = lane.side(Side::Right);

        let (d_left_route, d_right_route) = self.route_desires(world, id);

        // Speed gain
        let v_left = left.map_or(0.0, |l| self.anticipated_speed(world, id, l));
        let v_cur = self.anticipated_speed(world, id, me.lane);
        let v_right = right.map_or(0.0, |l| self.anticipated_speed(world, id, l));
        let leader = me.neighbor(Direction::Down);
        let a_follow = self.acceleration(world, id, leader, AccLabel::Follow);
        let a_gain = (self.a - a_follow.max(0.0)) / self.a;
        let d_left_speed = if lane.can_change(Side::Left) && left.is_some() {
            a_gain * (v_left - v_cur) / p.v_gain
        } else {
            0.0
        };
        let d_right_speed = if lane.can_change(Side::Right) && right.is_some() {
            let dv = if v_cur >= p.v_cong {
                f64::min(v_right - v_cur, 0.0)
            } else {
                v_right - v_cur
            };
            a_gain * dv / p.v_gain
        } else {
            0.0
        };

        // Keep right
        let v_desired = self.desired_velocity(world, id);
        let d_right_bias = if right.is_some() && v_right == v_desired && d_right_route >= 0.0 {
            p.d_free
        } else {
            0.0
        };

        let d_left_voluntary = d_left_speed + self.d_left_int;
        let d_right_voluntary = d_right_speed + d_right_bias + self.d_right_int;
        self.d_left = d_left_route + self.voluntary_weight(d_left_route, d_left_voluntary) * d_left_voluntary;
        self.d_right =
            d_right_route + self.voluntary_weight(d_right_route, d_right_voluntary) * d_right_voluntary;

        let accept_left = self.accept_gap(world, id, Side::Left, self.d_left);
        let accept_right = self.accept_gap(world, id, Side::Right, self.d_right);
        let (d_left, d_right) = (self.d_left, self.d_right);
        if d_left >= d_right && d_left >= p.d_free && accept_left {
            self.start_lane_change(world, id, Side::Left, d_left, decision);
        } else if d_right >= d_left && d_right >= p.d_free && accept_right {
            self.start_lane_change(world, id, Side::Right, d_right, decision);
        } else if d_left >= d_right && d_left >= p.d_coop {
            decision.indicator = Some(Side::Left);
        } else if d_right > d_left && d_right >= p.d_coop {
            decision.indicator = Some(Side::Right);
        }
    }

    /// The desire to leave a lane given the distance left to do `n` lane changes.
    fn route_desire(&self, x_remaining: f64, n: u32, v: f64) -> f64 {
        if n == 0 {
            return 0.0;
        }
        let n = n as f64;
        let by_distance = 1.0 - x_remaining / (n * self.params.x0);
        let by_time = 1.0 - (x_remaining / v) / (n * self.params.t0);
        by_distance.max(by_time).max(0.0)
    }

    /// The mandatory desire to change left and right.
    fn route_desires(&self, world: &World, id: MovableId) -> (f64, f64) {
        let network = world.network;
        let me = world.movable(id);
        let route = world.vehicle(id).route;
        let lane = &network[me.lane];
        let on_taper = |lane: &Lane| {
            lane.taper()
                .map_or(false, |taper| route.can_be_followed_from(&network[taper]))
        };

        let d_cur = self.route_desire(
            route.x_lane_changes(lane) - me.x,
            route.n_lane_changes(lane),
            me.v,
        );

        let side_desire = |side: Side, d_cur: f64, taper_rule: bool| {
            let Some(other) = lane.side(side) else {
                return f64::NEG_INFINITY;
            };
            let other = &network[other];
            if !route.can_be_followed_from(other) {
                return f64::NEG_INFINITY;
            }
            let d_other = if taper_rule && on_taper(other) {
                0.0
            } else {
                let x = network.adjacent_x(me.lane, side, me.x).unwrap_or(me.x);
                self.route_desire(
                    route.x_lane_changes(other) - x,
                    route.n_lane_changes(other),
                    me.v,
                )
            };
            if d_other < d_cur {
                d_cur
            } else if d_other > d_cur {
                -d_other
            } else {
                0.0
            }
        };

        let d_cur_right = if on_taper(lane) { 0.0 } else { d_cur };
        (
            side_desire(Side::Left, d_cur, true),
            side_desire(Side::Right, d_cur_right, false),
        )
    }

    /// How much of the voluntary desire is added to the route desire.
    fn voluntary_weight(&self, route: f64, voluntary: f64) -> f64 {
        let p = &self.params;
        if route * voluntary >= 0.0 || route.abs() <= p.d_sync {
            1.0
        } else if route.abs() < p.d_coop {
            (p.d_coop - route.abs()) / (p.d_coop - p.d_sync)
        } else {
            0.0
        }
    }

    /// Whether the gap on the given side is acceptable at the given desire.
    fn accept_gap(&mut self, world: &World, id: MovableId, side: Side, desire: f64) -> bool {
        let me = world.movable(id);
        let lane = &world.network[me.lane];
        let Some(target) = lane.side(side) else {
            return false;
        };
        if !lane.can_change(side) {
            return false;
        }
        let threshold = -self.params.b_safe * desire;

        let a_self = match me.neighbor(Direction::down(side)) {
            Some(leader) if world.headway(id, leader) > 0.0 => self.with_desire(desire, |driver| {
                driver.acceleration(world, id, Some(leader), AccLabel::Gap)
            }),
            Some(_) => f64::NEG_INFINITY,
            None => self.split_acceleration(world, id, target, desire),
        };
        if a_self < threshold {
            return false;
        }

        let a_follower = match me.neighbor(Direction::up(side)) {
            Some(follower) => {
                let s = world.headway(follower, id);
                if s > 0.0 {
                    let view = self.view_of(world, id, follower);
                    let f = world.movable(follower);
                    view.idm_for_desire(desire)
                        .longitudinal(f.v, f.v - me.v, view.desired_velocity, s)
                } else {
                    f64::NEG_INFINITY
                }
            }
            None if self.merge_just_upstream(world, id, side, target) => f64::NEG_INFINITY,
            None => 0.0,
        };
        a_follower >= threshold
    }

    /// Acceleration towards the most critical leader on the branches of a
    /// target lane that splits, or 0 if the target lane does not split.
    fn split_acceleration(&mut self, world: &World, id: MovableId, target: LaneId, desire: f64) -> f64 {
        let lane = &world.network[target];
        if !lane.is_split() {
            return 0.0;
        }
        let me = world.movable(id);
        let none = |_: MovableId| false;
        let mut critical: Option<(MovableId, f64)> = None;
        for branch in lane.downs() {
            let Some(leader) = find_down(world.network, world.movables, *branch, 0.0, &none) else {
                continue;
            };
            let s = world.headway(id, leader);
            if s < 0.0 {
                return f64::NEG_INFINITY;
            }
            let dv = me.v - world.movable(leader).v;
            let ttc = if dv > 0.0 { s / dv } else { f64::INFINITY };
            if critical.map_or(true, |(_, best)| ttc < best) {
                critical = Some((leader, ttc));
            }
        }
        match critical {
            Some((leader, _)) => self.with_desire(desire, |driver| {
                driver.acceleration(world, id, Some(leader), AccLabel::Gap)
            }),
            None => 0.0,
        }
    }

    /// Whether the target lane starts at a merge so close upstream that a
    /// follower on another branch cannot be seen.
    fn merge_just_upstream(&self, world: &World, id: MovableId, side: Side, target: LaneId) -> bool {
        let me = world.movable(id);
        let Some((_, offset)) = world.network.upstream_merge(target) else {
            return false;
        };
        let x = world.network.adjacent_x(me.lane, side, me.x).unwrap_or(me.x);
        offset + x < world.network[target].speed_limit() * self.params.t_max
    }

    fn start_lane_change(
        &mut self,
        world: &World,
        id: MovableId,
        side: Side,
        desire: f64,
        decision: &mut Decision,
    ) {
        let me = world.movable(id);
        let lane = &world.network[me.lane];
        let x_lc = world.vehicle(id).route.x_lane_changes(lane);
        let duration = f64::max(
            MIN_LANE_CHANGE_DURATION,
            f64::min((x_lc - me.x) / LANE_CHANGE_SPEED, self.params.duration),
        );
        decision.lane_change = Some((side, world.dt / duration));
        decision.indicator = Some(side);
        self.shorten_headway(desire);

        if let Some(follower) = me.neighbor(Direction::up(side)) {
            if world.neighbor(follower, Direction::down(side.opposite())) == Some(id) {
                decision.follower_headway = Some((follower, desire));
            }
        }
    }

    /// The speed to anticipate on a lane, given the slower leaders within
    /// the anticipation distance and vehicles indicating towards the lane.
    pub(super) fn anticipated_speed(&mut self, world: &World, id: MovableId, lane: LaneId) -> f64 {
        let me = world.movable(id);
        let network = world.network;
        let x = if lane == me.lane {
            me.x + 0.001
        } else if network[me.lane].side(Side::Left) == Some(lane) {
            network.adjacent_x(me.lane, Side::Left, me.x).unwrap_or(me.x)
        } else {
            network.adjacent_x(me.lane, Side::Right, me.x).unwrap_or(me.x)
        };

        if !self.memo.speeds.in_lane.contains_key(&lane) {
            self.scan_lane(world, id, lane, x);
        }
        let v_cur = self.memo.speeds.in_lane[&lane];

        let v_from_left = match network[lane].side(Side::Left) {
            Some(left) => {
                if !self.memo.speeds.in_lane.contains_key(&left) {
                    let x = network.adjacent_x(lane, Side::Left, x).unwrap_or(x);
                    self.scan_lane(world, id, left, x);
                }
                self.memo.speeds.from_left.get(&lane).copied().unwrap_or(f64::INFINITY)
            }
            None => f64::INFINITY,
        };
        let v_from_right = match network[lane].side(Side::Right) {
            Some(right) => {
                if !self.memo.speeds.in_lane.contains_key(&right) {
                    let x = network.adjacent_x(lane, Side::Right, x).unwrap_or(x);
                    self.scan_lane(world, id, right, x);
                }
                self.memo.speeds.from_right.get(&lane).copied().unwrap_or(f64::INFINITY)
            }
            None => f64::INFINITY,
        };

        v_cur.min(v_from_left).min(v_from_right)
    }

    /// Scans the leaders on `lane` from position `x` and stores the speeds
    /// they impose on the lane and, through their indicators, on its neighbours.
    fn scan_lane(&mut self, world: &World, id: MovableId, lane: LaneId, x: f64) {
        let me = world.movable(id);
        let x0 = self.params.x0;
        let v0 = self.desired_velocity(world, id);
        let (mut v_left, mut v_cur, mut v_right) = (v0, v0, v0);

        let is_me = |other: MovableId| world.movable(other).owner() == id;
        let mut down = find_down(world.network, world.movables, lane, x, &is_me);
        for _ in 0..MAX_SCANNED {
            let Some(leader) = down else { break };
            let other = world.movable(leader);
            let Some(pos) = world.network.relative_x(lane, other.lane, other.x) else {
                break;
            };
            let s = f64::max(pos - other.length - x, 0.0);
            if s > x0 {
                break;
            }
            if other.v < v0 && !is_me(leader) {
                let v = (1.0 - s / x0) * other.v + (s / x0) * v0;
                v_cur = v_cur.min(v);
                if lane != me.lane {
                    match other.indicator {
                        Some(Side::Left) => v_left = v_left.min(v),
                        Some(Side::Right) => v_right = v_right.min(v),
                        None => {}
                    }
                }
            }
            down = other.neighbor(Direction::Down);
        }

        let lanes = &world.network[lane];
        let speeds = &mut self.memo.speeds;
        if let Some(right) = lanes.side(Side::Right) {
            speeds.from_left.insert(right, v_right);
        }
        if let Some(left) = lanes.side(Side::Left) {
            speeds.from_right.insert(left, v_left);
        }
        speeds.in_lane.insert(lane, v_cur);
    }
}

#[cfg(test)]
mod test {
    use crate::driver::test::{sim, spawn, spawn_routed, two_lanes};
    use crate::driver::{Driver, DriverParams};
    use crate::{Direction, Route, Side};
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn voluntary_weight_phases_out_between_sync_and_coop() {
        let driver = Driver::new(DriverParams::default());
        // Agreeing in sign, or a weak route desire
        assert_approx_eq!(driver.voluntary_weight(0.7, 0.3), 1.0);
        assert_approx_eq!(driver.voluntary_weight(0.2, -0.5), 1.0);
        assert_approx_eq!(driver.voluntary_weight(0.0, 0.4), 1.0);
        // Opposing, partially included
        let expected = (0.788 - 0.7) / (0.788 - 0.577);
        assert_approx_eq!(driver.voluntary_weight(0.7, -0.3), expected);
        assert_approx_eq!(driver.voluntary_weight(-0.7, 0.3), expected);
        // Opposing a strong route desire
        assert_approx_eq!(driver.voluntary_weight(0.9, -0.3), 0.0);
        assert_approx_eq!(driver.voluntary_weight(f64::NEG_INFINITY, 0.1), 0.0);
    }

    #[test]
    fn route_desire_by_distance_and_time() {
        let driver = Driver::new(DriverParams::default());
        assert_approx_eq!(driver.route_desire(10.0, 0, 20.0), 0.0);
        // Time dominates at speed
        assert_approx_eq!(driver.route_desire(295.0, 1, 30.0), 1.0 - (295.0 / 30.0) / 43.0);
        // Distance dominates when slow
        assert_approx_eq!(driver.route_desire(100.0, 2, 1.0), 1.0 - 100.0 / 590.0);
        assert_approx_eq!(driver.route_desire(100.0, 2, 10.0), 1.0 - 10.0 / 86.0);
        assert_approx_eq!(driver.route_desire(59.0, 1, 0.1), 0.8);
        // Far away
        assert_approx_eq!(driver.route_desire(1000.0, 1, 10.0), 0.0);
    }

    #[test]
    fn keeps_right_on_an_empty_road() {
        let mut sim = sim();
        let (left, right) = two_lanes(&mut sim, 1000.0);
        let veh = spawn(&mut sim, left, 200.0, 20.0);

        sim.step();
        let driver = sim.driver(veh).unwrap();
        assert_approx_eq!(driver.desire(Side::Right), driver.params().d_free);
        let lc = sim.vehicle(veh).unwrap().lane_change().unwrap();
        assert_eq!(lc.side, Side::Right);
        assert_eq!(sim.movable(lc.shadow).unwrap().lane(), right);
    }

    /// The desire to the right of a vehicle at 20 m/s on the left lane,
    /// behind a leader at the given speed.
    fn right_desire_behind(v_leader: f64) -> f64 {
        let mut sim = sim();
        let (left, _) = two_lanes(&mut sim, 1000.0);
        let veh = spawn(&mut sim, left, 200.0, 20.0);
        spawn(&mut sim, left, 240.0, v_leader);
        sim.step();
        sim.driver(veh).unwrap().desire(Side::Right)
    }

    #[test]
    fn no_overtaking_on_the_right() {
        let p = DriverParams::default();
        // Free flow: the faster right lane only adds the keep right bias
        assert_approx_eq!(right_desire_behind(18.0), p.d_free);
        // Congested: the speed gain on the right counts
        assert!(right_desire_behind(10.0) > p.d_free + 0.3);
    }

    #[test]
    fn synchronises_with_leader_on_target_lane() {
        let mut sim = sim();
        let (left, right) = two_lanes(&mut sim, 300.0);
        sim.set_destination(left, 1).unwrap();
        let veh = spawn_routed(&mut sim, right, 100.0, 15.0, Route::Destination(1));
        spawn(&mut sim, left, 124.0, 12.0);
        // Too close behind to accept the gap
        spawn(&mut sim, left, 99.0, 15.0);

        sim.step();
        let driver = sim.driver(veh).unwrap();
        let p = *driver.params();
        let desire = driver.desire(Side::Left);
        assert!(desire >= p.d_sync && desire < p.d_coop);
        assert!(sim.vehicle(veh).unwrap().lane_change().is_none());

        let t = desire * p.t_min + (1.0 - desire) * p.t_max;
        let sync = p.idm().with_headway(t).longitudinal(15.0, 3.0, 20.0, 20.0);
        assert!(sync < 0.0 && sync > -p.b_safe);
        let m = sim.movable(veh).unwrap();
        assert_approx_eq!(m.acceleration(), sync, 0.05);
        assert_eq!(m.indicator(), None);
    }

    #[test]
    fn yields_to_vehicle_indicating_towards_its_lane() {
        let mut sim = sim();
        let (left, right) = two_lanes(&mut sim, 300.0);
        sim.set_destination(left, 1).unwrap();
        let merging = spawn_routed(&mut sim, right, 200.0, 15.0, Route::Destination(1));
        let veh = spawn(&mut sim, left, 198.0, 15.0);

        // The gap is rejected, so the merging vehicle only indicates
        sim.step();
        let m = sim.movable(merging).unwrap();
        assert_eq!(m.indicator(), Some(Side::Left));
        assert!(sim.vehicle(merging).unwrap().lane_change().is_none());
        assert!(sim.movable(veh).unwrap().acceleration() > 0.0);
        assert_eq!(sim.neighbor(veh, Direction::RightDown), Some(merging));

        sim.step();
        let p = DriverParams::default();
        assert_approx_eq!(sim.movable(veh).unwrap().acceleration(), -p.b_safe);
    }
}
