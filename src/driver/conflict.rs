//! Gap acceptance and yielding at conflicts between lanes.

use super::{anticipate, Driver, Idm, World};
use crate::movable::graph::find_up;
use crate::movable::Direction;
use crate::rsu::{ConflictKind, ConflictRsu};
use crate::{MovableId, RsuId};
use std::collections::HashMap;

/// The maximum number of vehicles on the other lane considered for following.
const MAX_FOLLOW_SCAN: usize = 32;

/// Conflict state of a driver. Everything but the yield plans is reset each step.
#[derive(Clone, Debug, Default)]
pub(crate) struct ConflictState {
    /// Waiting for a conflicting vehicle that is itself not moving.
    pub blocked: bool,
    /// Conflicts passed on the way that must not be stopped on.
    keep_clear: Vec<RsuId>,
    /// A stop was decided; conflicts further ahead are ignored.
    ignore_further: bool,
    /// The leader has already passed a merge conflict from the other lane.
    pub ignore_leader: bool,
    /// Vehicles this driver decided to yield to despite having priority.
    yield_plans: HashMap<RsuId, MovableId>,
}

impl ConflictState {
    pub fn begin_step(&mut self, world: &World) {
        self.blocked = false;
        self.keep_clear.clear();
        self.ignore_further = false;
        self.ignore_leader = false;
        self.yield_plans
            .retain(|rsu, plan| world.rsus.contains_key(*rsu) && world.movables.contains_key(*plan));
    }
}

impl Driver {
    /// Reacts to a conflict ahead: follows vehicles merging in front,
    /// decides on priority and gap acceptance, and stops when needed.
    pub(super) fn notice_conflict(
        &mut self,
        world: &World,
        id: MovableId,
        rsu_id: RsuId,
        conflict: &ConflictRsu,
        s_self: f64,
    ) {
        let rsu = &world.rsus[rsu_id];
        self.notice_speed_reduction(world, id, rsu.lane, None, s_self);

        let me = world.movable(id);
        let other_rsu = &world.rsus[conflict.other];
        let Some(other) = other_rsu.conflict() else {
            return;
        };
        let leader = me.neighbor(Direction::Down);

        if conflict.kind == ConflictKind::Merge {
            if let Some(up) = other.up {
                if Some(up) == leader && world.distance_to_rsu(up, conflict.other) < 0.0 {
                    self.conflicts.ignore_leader = true;
                }
            }
        }
        if self.conflicts.ignore_further {
            return;
        }

        self.notice_intersection(world, id, s_self);
        if conflict.keep_clear && s_self > conflict.length {
            self.conflicts.keep_clear.push(rsu_id);
        }

        let is_me = |other: MovableId| world.movable(other).owner() == id;
        let Some(first_up) = other.up.filter(|up| !is_me(*up)) else {
            return;
        };
        let mut s_other = world.distance_to_rsu(first_up, conflict.other);
        if s_other < -world.movable(first_up).length {
            return;
        }

        let p = self.params;
        let v = me.v;
        let v0 = self.desired_velocity(world, id);
        let leader_dist = leader.map(|l| world.headway(id, l) + world.movable(l).length);
        let mut up = Some(first_up);

        // Follow vehicles from the other lane that are on the conflict
        let leader_behind_conflict = leader_dist.map_or(true, |dist| dist > s_self - conflict.length);
        if conflict.kind != ConflictKind::Crossing
            && (s_self < conflict.length || leader_behind_conflict)
        {
            let mut follow = None;
            for i in 0..MAX_FOLLOW_SCAN {
                let Some(current) = up else { break };
                let other_m = world.movable(current);
                if is_me(current) {
                    up = None;
                    break;
                }
                s_other = world.distance_to_rsu(current, conflict.other);
                let s = s_self - other_m.length - s_other;
                if s <= -other_m.length || s_other >= conflict.length {
                    break;
                }
                follow = Some((current, s));
                up = if i == 0
                    && s_other < 0.0
                    && other_m.neighbor(Direction::Up).is_none()
                    && conflict.kind == ConflictKind::Merge
                {
                    let other_lane = &world.network[other_rsu.lane];
                    find_up(world.network, world.movables, other_lane.id(), other_lane.length(), &is_me)
                        .filter(|next| *next != current)
                } else {
                    other_m.neighbor(Direction::Up)
                };
            }
            if let Some((target, s_follow)) = follow {
                if conflict.kind == ConflictKind::Merge && s_follow < s_self - conflict.length {
                    self.stop_for_conflict(world, id, rsu_id, conflict, false, false);
                } else {
                    let dv = v - world.movable(target).v;
                    let acc = self.idm().longitudinal(v, dv, v0, s_follow);
                    self.lower_acceleration(acc);
                }
            }
        }

        let Some(up) = up.filter(|up| !is_me(*up)) else {
            return;
        };
        if conflict.kind == ConflictKind::Split || s_self < conflict.length {
            return;
        }

        let a_free = self.idm().free(v, v0);
        let d_merge = if conflict.kind == ConflictKind::Merge {
            -conflict.length
        } else {
            0.0
        };
        let up_m = world.movable(up);
        let up_view = self.view_of(world, id, up);
        let up_uses_conflict = world
            .vehicle(up)
            .route
            .can_be_followed_from(&world.network[other_rsu.lane]);
        // Distance the leader must travel to make room behind it past the conflict
        let leader_clearance = leader.zip(leader_dist).map(|(l, dist)| {
            let leader_m = world.movable(l);
            (s_self - dist + me.length + p.s0 + leader_m.length + d_merge, leader_m.v)
        });

        if conflict.priority {
            let plan = self.conflicts.yield_plans.get(&rsu_id).copied();
            let plan_expired = s_self < conflict.length
                || (v == 0.0 && up_m.v == 0.0)
                || plan.map_or(false, |plan| plan != up || Some(plan) == leader);
            if plan_expired {
                self.conflicts.yield_plans.remove(&rsu_id);
            }
            let plan = self.conflicts.yield_plans.get(&rsu_id).copied();

            let ttp_d = leader_clearance.map_or(0.0, |(s, v_leader)| anticipate(s, v_leader, 0.0));
            let tte_o = anticipate(s_self - conflict.length, v, 0.0);
            let is_first_up = s_self > conflict.length
                && leader_dist.map_or(true, |dist| s_self - dist < conflict.length);

            if p.yield_with_priority
                && !up_view.blocked
                && is_first_up
                && leader != plan
                && up_uses_conflict
                && (plan == Some(up) || (tte_o < ttp_d && up_m.v == 0.0))
            {
                self.stop_for_conflict(world, id, rsu_id, conflict, true, false);
                self.conflicts.yield_plans.insert(rsu_id, up);
            } else if conflict.kind == ConflictKind::Crossing && s_other < other.length {
                let ttc_c = anticipate(s_other + up_m.length + d_merge, up_m.v, 0.0);
                let s = s_self - conflict.length;
                let tte_o = anticipate(s, v, a_free);
                if tte_o < ttc_c && up_m.v > 0.0 {
                    let (stop, acc) = if ttc_c.is_infinite() {
                        (true, 0.0)
                    } else {
                        // Parabolic speed profile reaching the conflict as it clears
                        let acc = 2.0 * (s - p.s0_conflict - v * ttc_c) / (ttc_c * ttc_c);
                        (v / -acc < ttc_c, acc)
                    };
                    if stop {
                        self.stop_for_conflict(world, id, rsu_id, conflict, false, false);
                    } else {
                        self.lower_acceleration(acc);
                    }
                }
                if (ttc_c.is_infinite() || ttp_d.is_infinite()) && v == 0.0 {
                    self.conflicts.blocked = true;
                }
            }
            return;
        }

        // No priority
        let (mut ttp_d, mut ttp_d2) = (0.0, 0.0);
        if let Some((s, v_leader)) = leader_clearance {
            if conflict.keep_clear {
                ttp_d = anticipate(s, v_leader, 0.0);
            }
            if conflict.kind == ConflictKind::Crossing {
                ttp_d2 = anticipate(s, v_leader, -p.b);
            }
        }
        let ttc_o = anticipate(s_self + me.length + d_merge, v, a_free);
        let s = s_other - other.length;
        let tte_c = anticipate(s, up_m.v, up_m.a);
        let tte_c2 = anticipate(s, up_m.v, -p.b);
        let f = p.est_time_factor;

        let gap_ok = if conflict.visibility < s_self {
            false
        } else if !up_uses_conflict {
            true
        } else if conflict.kind == ConflictKind::Merge {
            // Time for the other vehicle to adapt its speed after the merge
            let v_other = up_m.v - p.b * ttc_o;
            let v_self = v + a_free * ttc_o;
            let t_dv = if v_self < v_other {
                (v_other - v_self) / p.b
            } else {
                0.0
            };
            ttc_o * f < tte_c && (ttc_o + t_dv) * f < tte_c2
        } else {
            ttp_d * f < tte_c && ttc_o * f < tte_c && ttp_d2 * f < tte_c2
        };

        if !gap_ok {
            self.stop_for_conflict(world, id, rsu_id, conflict, false, true);
            let ttc_c = anticipate(s_other - conflict.length, up_m.v, 0.0);
            if conflict.kind == ConflictKind::Crossing
                && v == 0.0
                && (ttp_d.is_infinite() || ttc_c.is_infinite())
            {
                self.conflicts.blocked = true;
            }
        }
    }

    /// Stops before the start of a conflict, or before an earlier keep-clear
    /// conflict when there is no room to stop between the two.
    ///
    /// A `safe` stop is only made if it needs no more than the comfortable
    /// deceleration. Any stop makes the driver ignore conflicts further ahead.
    fn stop_for_conflict(
        &mut self,
        world: &World,
        id: MovableId,
        rsu_id: RsuId,
        conflict: &ConflictRsu,
        safe: bool,
        stop_upstream: bool,
    ) {
        let me = world.movable(id);
        let rsu = &world.rsus[rsu_id];
        if stop_upstream {
            let keep_clear = self.conflicts.keep_clear.clone();
            for upstream_id in keep_clear {
                let upstream = &world.rsus[upstream_id];
                let Some(upstream_conflict) = upstream.conflict() else {
                    continue;
                };
                let Some(dx_lanes) = world.network.x_adj(upstream.lane, rsu.lane) else {
                    continue;
                };
                if dx_lanes < 0.0 {
                    continue;
                }
                let dx = rsu.x - upstream.x + dx_lanes;
                if dx > 0.0 && dx - conflict.length < me.length + self.params.s0_conflict {
                    self.stop_for_conflict(world, id, upstream_id, upstream_conflict, safe, stop_upstream);
                    return;
                }
            }
        }

        let s = world.distance_to_rsu(id, rsu_id) - conflict.length;
        if s > 0.0 {
            let v0 = self.desired_velocity(world, id);
            let idm = Idm {
                s0: self.params.s0_conflict,
                ..self.idm()
            };
            let acc = idm.longitudinal(me.v, me.v, v0, s);
            if !safe || acc > -self.params.b {
                self.lower_acceleration(acc);
                self.conflicts.ignore_further = true;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use crate::driver::test::{sim, spawn, straight};
    use crate::driver::{DriverParams, Idm};
    use crate::rsu::{ConflictKind, ConflictSide};
    use crate::{LaneId, RsuId, Simulation};
    use assert_approx_eq::assert_approx_eq;

    fn side(lane: LaneId, end: f64, length: f64, priority: bool, keep_clear: bool) -> ConflictSide {
        ConflictSide {
            lane,
            end,
            length,
            priority,
            keep_clear,
            visibility: f64::INFINITY,
        }
    }

    struct Crossing {
        sim: Simulation,
        major: LaneId,
        minor: LaneId,
        /// The unit on the major lane.
        major_rsu: RsuId,
    }

    /// Two 200 m lanes crossing over 10 m, ending at 105 m on both.
    fn crossing(minor_keep_clear: bool) -> Crossing {
        let mut sim = sim();
        let major = straight(&mut sim, (0.0, 0.0), (200.0, 0.0));
        let minor = straight(&mut sim, (0.0, 50.0), (200.0, 50.0));
        let [major_rsu, _] = sim
            .add_conflict(
                ConflictKind::Crossing,
                side(major, 105.0, 10.0, true, false),
                side(minor, 105.0, 10.0, false, minor_keep_clear),
            )
            .unwrap();
        Crossing {
            sim,
            major,
            minor,
            major_rsu,
        }
    }

    /// Car following parameters once an intersection is noticed.
    fn intersection_idm(p: &DriverParams) -> Idm {
        Idm {
            a: p.a_inter,
            ..p.idm()
        }
    }

    /// Car following parameters for stopping before a conflict.
    fn stop_idm(p: &DriverParams) -> Idm {
        Idm {
            s0: p.s0_conflict,
            ..intersection_idm(p)
        }
    }

    #[test]
    fn crossing_gap_rejected() {
        let Crossing {
            mut sim,
            major,
            minor,
            ..
        } = crossing(false);
        let veh = spawn(&mut sim, minor, 80.0, 10.0);
        spawn(&mut sim, major, 85.0, 15.0);
        sim.step();

        let p = DriverParams::default();
        let expected = stop_idm(&p).longitudinal(10.0, 10.0, 20.0, 15.0);
        assert!(expected < -p.b);
        assert_approx_eq!(sim.movable(veh).unwrap().acceleration(), expected);
        assert!(sim.driver(veh).unwrap().conflicts.ignore_further);
    }

    #[test]
    fn crossing_gap_accepted() {
        let Crossing {
            mut sim,
            major,
            minor,
            ..
        } = crossing(false);
        let veh = spawn(&mut sim, minor, 80.0, 10.0);
        spawn(&mut sim, major, 0.0, 15.0);
        sim.step();

        let p = DriverParams::default();
        let expected = intersection_idm(&p).free(10.0, 20.0);
        assert_approx_eq!(sim.movable(veh).unwrap().acceleration(), expected);
        assert!(!sim.driver(veh).unwrap().conflicts.ignore_further);
    }

    #[test]
    fn priority_vehicle_yields_when_its_exit_is_blocked() {
        let Crossing {
            mut sim,
            major,
            minor,
            major_rsu,
        } = crossing(false);
        let waiting = spawn(&mut sim, minor, 93.0, 0.0);
        let veh = spawn(&mut sim, major, 85.0, 5.0);
        // Standing just past the conflict, leaving no room behind it
        spawn(&mut sim, major, 110.0, 0.0);
        sim.step();

        let p = DriverParams::default();
        let expected = stop_idm(&p).longitudinal(5.0, 5.0, 20.0, 10.0);
        assert!(expected < 0.0 && expected > -p.b);
        assert_approx_eq!(sim.movable(veh).unwrap().acceleration(), expected);
        let driver = sim.driver(veh).unwrap();
        assert_eq!(driver.conflicts.yield_plans.get(&major_rsu), Some(&waiting));
        assert!(!sim.driver(waiting).unwrap().is_blocked());
    }

    #[test]
    fn no_courtesy_towards_blocked_vehicle() {
        let Crossing {
            mut sim,
            major,
            minor,
            major_rsu,
        } = crossing(true);
        // Decides first, and cannot enter the keep clear conflict behind its leader
        let waiting = spawn(&mut sim, minor, 93.0, 0.0);
        spawn(&mut sim, minor, 110.0, 0.0);
        let veh = spawn(&mut sim, major, 85.0, 5.0);
        spawn(&mut sim, major, 110.0, 0.0);
        sim.step();

        assert!(sim.driver(waiting).unwrap().is_blocked());
        let driver = sim.driver(veh).unwrap();
        assert!(driver.conflicts.yield_plans.get(&major_rsu).is_none());
        assert!(sim.movable(veh).unwrap().acceleration() > 0.0);
    }

    #[test]
    fn yield_plan_dropped_when_both_stand_still() {
        let Crossing {
            mut sim,
            major,
            minor,
            major_rsu,
        } = crossing(false);
        let waiting = spawn(&mut sim, minor, 93.0, 0.0);
        let veh = spawn(&mut sim, major, 85.0, 0.0);
        spawn(&mut sim, major, 110.0, 0.0);
        sim.driver_mut(veh)
            .unwrap()
            .conflicts
            .yield_plans
            .insert(major_rsu, waiting);
        sim.step();

        assert!(sim.driver(veh).unwrap().conflicts.yield_plans.is_empty());
    }

    #[test]
    fn stop_moves_upstream_before_keep_clear_conflict() {
        let mut sim = sim();
        let road = straight(&mut sim, (0.0, 0.0), (200.0, 0.0));
        let first = straight(&mut sim, (0.0, 50.0), (200.0, 50.0));
        let second = straight(&mut sim, (0.0, 100.0), (200.0, 100.0));
        let [keep_clear, _] = sim
            .add_conflict(
                ConflictKind::Crossing,
                side(road, 60.0, 10.0, false, true),
                side(first, 100.0, 10.0, true, false),
            )
            .unwrap();
        // Too close behind the first to stop in between
        sim.add_conflict(
            ConflictKind::Crossing,
            side(road, 68.0, 5.0, false, false),
            side(second, 100.0, 5.0, true, false),
        )
        .unwrap();
        let veh = spawn(&mut sim, road, 20.0, 10.0);
        spawn(&mut sim, second, 90.0, 10.0);
        sim.step();

        let p = DriverParams::default();
        let expected = stop_idm(&p).longitudinal(10.0, 10.0, 20.0, 60.0 - 20.0 - 10.0);
        assert!(expected < 0.0);
        assert_approx_eq!(sim.movable(veh).unwrap().acceleration(), expected);
        let conflicts = &sim.driver(veh).unwrap().conflicts;
        assert_eq!(conflicts.keep_clear, vec![keep_clear]);
        assert!(conflicts.ignore_further);
    }

    #[test]
    fn follows_vehicle_from_other_lane_on_merge() {
        let mut sim = sim();
        let major = straight(&mut sim, (0.0, 0.0), (200.0, 0.0));
        let minor = straight(&mut sim, (0.0, 10.0), (200.0, 10.0));
        let merged = straight(&mut sim, (200.0, 0.0), (400.0, 0.0));
        sim.connect(major, merged).unwrap();
        sim.connect(minor, merged).unwrap();
        sim.add_conflict(
            ConflictKind::Merge,
            side(major, 200.0, 10.0, true, false),
            side(minor, 200.0, 10.0, false, false),
        )
        .unwrap();
        let veh = spawn(&mut sim, minor, 170.0, 10.0);
        // Already on the conflict
        spawn(&mut sim, major, 195.0, 10.0);
        sim.step();

        let p = DriverParams::default();
        let gap = 30.0 - 4.0 - 5.0;
        let expected = intersection_idm(&p).longitudinal(10.0, 0.0, 20.0, gap);
        assert!(expected < intersection_idm(&p).free(10.0, 20.0));
        assert_approx_eq!(sim.movable(veh).unwrap().acceleration(), expected);
    }
}
