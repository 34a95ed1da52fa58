use super::memo::AccLabel;
use super::{Driver, Idm, World};
use crate::movable::graph::find_down;
use crate::movable::{Direction, Side};
use crate::rsu::{LightState, RsuKind};
use crate::{LaneId, MovableId};

impl Driver {
    /// Reacts to every noticeable road-side unit within range, nearest first.
    pub(super) fn notice_rsus(&mut self, world: &World, id: MovableId) {
        self.a = self.params.a;
        self.d_left_int = 0.0;
        self.d_right_int = 0.0;
        self.conflicts.begin_step(world);

        let me = world.movable(id);
        let route = world.vehicle(id).route;
        let in_range =
            world
                .network
                .rsus_in_range(me.lane, me.x, me.length, self.params.range, &route);
        for (rsu_id, dist) in in_range {
            let rsu = &world.rsus[rsu_id];
            if !rsu.is_noticeable() {
                continue;
            }
            match &rsu.kind {
                RsuKind::Detector(_) => {}
                RsuKind::SpeedReduction { speed } => {
                    self.notice_speed_reduction(world, id, rsu.lane, *speed, dist)
                }
                RsuKind::Split => self.notice_split(world, id, rsu.lane),
                RsuKind::TrafficLight(state) => self.notice_traffic_light(world, id, *state, dist),
                RsuKind::Conflict(conflict) => {
                    self.notice_conflict(world, id, rsu_id, conflict, dist)
                }
            }
        }
    }

    /// Decelerates towards a lower speed limit ahead.
    pub(super) fn notice_speed_reduction(
        &mut self,
        world: &World,
        id: MovableId,
        lane: LaneId,
        speed: Option<f64>,
        dist: f64,
    ) {
        let me = world.movable(id);
        let limit = speed.unwrap_or_else(|| world.network[lane].speed_limit());
        let v_lim = self.desired_velocity_on(world.vehicle(id), limit);
        if v_lim < me.v && dist > 0.0 {
            let b_min = 0.5 * (me.v * me.v - v_lim * v_lim) / dist;
            self.lower_acceleration(-b_min * b_min / self.params.b);
        }
    }

    /// Without a leader, follows the first vehicle on the branch of the route.
    fn notice_split(&mut self, world: &World, id: MovableId, lane: LaneId) {
        let me = world.movable(id);
        if me.neighbor(Direction::Down).is_some() {
            return;
        }
        let route = world.vehicle(id).route;
        let Some(branch) = world.network.next_lane(lane, &route) else {
            return;
        };
        let is_me = |other: MovableId| world.movable(other).owner() == id;
        if let Some(leader) = find_down(world.network, world.movables, branch, 0.0, &is_me) {
            let acc = self.acceleration(world, id, Some(leader), AccLabel::Follow);
            self.lower_acceleration(acc);
        }
    }

    /// Stops for a light that is not green, unless that requires braking
    /// harder than for amber.
    fn notice_traffic_light(&mut self, world: &World, id: MovableId, state: LightState, dist: f64) {
        self.notice_intersection(world, id, dist);
        if state == LightState::Green {
            return;
        }
        let me = world.movable(id);
        let v0 = self.desired_velocity(world, id);
        let idm = Idm {
            b: self.params.b_yellow,
            t: self.params.t_max,
            ..self.idm()
        };
        let acc = idm.longitudinal(me.v, me.v, v0, dist);
        if acc > -self.params.b_yellow {
            self.lower_acceleration(acc);
        }
    }

    /// On the first intersection noticed in a step, switches to the
    /// intersection acceleration. Behind a leader, also computes the desire
    /// to choose a lane with a better flow towards the intersection.
    pub(super) fn notice_intersection(&mut self, world: &World, id: MovableId, dist: f64) {
        if self.memo.intersection {
            return;
        }
        self.memo.intersection = true;
        self.a = self.params.a_inter;

        let me = world.movable(id);
        let Some(leader) = me.neighbor(Direction::Down) else {
            return;
        };
        let network = world.network;
        let lane = &network[me.lane];
        let route = world.vehicle(id).route;
        let a_cur = self
            .acceleration(world, id, Some(leader), AccLabel::Intersection)
            .max(-me.v / world.dt);

        for side in [Side::Left, Side::Right] {
            let Some(target) = lane.side(side) else {
                continue;
            };
            let target_lane = &network[target];
            if !lane.can_change(side) || !route.can_be_followed_from(target_lane) {
                continue;
            }
            let x = network.adjacent_x(me.lane, side, me.x).unwrap_or(me.x);
            if route.x_lane_changes(target_lane) - x <= dist {
                continue;
            }
            let side_leader = me.neighbor(Direction::down(side));
            let a_side = self.acceleration(world, id, side_leader, AccLabel::Intersection);
            let desire = (a_side - a_cur) / (self.a + self.params.b);
            match side {
                Side::Left => self.d_left_int = desire,
                Side::Right => self.d_right_int = desire,
            }
        }
    }
}
