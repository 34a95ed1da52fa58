//! The lane network: lane geometry, longitudinal and lateral topology,
//! route information and the road-side units placed along each lane.

use crate::error::{NetworkError, NetworkResult};
use crate::math::{project_point_onto_curve, LookupTable, ParametricCurve2d};
use crate::movable::Side;
use crate::util::Interval;
use crate::{LaneId, LaneSet, MovableId, RsuId};
pub use curve::LaneCurve;
pub use route::Route;
pub(crate) use route::RouteInfo;
use smallvec::SmallVec;
use std::collections::{HashMap, VecDeque};

mod curve;
mod route;

/// The quantization of the adjacent lane LUT, in m.
const LUT_SPACING: f64 = 4.0;

/// Longitudinal offsets between lanes are only tracked up to this distance, in m.
const MAX_OFFSET_DISTANCE: f64 = 10_000.0;

/// The maximum number of lanes walked when searching up- or downstream.
pub(crate) const MAX_LANE_WALK: usize = 64;

/// The attributes of a lane.
pub struct LaneAttributes<'a> {
    /// A curve defining the centre line of the lane.
    pub curve: &'a dyn ParametricCurve2d,
    /// The speed limit in m/s.
    pub speed_limit: f64,
}

/// Which lane changes are permitted between two adjacent lanes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LaneChangeRule {
    Both,
    /// Only from the right lane into the left lane.
    ToLeftOnly,
    /// Only from the left lane into the right lane.
    ToRightOnly,
    /// No lane changes; the lanes are merely adjacent.
    Forbidden,
}

/// A single lane of traffic.
#[derive(Clone, Debug)]
pub struct Lane {
    id: LaneId,
    curve: LaneCurve,
    speed_limit: f64,
    ups: SmallVec<[LaneId; 2]>,
    downs: SmallVec<[LaneId; 2]>,
    left: Option<AdjacentLane>,
    right: Option<AdjacentLane>,
    go_left: bool,
    go_right: bool,
    /// Set on a taper lane and propagated to the lanes leading onto it.
    taper: Option<LaneId>,
    destination: Option<u32>,
    has_generator: bool,
    /// The road-side units on this lane, ordered by position.
    rsus: Vec<(f64, RsuId)>,
    /// Lane change information per destination.
    pub(crate) routes: HashMap<u32, RouteInfo>,
    /// Distance from the start of this lane to the start of each downstream lane.
    downstream: HashMap<LaneId, f64>,
    /// The movables on this lane, ordered by position. Rebuilt every step.
    pub(crate) movables: Vec<MovableId>,
}

/// Information about a laterally adjacent lane.
#[derive(Clone, Debug)]
struct AdjacentLane {
    lane: LaneId,
    /// An approximate mapping from positions on this lane to the adjacent lane.
    /// `None` if the lanes are not physically connected.
    pos_map: Option<LookupTable<Option<f64>>>,
    /// Fallback mapping by the ratio of lane lengths.
    scale: f64,
}

impl Lane {
    fn new(id: LaneId, attribs: &LaneAttributes) -> Self {
        Self {
            id,
            curve: LaneCurve::new(&attribs.curve),
            speed_limit: attribs.speed_limit,
            ups: SmallVec::new(),
            downs: SmallVec::new(),
            left: None,
            right: None,
            go_left: false,
            go_right: false,
            taper: None,
            destination: None,
            has_generator: false,
            rsus: vec![],
            routes: HashMap::new(),
            downstream: HashMap::new(),
            movables: vec![],
        }
    }

    pub fn id(&self) -> LaneId {
        self.id
    }

    /// The length of the lane in m.
    pub fn length(&self) -> f64 {
        self.curve.length()
    }

    /// The curve representing the lane's centre line.
    pub fn curve(&self) -> &LaneCurve {
        &self.curve
    }

    /// The speed limit in m/s.
    pub fn speed_limit(&self) -> f64 {
        self.speed_limit
    }

    pub fn ups(&self) -> &[LaneId] {
        &self.ups
    }

    pub fn downs(&self) -> &[LaneId] {
        &self.downs
    }

    /// The adjacent lane on the given side, if any.
    pub fn side(&self, side: Side) -> Option<LaneId> {
        match side {
            Side::Left => self.left.as_ref().map(|adj| adj.lane),
            Side::Right => self.right.as_ref().map(|adj| adj.lane),
        }
    }

    /// Whether vehicles may change from this lane towards the given side.
    pub fn can_change(&self, side: Side) -> bool {
        match side {
            Side::Left => self.go_left,
            Side::Right => self.go_right,
        }
    }

    /// The taper lane this lane leads onto, if any.
    pub fn taper(&self) -> Option<LaneId> {
        self.taper
    }

    pub fn destination(&self) -> Option<u32> {
        self.destination
    }

    pub fn has_generator(&self) -> bool {
        self.has_generator
    }

    /// Whether several lanes merge into this lane.
    pub fn is_merge(&self) -> bool {
        self.ups.len() > 1
    }

    /// Whether this lane splits into several lanes.
    pub fn is_split(&self) -> bool {
        self.downs.len() > 1
    }

    /// The road-side units on this lane, ordered by position.
    pub fn rsus(&self) -> impl Iterator<Item = RsuId> + '_ {
        self.rsus.iter().map(|(_, id)| *id)
    }

    /// The movables on this lane as of the last graph rebuild, ordered by position.
    pub fn movables(&self) -> &[MovableId] {
        &self.movables
    }

    /// The single downstream lane, if the lane neither ends nor splits.
    pub(crate) fn single_down(&self) -> Option<LaneId> {
        match self.downs.as_slice() {
            [down] => Some(*down),
            _ => None,
        }
    }

    /// The single upstream lane, if the lane neither starts nor is a merge.
    pub(crate) fn single_up(&self) -> Option<LaneId> {
        match self.ups.as_slice() {
            [up] => Some(*up),
            _ => None,
        }
    }

    fn adjacent(&self, side: Side) -> Option<&AdjacentLane> {
        match side {
            Side::Left => self.left.as_ref(),
            Side::Right => self.right.as_ref(),
        }
    }

    fn set_adjacent(&mut self, side: Side, adjacent: AdjacentLane, permitted: bool) {
        match side {
            Side::Left => {
                self.left = Some(adjacent);
                self.go_left = permitted;
            }
            Side::Right => {
                self.right = Some(adjacent);
                self.go_right = permitted;
            }
        }
    }
}

/// The set of lanes that make up a road network.
#[derive(Default)]
pub(crate) struct Network {
    lanes: LaneSet,
    initialised: bool,
}

impl std::ops::Index<LaneId> for Network {
    type Output = Lane;

    fn index(&self, id: LaneId) -> &Lane {
        &self.lanes[id]
    }
}

impl Network {
    pub fn lanes(&self) -> &LaneSet {
        &self.lanes
    }

    pub fn lanes_mut(&mut self) -> impl Iterator<Item = &mut Lane> {
        self.lanes.values_mut()
    }

    /// The list of movables on a lane, for rebuilding the movable graph.
    pub fn movables_mut(&mut self, lane: LaneId) -> &mut Vec<MovableId> {
        &mut self.lanes[lane].movables
    }

    pub fn get(&self, id: LaneId) -> NetworkResult<&Lane> {
        self.lanes.get(id).ok_or(NetworkError::UnknownLane(id))
    }

    fn get_mut(&mut self, id: LaneId) -> NetworkResult<&mut Lane> {
        self.initialised = false;
        self.lanes.get_mut(id).ok_or(NetworkError::UnknownLane(id))
    }

    pub fn is_initialised(&self) -> bool {
        self.initialised
    }

    pub fn add_lane(&mut self, attribs: &LaneAttributes) -> NetworkResult<LaneId> {
        if !(attribs.speed_limit > 0.0) {
            return Err(NetworkError::InvalidParameter {
                name: "speed_limit",
                reason: format!("must be positive, got {}", attribs.speed_limit),
            });
        }
        self.initialised = false;
        Ok(self.lanes.insert_with_key(|id| Lane::new(id, attribs)))
    }

    /// Specifies that the end of the `from` lane connects to the start of the `to` lane.
    pub fn connect(&mut self, from: LaneId, to: LaneId) -> NetworkResult<()> {
        self.get(to)?;
        let from_lane = self.get_mut(from)?;
        if !from_lane.downs.contains(&to) {
            from_lane.downs.push(to);
        }
        let to_lane = self.get_mut(to)?;
        if !to_lane.ups.contains(&from) {
            to_lane.ups.push(from);
        }
        Ok(())
    }

    /// Specifies that `left` lies directly to the left of `right`.
    pub fn connect_lateral(
        &mut self,
        left: LaneId,
        right: LaneId,
        rule: LaneChangeRule,
    ) -> NetworkResult<()> {
        if left == right {
            return Err(NetworkError::NotAdjacent(left, right));
        }
        let (left_lane, right_lane) = (self.get(left)?, self.get(right)?);
        let physical = rule != LaneChangeRule::Forbidden;
        let left_to_right = Self::adjacent_mapping(left_lane, right_lane, physical);
        let right_to_left = Self::adjacent_mapping(right_lane, left_lane, physical);

        let (to_left, to_right) = match rule {
            LaneChangeRule::Both => (true, true),
            LaneChangeRule::ToLeftOnly => (true, false),
            LaneChangeRule::ToRightOnly => (false, true),
            LaneChangeRule::Forbidden => (false, false),
        };
        self.get_mut(left)?
            .set_adjacent(Side::Right, left_to_right, to_right);
        self.get_mut(right)?
            .set_adjacent(Side::Left, right_to_left, to_left);
        Ok(())
    }

    /// Projects the centre line of `from` onto `to`.
    fn adjacent_mapping(from: &Lane, to: &Lane, physical: bool) -> AdjacentLane {
        let scale = if from.length() > 0.0 {
            to.length() / from.length()
        } else {
            1.0
        };
        let pos_map = physical.then(|| {
            let bounds = Interval::new(0.0, from.length());
            let mut last = None;
            LookupTable::from_samples(bounds, LUT_SPACING, |pos| {
                let point = from.curve.sample_centre(pos).0;
                last = project_point_onto_curve(&to.curve, point, 0.01, last).or_else(|| {
                    project_point_onto_curve(&to.curve, point, 0.01, None)
                });
                last
            })
        });
        AdjacentLane {
            lane: to.id,
            pos_map,
            scale,
        }
    }

    /// Marks a lane as a taper, i.e. a lane that ends by merging into its left lane.
    pub fn set_taper(&mut self, lane: LaneId) -> NetworkResult<()> {
        self.get_mut(lane)?.taper = Some(lane);
        Ok(())
    }

    /// Marks a lane as leading to the given destination.
    pub fn set_destination(&mut self, lane: LaneId, destination: u32) -> NetworkResult<()> {
        self.get_mut(lane)?.destination = Some(destination);
        Ok(())
    }

    pub fn set_has_generator(&mut self, lane: LaneId) -> NetworkResult<()> {
        self.get_mut(lane)?.has_generator = true;
        Ok(())
    }

    /// Registers a road-side unit at position `x` of the lane.
    pub fn insert_rsu(&mut self, lane: LaneId, x: f64, rsu: RsuId) -> NetworkResult<()> {
        let lane = self.lanes.get_mut(lane).ok_or(NetworkError::UnknownLane(lane))?;
        let idx = lane.rsus.partition_point(|(pos, _)| *pos <= x);
        lane.rsus.insert(idx, (x, rsu));
        Ok(())
    }

    /// Derives the taper, route and offset information of all lanes.
    pub fn init(&mut self) {
        self.propagate_tapers();
        self.init_routes();
        self.init_offsets();
        self.initialised = true;
    }

    /// Marks the lanes leading onto a taper, as long as they have a left lane.
    fn propagate_tapers(&mut self) {
        let tapers = self
            .lanes
            .values()
            .filter(|lane| lane.taper == Some(lane.id))
            .map(|lane| lane.id)
            .collect::<Vec<_>>();
        for taper in tapers {
            let mut up = self.lanes[taper].single_up();
            let mut count = 0;
            while let Some(id) = up {
                let lane = &mut self.lanes[id];
                if lane.left.is_none() || count > MAX_LANE_WALK {
                    break;
                }
                lane.taper = Some(taper);
                up = lane.single_up();
                count += 1;
            }
        }
    }

    /// Computes, for every destination, the number of lane changes each lane
    /// requires and the position by which they must be completed.
    fn init_routes(&mut self) {
        for lane in self.lanes.values_mut() {
            lane.routes.clear();
        }
        let origins = self
            .lanes
            .values()
            .filter_map(|lane| Some((lane.id, lane.destination?)))
            .collect::<Vec<_>>();

        for (origin, dest) in origins {
            if self.lanes[origin].routes.contains_key(&dest) {
                continue;
            }

            // The cross section of lanes with this destination
            let mut current = vec![origin];
            for side in [Side::Left, Side::Right] {
                let mut lane = self.lanes[origin].side(side);
                while let Some(id) = lane {
                    if self.lanes[id].destination != Some(dest) || current.contains(&id) {
                        break;
                    }
                    current.push(id);
                    lane = self.lanes[id].side(side);
                }
            }
            for id in &current {
                let lane = &mut self.lanes[*id];
                let x_lane_changes = lane.length();
                lane.routes.insert(
                    dest,
                    RouteInfo {
                        n_lane_changes: 0,
                        x_lane_changes,
                    },
                );
            }

            while !current.is_empty() {
                // Spread laterally to lanes from which this cross section is reachable
                let n = current.len();
                for i in 0..n {
                    for side in [Side::Left, Side::Right] {
                        let mut from = current[i];
                        let mut lcs = self.lanes[from].routes[&dest].n_lane_changes;
                        while let Some(id) = self.lanes[from].side(side) {
                            let lane = &self.lanes[id];
                            if !lane.can_change(side.opposite())
                                || current.contains(&id)
                                || lane.routes.contains_key(&dest)
                                || lane.destination.is_some()
                            {
                                break;
                            }
                            lcs += 1;
                            current.push(id);
                            let lane = &mut self.lanes[id];
                            let x_lane_changes = lane.length();
                            lane.routes.insert(
                                dest,
                                RouteInfo {
                                    n_lane_changes: lcs,
                                    x_lane_changes,
                                },
                            );
                            from = id;
                        }
                    }
                }

                // Move upstream
                let mut upstream = vec![];
                for id in &current {
                    let info = self.lanes[*id].routes[&dest];
                    for up in self.lanes[*id].ups.clone() {
                        let lane = &mut self.lanes[up];
                        let better = lane
                            .routes
                            .get(&dest)
                            .map_or(true, |old| old.n_lane_changes > info.n_lane_changes);
                        if better {
                            let x_lane_changes = info.x_lane_changes + lane.length();
                            lane.routes.insert(
                                dest,
                                RouteInfo {
                                    n_lane_changes: info.n_lane_changes,
                                    x_lane_changes,
                                },
                            );
                            upstream.push(up);
                        }
                    }
                }
                current = upstream;
            }
        }
    }

    /// Finds the distance from the start of each lane to the start of every
    /// lane downstream of it.
    fn init_offsets(&mut self) {
        let ids = self.lanes.keys().collect::<Vec<_>>();
        for id in ids {
            let mut best = HashMap::new();
            let mut queue = VecDeque::from([(id, 0.0)]);
            while let Some((lane_id, dist)) = queue.pop_front() {
                let lane = &self.lanes[lane_id];
                let next = dist + lane.length();
                if next > MAX_OFFSET_DISTANCE {
                    continue;
                }
                for down in &lane.downs {
                    if *down == id {
                        continue;
                    }
                    let known = best.get(down).copied().unwrap_or(f64::INFINITY);
                    if next < known {
                        best.insert(*down, next);
                        queue.push_back((*down, next));
                    }
                }
            }
            self.lanes[id].downstream = best;
        }
    }

    /// The distance to add to a position on `other` to express it as a
    /// position on `lane`, if the two lanes are longitudinally connected.
    pub fn x_adj(&self, lane: LaneId, other: LaneId) -> Option<f64> {
        if lane == other {
            return Some(0.0);
        }
        if let Some(dist) = self.lanes[lane].downstream.get(&other) {
            return Some(*dist);
        }
        self.lanes[other].downstream.get(&lane).map(|dist| -dist)
    }

    /// Maps a position on `lane` onto the adjacent lane on the given side.
    pub fn adjacent_x(&self, lane: LaneId, side: Side, x: f64) -> Option<f64> {
        let adjacent = self.lanes[lane].adjacent(side)?;
        let mapped = adjacent
            .pos_map
            .as_ref()
            .and_then(|map| map.interpolate(x))
            .filter(|x| x.is_finite());
        Some(mapped.unwrap_or(x * adjacent.scale))
    }

    /// Expresses position `x` on lane `other` as a position on `lane`.
    /// Works for the same lane, longitudinally connected lanes, adjacent
    /// lanes and lanes up- or downstream of an adjacent lane.
    pub fn relative_x(&self, lane: LaneId, other: LaneId, x: f64) -> Option<f64> {
        if let Some(adj) = self.x_adj(lane, other) {
            return Some(x + adj);
        }
        let own = &self.lanes[lane];
        let theirs = &self.lanes[other];
        for side in [Side::Left, Side::Right] {
            if own.side(side) == Some(other) {
                return self.adjacent_x(other, side.opposite(), x);
            }
        }
        for side in [Side::Left, Side::Right] {
            // Other lane is up- or downstream of an adjacent lane
            if let Some(adjacent) = own.side(side) {
                if let Some(adj) = self.x_adj(adjacent, other) {
                    return self.adjacent_x(adjacent, side.opposite(), x + adj);
                }
            }
            // Lane adjacent to the other lane is up- or downstream of this lane
            if let Some(adjacent) = theirs.side(side) {
                if let Some(adj) = self.x_adj(lane, adjacent) {
                    return Some(self.adjacent_x(other, side, x)? + adj);
                }
            }
        }
        None
    }

    /// The lane a vehicle following `route` continues onto at the end of `lane`.
    pub fn next_lane(&self, lane: LaneId, route: &Route) -> Option<LaneId> {
        let lane = &self.lanes[lane];
        match lane.downs.as_slice() {
            [] => None,
            [down] => Some(*down),
            downs => Some(self.branch_for_route(downs, route).unwrap_or_else(|| {
                log::warn!(
                    "no branch of split lane {:?} serves route {:?}, taking the first",
                    lane.id,
                    route
                );
                downs[0]
            })),
        }
    }

    /// The branch of a split that best serves the route, if any does.
    pub fn branch_for_route(&self, downs: &[LaneId], route: &Route) -> Option<LaneId> {
        downs
            .iter()
            .filter(|id| route.can_be_followed_from(&self.lanes[**id]))
            .min_by(|a, b| {
                let cost = |id: LaneId| route.branch_cost(&self.lanes[id]);
                cost(**a).total_cmp(&cost(**b))
            })
            .copied()
    }

    /// The nearest lane at or upstream of `lane` into which several lanes merge,
    /// with the distance from its start to the start of `lane`.
    pub fn upstream_merge(&self, lane: LaneId) -> Option<(LaneId, f64)> {
        let mut id = lane;
        for _ in 0..MAX_LANE_WALK {
            let current = &self.lanes[id];
            if current.is_merge() {
                return Some((id, self.x_adj(id, lane)?));
            }
            id = current.single_up()?;
        }
        None
    }

    /// The road-side units ahead of a vehicle, nearest first, together with
    /// their distance from the vehicle's front.
    ///
    /// Units the vehicle's front has passed are included until its rear has
    /// passed them too.
    pub fn rsus_in_range(
        &self,
        lane: LaneId,
        x: f64,
        length: f64,
        range: f64,
        route: &Route,
    ) -> SmallVec<[(RsuId, f64); 8]> {
        let mut found = SmallVec::new();

        // Units behind the front on an upstream lane
        if x < length {
            if let Some(up) = self.lanes[lane].single_up() {
                let up_lane = &self.lanes[up];
                for (pos, rsu) in &up_lane.rsus {
                    let dist = pos - up_lane.length() - x;
                    if dist > -length {
                        found.push((*rsu, dist));
                    }
                }
            }
        }

        let mut offset = 0.0;
        let mut current = Some(lane);
        for _ in 0..MAX_LANE_WALK {
            let Some(id) = current else { break };
            let lane = &self.lanes[id];
            for (pos, rsu) in &lane.rsus {
                let dist = offset + pos - x;
                if dist > range {
                    return found;
                }
                if dist > -length {
                    found.push((*rsu, dist));
                }
            }
            offset += lane.length();
            if offset - x > range {
                break;
            }
            current = self.next_lane(id, route);
        }
        found
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::math::{LineSegment2d, Point2d};
    use assert_approx_eq::assert_approx_eq;

    fn straight(net: &mut Network, x1: f64, x2: f64, y: f64) -> LaneId {
        net.add_lane(&LaneAttributes {
            curve: &LineSegment2d::from_ends(Point2d::new(x1, y), Point2d::new(x2, y)),
            speed_limit: 25.0,
        })
        .unwrap()
    }

    #[test]
    fn longitudinal_offsets() {
        let mut net = Network::default();
        let a = straight(&mut net, 0.0, 100.0, 0.0);
        let b = straight(&mut net, 100.0, 250.0, 0.0);
        let c = straight(&mut net, 250.0, 300.0, 0.0);
        net.connect(a, b).unwrap();
        net.connect(b, c).unwrap();
        net.init();

        assert_approx_eq!(net.x_adj(a, c).unwrap(), 250.0, 0.01);
        assert_approx_eq!(net.x_adj(c, a).unwrap(), -250.0, 0.01);
        assert_approx_eq!(net.relative_x(a, b, 10.0).unwrap(), 110.0, 0.01);
        assert!(net.x_adj(c, c).unwrap() == 0.0);
    }

    #[test]
    fn unrelated_lanes_have_no_offset() {
        let mut net = Network::default();
        let a = straight(&mut net, 0.0, 100.0, 0.0);
        let b = straight(&mut net, 0.0, 100.0, 50.0);
        net.init();
        assert!(net.x_adj(a, b).is_none());
        assert!(net.relative_x(a, b, 10.0).is_none());
    }

    #[test]
    fn adjacent_mapping_follows_geometry() {
        let mut net = Network::default();
        let right = straight(&mut net, 0.0, 200.0, 0.0);
        let left = straight(&mut net, 50.0, 200.0, 3.5);
        net.connect_lateral(left, right, LaneChangeRule::Both).unwrap();
        net.init();

        assert_approx_eq!(net.adjacent_x(right, Side::Left, 100.0).unwrap(), 50.0, 0.1);
        assert_approx_eq!(net.adjacent_x(left, Side::Right, 50.0).unwrap(), 100.0, 0.1);
        assert_approx_eq!(net.relative_x(right, left, 50.0).unwrap(), 100.0, 0.1);
        assert!(net.adjacent_x(right, Side::Right, 10.0).is_none());
    }

    #[test]
    fn forbidden_lane_change_maps_by_length() {
        let mut net = Network::default();
        let right = straight(&mut net, 0.0, 200.0, 0.0);
        let left = straight(&mut net, 0.0, 100.0, 3.5);
        net.connect_lateral(left, right, LaneChangeRule::Forbidden).unwrap();
        assert_approx_eq!(net.adjacent_x(right, Side::Left, 100.0).unwrap(), 50.0, 0.01);
        assert!(!net[right].can_change(Side::Left));
        assert!(!net[left].can_change(Side::Right));
    }

    #[test]
    fn route_information() {
        // Two lanes; only the right one continues to destination 1.
        let mut net = Network::default();
        let right = straight(&mut net, 0.0, 500.0, 0.0);
        let left = straight(&mut net, 0.0, 500.0, 3.5);
        let exit = straight(&mut net, 500.0, 600.0, 0.0);
        let up_left = straight(&mut net, -200.0, 0.0, 3.5);
        net.connect_lateral(left, right, LaneChangeRule::Both).unwrap();
        net.connect(right, exit).unwrap();
        net.connect(up_left, left).unwrap();
        net.set_destination(exit, 1).unwrap();
        net.init();

        let route = Route::Destination(1);
        assert_eq!(route.n_lane_changes(&net[right]), 0);
        assert_eq!(route.n_lane_changes(&net[left]), 1);
        assert_approx_eq!(route.x_lane_changes(&net[left]), 500.0, 0.01);
        assert_eq!(route.n_lane_changes(&net[up_left]), 1);
        assert_approx_eq!(route.x_lane_changes(&net[up_left]), 700.0, 0.01);
        assert!(route.can_be_followed_from(&net[left]));
        assert!(!Route::Destination(2).can_be_followed_from(&net[left]));
        assert!(Route::Free.can_be_followed_from(&net[left]));
    }

    #[test]
    fn split_branch_follows_route() {
        let mut net = Network::default();
        let main = straight(&mut net, 0.0, 100.0, 0.0);
        let through = straight(&mut net, 100.0, 200.0, 0.0);
        let ramp = straight(&mut net, 100.0, 200.0, -20.0);
        net.connect(main, through).unwrap();
        net.connect(main, ramp).unwrap();
        net.set_destination(through, 1).unwrap();
        net.set_destination(ramp, 2).unwrap();
        net.init();

        assert_eq!(net.next_lane(main, &Route::Destination(2)), Some(ramp));
        assert_eq!(net.next_lane(main, &Route::Destination(1)), Some(through));
        assert_eq!(net.next_lane(through, &Route::Destination(1)), None);
    }

    #[test]
    fn taper_propagates_upstream() {
        let mut net = Network::default();
        let up = straight(&mut net, 0.0, 100.0, 0.0);
        let up_left = straight(&mut net, 0.0, 100.0, 3.5);
        let taper = straight(&mut net, 100.0, 200.0, 0.0);
        net.connect(up, taper).unwrap();
        net.connect_lateral(up_left, up, LaneChangeRule::Both).unwrap();
        net.set_taper(taper).unwrap();
        net.init();
        assert_eq!(net[up].taper(), Some(taper));
        assert_eq!(net[up_left].taper(), None);
    }
}
