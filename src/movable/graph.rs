//! The movable graph: the six neighbour links of every movable, rebuilt
//! from the per-lane ordering after movables have moved.

use super::Direction;
use crate::network::{Network, MAX_LANE_WALK};
use crate::{LaneId, MovableId, MovableSet, RsuSet};
use crate::movable::Side;

/// How far up- or downstream neighbours are searched for, in m.
const SEARCH_DISTANCE: f64 = 500.0;

/// An inconsistency found in the movable graph.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Diagnostic {
    /// A movable overlaps its leader.
    Collision {
        follower: MovableId,
        leader: MovableId,
        headway: f64,
    },
    /// A movable's leader does not have it as its follower.
    NonReciprocal {
        follower: MovableId,
        leader: MovableId,
        leader_up: Option<MovableId>,
    },
}

/// Re-sorts every lane and recomputes the neighbours of all movables.
pub(crate) fn rebuild(network: &mut Network, movables: &mut MovableSet) {
    for lane in network.lanes_mut() {
        lane.movables.clear();
    }
    for (id, movable) in movables.iter() {
        network.movables_mut(movable.lane).push(id);
    }
    for lane in network.lanes_mut() {
        lane.movables
            .sort_by(|a, b| movables[*a].x.total_cmp(&movables[*b].x));
    }

    let network = &*network;
    let updates = movables
        .keys()
        .map(|id| (id, neighbors_of(network, movables, id)))
        .collect::<Vec<_>>();
    for (id, neighbors) in updates {
        movables[id].neighbors = neighbors;
    }
}

fn neighbors_of(network: &Network, movables: &MovableSet, id: MovableId) -> [Option<MovableId>; 6] {
    let movable = &movables[id];
    let partner = movable.counterpart();
    let exclude = |other: MovableId| other == id || Some(other) == partner;
    let lane = &network[movable.lane];

    let mut neighbors = [None; 6];
    let idx = lane.movables.iter().position(|m| *m == id).unwrap_or(0);
    neighbors[Direction::Down as usize] = lane.movables[idx + 1..]
        .iter()
        .copied()
        .find(|m| !exclude(*m))
        .or_else(|| first_downstream(network, lane.id(), &exclude));
    neighbors[Direction::Up as usize] = lane.movables[..idx]
        .iter()
        .rev()
        .copied()
        .find(|m| !exclude(*m))
        .or_else(|| last_upstream(network, movables, lane.id(), SEARCH_DISTANCE, &exclude).map(|(m, _)| m));

    for side in [Side::Left, Side::Right] {
        let Some(adjacent) = lane.side(side) else {
            continue;
        };
        let Some(x) = network.adjacent_x(lane.id(), side, movable.x) else {
            continue;
        };
        neighbors[Direction::down(side) as usize] =
            find_down(network, movables, adjacent, x, &exclude);
        neighbors[Direction::up(side) as usize] =
            find_up(network, movables, adjacent, x, &exclude);
    }
    neighbors
}

/// The first movable at or downstream of position `x` on `lane`,
/// continuing onto downstream lanes until a split or lane end.
pub(crate) fn find_down(
    network: &Network,
    movables: &MovableSet,
    lane: LaneId,
    x: f64,
    exclude: &impl Fn(MovableId) -> bool,
) -> Option<MovableId> {
    let list = &network[lane].movables;
    let idx = list.partition_point(|m| movables[*m].x < x);
    list[idx..]
        .iter()
        .copied()
        .find(|m| !exclude(*m))
        .or_else(|| first_downstream(network, lane, exclude))
}

/// The last movable upstream of position `x` on `lane`, continuing onto
/// upstream lanes. At merges the nearest of the branches is taken.
pub(crate) fn find_up(
    network: &Network,
    movables: &MovableSet,
    lane: LaneId,
    x: f64,
    exclude: &impl Fn(MovableId) -> bool,
) -> Option<MovableId> {
    let list = &network[lane].movables;
    let idx = list.partition_point(|m| movables[*m].x < x);
    list[..idx]
        .iter()
        .rev()
        .copied()
        .find(|m| !exclude(*m))
        .or_else(|| {
            last_upstream(network, movables, lane, SEARCH_DISTANCE, exclude).map(|(m, _)| m)
        })
}

/// The first movable on the lanes following `lane`.
fn first_downstream(
    network: &Network,
    lane: LaneId,
    exclude: &impl Fn(MovableId) -> bool,
) -> Option<MovableId> {
    let mut dist = network[lane].length();
    let mut current = network[lane].single_down();
    for _ in 0..MAX_LANE_WALK {
        let lane = &network[current?];
        if let Some(found) = lane.movables.iter().copied().find(|m| !exclude(*m)) {
            return Some(found);
        }
        dist += lane.length();
        if dist > SEARCH_DISTANCE {
            return None;
        }
        current = lane.single_down();
    }
    None
}

/// The last movable on the lanes leading into `lane`, with the distance
/// from its front to the start of `lane`.
pub(crate) fn last_upstream(
    network: &Network,
    movables: &MovableSet,
    lane: LaneId,
    remaining: f64,
    exclude: &impl Fn(MovableId) -> bool,
) -> Option<(MovableId, f64)> {
    let mut best: Option<(MovableId, f64)> = None;
    for up in network[lane].ups() {
        let up_lane = &network[*up];
        let found = match up_lane.movables.iter().rev().copied().find(|m| !exclude(*m)) {
            Some(m) => Some((m, up_lane.length() - movables[m].x)),
            None if remaining > up_lane.length() => {
                last_upstream(network, movables, *up, remaining - up_lane.length(), exclude)
                    .map(|(m, dist)| (m, dist + up_lane.length()))
            }
            None => None,
        };
        if let Some((m, dist)) = found {
            if best.map_or(true, |(_, best_dist)| dist < best_dist) {
                best = Some((m, dist));
            }
        }
    }
    best
}

/// The net distance between the front of `from` and the rear of `to`.
///
/// Infinite if the two are not on related lanes. A lane changing vehicle
/// also measures the headway from its shadow and takes the smaller.
pub(crate) fn headway(
    network: &Network,
    movables: &MovableSet,
    from: MovableId,
    to: MovableId,
) -> f64 {
    let (follower, leader) = (&movables[from], &movables[to]);
    let gross_from = |lane: LaneId, x: f64| {
        network
            .relative_x(lane, leader.lane, leader.x)
            .map_or(f64::INFINITY, |pos| pos - x)
    };
    let mut gross = gross_from(follower.lane, follower.x);
    let shadow = follower
        .vehicle()
        .and_then(|veh| veh.lane_change)
        .map(|lc| lc.shadow)
        .filter(|shadow| *shadow != to)
        .and_then(|shadow| movables.get(shadow));
    if let Some(shadow) = shadow {
        gross = gross.min(gross_from(shadow.lane, shadow.x));
    }
    gross - leader.length
}

/// The distance from the front of a movable to a road-side unit.
/// Negative once the front has passed it; infinite on unrelated lanes.
pub(crate) fn distance_to_rsu(
    network: &Network,
    movables: &MovableSet,
    rsus: &RsuSet,
    id: MovableId,
    rsu: crate::RsuId,
) -> f64 {
    let movable = &movables[id];
    let rsu = &rsus[rsu];
    network
        .x_adj(movable.lane, rsu.lane())
        .map_or(f64::INFINITY, |adj| rsu.x() + adj - movable.x)
}

/// Checks the graph for overlapping and non-reciprocal neighbours.
pub(crate) fn diagnose(network: &Network, movables: &MovableSet) -> Vec<Diagnostic> {
    let mut found = vec![];
    for (id, movable) in movables.iter() {
        let Some(leader) = movable.neighbor(Direction::Down) else {
            continue;
        };
        let leader_lane = &network[movables[leader].lane];
        let at_merge = movables[leader].lane != movable.lane && leader_lane.is_merge();

        let headway = headway(network, movables, id, leader);
        if headway < 0.0 && !at_merge {
            log::warn!(
                "collision: {:?} overlaps its leader {:?} by {:.2} m",
                id,
                leader,
                -headway
            );
            found.push(Diagnostic::Collision {
                follower: id,
                leader,
                headway,
            });
        }

        let leader_up = movables[leader].neighbor(Direction::Up);
        if leader_up != Some(id) && !at_merge {
            log::warn!(
                "{:?} follows {:?}, whose follower is {:?}",
                id,
                leader,
                leader_up
            );
            found.push(Diagnostic::NonReciprocal {
                follower: id,
                leader,
                leader_up,
            });
        }
    }
    found
}
