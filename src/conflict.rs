//! Finding where two lanes overlap from their geometry.

use crate::math::project_point_onto_curve;
use crate::network::Lane;
use crate::rsu::ConflictKind;
use crate::util::Interval;
use crate::LaneId;
use cgmath::prelude::*;
use itertools::iproduct;

/// Half the width of a lane, in m.
const LANE_RADIUS: f64 = 1.8;

/// The sampling step along the lane, in m.
const STEP: f64 = 0.25;

/// The region of `lane` whose centre line comes within a lane width of `other`.
pub(crate) fn overlap_region(lane: &Lane, other: &Lane) -> Option<Interval<f64>> {
    let mut own_pos = 0.0;
    let mut other_pos = None;
    let mut region: Option<Interval<f64>> = None;

    while own_pos < lane.length() {
        let (own_p, own_tan) = lane.curve().sample_centre(own_pos);
        other_pos = project_point_onto_curve(other.curve(), own_p, 0.1, other_pos);
        if let Some(pos) = other_pos {
            let (other_p, other_tan) = other.curve().sample_centre(pos);
            let dist = own_p.distance(other_p) - LANE_RADIUS * own_tan.dot(other_tan).abs();
            if dist < LANE_RADIUS {
                let (min, max) = (own_pos - STEP, own_pos + STEP);
                match region.as_mut() {
                    Some(region) => region.max = max,
                    None => region = Some(Interval::new(min, max)),
                }
            }
        }
        own_pos += STEP;
    }

    region.map(|r| Interval::new(r.min.max(0.0), r.max.min(lane.length())))
}

/// The kind of conflict between two lanes: a merge if they lead into the same
/// lane, a split if they leave from the same lane, a crossing otherwise.
pub(crate) fn infer_kind(a: &Lane, b: &Lane) -> ConflictKind {
    let shared = |xs: &[LaneId], ys: &[LaneId]| iproduct!(xs, ys).any(|(x, y)| x == y);
    if shared(a.downs(), b.downs()) {
        ConflictKind::Merge
    } else if shared(a.ups(), b.ups()) {
        ConflictKind::Split
    } else {
        ConflictKind::Crossing
    }
}
