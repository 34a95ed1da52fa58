use super::Lane;
use serde::{Deserialize, Serialize};

/// The route plan of a vehicle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Route {
    /// The vehicle has no destination and may use any lane.
    Free,
    /// The vehicle travels to the lanes marked with this destination.
    Destination(u32),
}

/// Lane change information of a lane for one destination.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct RouteInfo {
    /// The number of lane changes still required.
    pub n_lane_changes: u32,
    /// The position on the lane by which they must be completed.
    pub x_lane_changes: f64,
}

impl Route {
    /// Whether the destination can be reached from the given lane.
    pub fn can_be_followed_from(&self, lane: &Lane) -> bool {
        match self {
            Self::Free => true,
            Self::Destination(dest) => lane.routes.contains_key(dest),
        }
    }

    /// The number of lane changes required to reach the destination from `lane`.
    pub fn n_lane_changes(&self, lane: &Lane) -> u32 {
        self.info(lane).map_or(0, |info| info.n_lane_changes)
    }

    /// The position on `lane` by which the required lane changes must be done.
    /// Infinite when no lane change is required.
    pub fn x_lane_changes(&self, lane: &Lane) -> f64 {
        self.info(lane)
            .filter(|info| info.n_lane_changes > 0)
            .map_or(f64::INFINITY, |info| info.x_lane_changes)
    }

    /// The cost of continuing on `lane`, used to pick a branch at splits.
    pub(crate) fn branch_cost(&self, lane: &Lane) -> f64 {
        self.info(lane).map_or(f64::INFINITY, |info| {
            info.n_lane_changes as f64 * 1e6 + info.x_lane_changes
        })
    }

    fn info<'a>(&self, lane: &'a Lane) -> Option<&'a RouteInfo> {
        match self {
            Self::Free => None,
            Self::Destination(dest) => lane.routes.get(dest),
        }
    }
}
