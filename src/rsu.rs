//! Road-side units: fixed points along a lane that vehicles notice as they
//! approach, and the controllers that update them.

use crate::movable::graph::{find_down, find_up};
use crate::network::Network;
use crate::{LaneId, MovableId, MovableSet, RsuId, RsuSet};
pub use detector::{Detector, DetectorRecord};
use serde::{Deserialize, Serialize};

mod detector;

/// A road-side unit.
#[derive(Clone, Debug)]
pub struct Rsu {
    pub(crate) lane: LaneId,
    pub(crate) x: f64,
    /// Whether drivers react to this unit.
    pub(crate) noticeable: bool,
    pub(crate) kind: RsuKind,
}

#[derive(Clone, Debug)]
pub enum RsuKind {
    /// Counts passing vehicles. Drivers never react to it.
    Detector(Detector),
    /// A stop line governed by a traffic light.
    TrafficLight(LightState),
    /// The start of a lower speed limit. `None` uses the limit of the lane.
    SpeedReduction { speed: Option<f64> },
    /// The end of a lane that splits; placed automatically.
    Split,
    /// The end of a region shared with another lane.
    Conflict(ConflictRsu),
}

/// The state of a traffic light.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LightState {
    Red,
    Amber,
    Green,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConflictKind {
    /// Both lanes continue onto the same lane.
    Merge,
    /// Both lanes leave from the same lane.
    Split,
    /// The lanes cross.
    Crossing,
}

/// One side of a conflict between two lanes. The unit is placed at the end
/// of the conflict region on its lane.
#[derive(Clone, Debug)]
pub struct ConflictRsu {
    pub(crate) kind: ConflictKind,
    /// Whether traffic on this lane has priority over the other lane.
    pub(crate) priority: bool,
    /// The length of the conflict region on this lane, in m.
    pub(crate) length: f64,
    /// Whether vehicles must not stop inside the conflict region.
    pub(crate) keep_clear: bool,
    /// The distance from which the other lane is visible, in m.
    pub(crate) visibility: f64,
    /// The unit on the other lane.
    pub(crate) other: RsuId,
    /// The most downstream movable whose rear has not passed the conflict end.
    pub(crate) up: Option<MovableId>,
}

/// One lane's side of a conflict, as given when adding a conflict.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConflictSide {
    pub lane: LaneId,
    /// The position of the end of the conflict region along the lane, in m.
    pub end: f64,
    /// The length of the conflict region along the lane, in m.
    pub length: f64,
    pub priority: bool,
    pub keep_clear: bool,
    /// The distance from which the other lane is visible, in m.
    pub visibility: f64,
}

/// Something that updates road-side units each time step, like a traffic
/// light controller.
pub trait Controller {
    /// Updates the controlled units. `t` is the time at the start of the step.
    fn run(&mut self, t: f64, dt: f64, rsus: &mut RsuSet);
}

impl Rsu {
    pub(crate) fn new(lane: LaneId, x: f64, kind: RsuKind) -> Self {
        let noticeable = !matches!(kind, RsuKind::Detector(_));
        Self {
            lane,
            x,
            noticeable,
            kind,
        }
    }

    pub fn lane(&self) -> LaneId {
        self.lane
    }

    /// The position along the lane in m.
    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn is_noticeable(&self) -> bool {
        self.noticeable
    }

    pub fn kind(&self) -> &RsuKind {
        &self.kind
    }

    pub fn detector(&self) -> Option<&Detector> {
        match &self.kind {
            RsuKind::Detector(det) => Some(det),
            _ => None,
        }
    }

    pub(crate) fn detector_mut(&mut self) -> Option<&mut Detector> {
        match &mut self.kind {
            RsuKind::Detector(det) => Some(det),
            _ => None,
        }
    }

    pub fn light_state(&self) -> Option<LightState> {
        match &self.kind {
            RsuKind::TrafficLight(state) => Some(*state),
            _ => None,
        }
    }

    pub fn conflict(&self) -> Option<&ConflictRsu> {
        match &self.kind {
            RsuKind::Conflict(conflict) => Some(conflict),
            _ => None,
        }
    }

    /// Sets the state of a traffic light; does nothing for other units.
    pub fn set_light(&mut self, state: LightState) {
        if let RsuKind::TrafficLight(light) = &mut self.kind {
            *light = state;
        }
    }
}

impl ConflictRsu {
    pub fn kind(&self) -> ConflictKind {
        self.kind
    }

    pub fn has_priority(&self) -> bool {
        self.priority
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    pub fn keep_clear(&self) -> bool {
        self.keep_clear
    }

    pub fn visibility(&self) -> f64 {
        self.visibility
    }

    pub fn other(&self) -> RsuId {
        self.other
    }

    /// The movable approaching or occupying the conflict on this lane.
    pub fn up(&self) -> Option<MovableId> {
        self.up
    }
}

/// Runs the per-step bookkeeping of the units themselves.
pub(crate) fn run_rsus(rsus: &mut RsuSet, network: &Network, movables: &MovableSet, t: f64) {
    for rsu in rsus.values_mut() {
        let Rsu { lane, x, kind, .. } = rsu;
        match kind {
            RsuKind::Detector(det) => det.aggregate(t),
            RsuKind::Conflict(conflict) => conflict.up = conflict_up(network, movables, *lane, *x),
            _ => {}
        }
    }
}

/// The most downstream movable whose rear has not passed position `x` of `lane`.
fn conflict_up(network: &Network, movables: &MovableSet, lane: LaneId, x: f64) -> Option<MovableId> {
    let none = |_: MovableId| false;
    let straddling = find_down(network, movables, lane, x, &none).filter(|id| {
        let movable = &movables[*id];
        network
            .relative_x(lane, movable.lane, movable.rear())
            .map_or(false, |rear| rear < x)
    });
    straddling.or_else(|| find_up(network, movables, lane, x, &none))
}
