//! Caches that live for a single time step.

use crate::{LaneId, MovableId};
use std::collections::HashMap;

/// Why an acceleration was computed; part of the memo key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum AccLabel {
    Follow,
    Gap,
    Sync,
    Yield,
    Intersection,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct AccKey {
    leader: Option<MovableId>,
    label: AccLabel,
    params: [u64; 3],
}

/// Anticipated speeds found by scanning a lane.
#[derive(Clone, Debug, Default)]
pub(crate) struct SpeedScan {
    pub in_lane: HashMap<LaneId, f64>,
    /// Speeds imposed on a lane by vehicles on its left indicating right.
    pub from_left: HashMap<LaneId, f64>,
    /// Speeds imposed on a lane by vehicles on its right indicating left.
    pub from_right: HashMap<LaneId, f64>,
}

/// Per step state of a driver, cleared on the first use in a new step.
#[derive(Clone, Debug, Default)]
pub(crate) struct StepMemo {
    step: Option<u64>,
    acc: HashMap<AccKey, f64>,
    pub speeds: SpeedScan,
    /// Whether an intersection has been noticed this step.
    pub intersection: bool,
}

impl StepMemo {
    /// Clears the memo if `step` differs from the step it was filled in.
    pub fn begin(&mut self, step: u64) {
        if self.step != Some(step) {
            self.step = Some(step);
            self.acc.clear();
            self.speeds = Default::default();
            self.intersection = false;
        }
    }

    pub fn acc(&self, leader: Option<MovableId>, label: AccLabel, params: [u64; 3]) -> Option<f64> {
        self.acc
            .get(&AccKey {
                leader,
                label,
                params,
            })
            .copied()
    }

    pub fn store_acc(&mut self, leader: Option<MovableId>, label: AccLabel, params: [u64; 3], acc: f64) {
        self.acc.insert(
            AccKey {
                leader,
                label,
                params,
            },
            acc,
        );
    }
}
