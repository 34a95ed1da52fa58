use crate::{LaneId, RsuId};
use thiserror::Error;

/// Errors raised while building or configuring a network.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("lane {0:?} does not exist")]
    UnknownLane(LaneId),

    #[error("road-side unit {0:?} does not exist")]
    UnknownRsu(RsuId),

    #[error("lanes {0:?} and {1:?} do not overlap, no conflict region found")]
    NoConflictRegion(LaneId, LaneId),

    #[error("lanes {0:?} and {1:?} are not adjacent")]
    NotAdjacent(LaneId, LaneId),

    #[error("position {x} lies outside lane {lane:?} of length {length}")]
    OutsideLane { lane: LaneId, x: f64, length: f64 },

    #[error("invalid value for {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("setting {key} expected a {expected} value")]
    InvalidSetting { key: String, expected: &'static str },

    #[error("failed to parse settings: {0}")]
    SettingsFormat(#[from] serde_json::Error),
}

pub type NetworkResult<T> = Result<T, NetworkError>;
