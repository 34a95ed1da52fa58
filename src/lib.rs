//! A microscopic, lane-based traffic simulation.
//!
//! Vehicles follow each other with the IDM+ car following model, change lanes
//! according to LMRS and react to road-side units such as traffic lights and
//! conflicts between lanes.

pub use cgmath;
pub use driver::{anticipate, Driver, DriverParams, Idm};
pub use error::{NetworkError, NetworkResult};
pub use generator::{Generator, VehicleClass};
pub use light::{LightStage, TrafficLightController};
pub use movable::{Direction, LaneChange, Movable, MovableKind, Side, Vehicle};
pub use network::{Lane, LaneAttributes, LaneChangeRule, Route};
pub use rsu::{
    ConflictKind, ConflictRsu, ConflictSide, Controller, Detector, DetectorRecord, LightState, Rsu,
    RsuKind,
};
pub use settings::{SettingValue, Settings, SimulationConfig};
pub use simulation::{Diagnostic, Simulation, WorldPose};
use slotmap::{new_key_type, SlotMap};
pub use slotmap::{Key, KeyData};
pub use trajectory::{Trajectory, TrajectorySample};
pub use util::Interval;

mod conflict;
mod driver;
mod error;
mod generator;
mod light;
pub mod math;
mod movable;
mod network;
mod rsu;
mod settings;
mod simulation;
mod trajectory;
mod util;

new_key_type! {
    /// Unique ID of a [Lane].
    pub struct LaneId;
    /// Unique ID of a [Movable], either a vehicle or a lane change shadow.
    pub struct MovableId;
    /// Unique ID of a [Rsu].
    pub struct RsuId;
    /// Unique ID of a registered [Controller].
    pub struct ControllerId;
}

type LaneSet = SlotMap<LaneId, Lane>;
type MovableSet = SlotMap<MovableId, Movable>;

/// The road-side units of a simulation.
pub type RsuSet = SlotMap<RsuId, Rsu>;
