//! Vehicles and the lane change shadows they project onto adjacent lanes.

use crate::network::Route;
use crate::trajectory::Trajectory;
use crate::{LaneId, MovableId};
use serde::{Deserialize, Serialize};

pub(crate) mod graph;

/// A lateral side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

/// The six neighbour slots of a movable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
    LeftUp,
    LeftDown,
    RightUp,
    RightDown,
}

impl Direction {
    pub const ALL: [Self; 6] = [
        Self::Up,
        Self::Down,
        Self::LeftUp,
        Self::LeftDown,
        Self::RightUp,
        Self::RightDown,
    ];

    /// The upstream neighbour on the given side.
    pub fn up(side: Side) -> Self {
        match side {
            Side::Left => Self::LeftUp,
            Side::Right => Self::RightUp,
        }
    }

    /// The downstream neighbour on the given side.
    pub fn down(side: Side) -> Self {
        match side {
            Side::Left => Self::LeftDown,
            Side::Right => Self::RightDown,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// An object occupying part of a lane: a vehicle or a lane change shadow.
#[derive(Clone, Debug)]
pub struct Movable {
    pub(crate) id: MovableId,
    pub(crate) lane: LaneId,
    /// Position of the front along the lane, in m.
    pub(crate) x: f64,
    pub(crate) length: f64,
    pub(crate) v: f64,
    pub(crate) a: f64,
    pub(crate) indicator: Option<Side>,
    pub(crate) neighbors: [Option<MovableId>; 6],
    pub(crate) kind: MovableKind,
}

#[derive(Clone, Debug)]
pub enum MovableKind {
    Vehicle(Vehicle),
    /// The projection of a lane changing vehicle onto its target lane.
    Shadow { owner: MovableId },
}

/// The vehicle specific state of a movable.
#[derive(Clone, Debug)]
pub struct Vehicle {
    pub(crate) route: Route,
    pub(crate) max_speed: f64,
    pub(crate) lane_change: Option<LaneChange>,
    pub(crate) trajectory: Option<Trajectory>,
    /// Whether the vehicle carries an on-board unit.
    pub(crate) equipped: bool,
}

/// An in-progress lane change.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LaneChange {
    pub side: Side,
    /// Fraction of the lane change completed, from 0 to 1.
    pub progress: f64,
    /// Progress made per time step.
    pub rate: f64,
    /// The shadow on the target lane.
    pub shadow: MovableId,
}

impl Movable {
    pub(crate) fn new_vehicle(
        id: MovableId,
        lane: LaneId,
        x: f64,
        length: f64,
        v: f64,
        vehicle: Vehicle,
    ) -> Self {
        Self {
            id,
            lane,
            x,
            length,
            v,
            a: 0.0,
            indicator: None,
            neighbors: [None; 6],
            kind: MovableKind::Vehicle(vehicle),
        }
    }

    /// Creates the shadow of a vehicle at position `x` of the target lane.
    pub(crate) fn new_shadow(id: MovableId, owner: &Movable, lane: LaneId, x: f64) -> Self {
        Self {
            id,
            lane,
            x,
            length: owner.length,
            v: owner.v,
            a: owner.a,
            indicator: None,
            neighbors: [None; 6],
            kind: MovableKind::Shadow { owner: owner.id },
        }
    }

    pub fn id(&self) -> MovableId {
        self.id
    }

    /// The lane the movable's front is on.
    pub fn lane(&self) -> LaneId {
        self.lane
    }

    /// The position of the front along the lane in m.
    pub fn x(&self) -> f64 {
        self.x
    }

    /// The position of the rear along the lane in m. May be negative.
    pub fn rear(&self) -> f64 {
        self.x - self.length
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    /// The velocity in m/s.
    pub fn velocity(&self) -> f64 {
        self.v
    }

    /// The acceleration applied during the last step in m/s<sup>2</sup>.
    pub fn acceleration(&self) -> f64 {
        self.a
    }

    pub fn indicator(&self) -> Option<Side> {
        self.indicator
    }

    pub fn neighbor(&self, dir: Direction) -> Option<MovableId> {
        self.neighbors[dir.index()]
    }

    pub fn kind(&self) -> &MovableKind {
        &self.kind
    }

    pub fn vehicle(&self) -> Option<&Vehicle> {
        match &self.kind {
            MovableKind::Vehicle(veh) => Some(veh),
            MovableKind::Shadow { .. } => None,
        }
    }

    pub(crate) fn vehicle_mut(&mut self) -> Option<&mut Vehicle> {
        match &mut self.kind {
            MovableKind::Vehicle(veh) => Some(veh),
            MovableKind::Shadow { .. } => None,
        }
    }

    pub fn is_shadow(&self) -> bool {
        matches!(self.kind, MovableKind::Shadow { .. })
    }

    /// The vehicle this movable belongs to: itself, or the owner of a shadow.
    pub fn owner(&self) -> MovableId {
        match self.kind {
            MovableKind::Vehicle(_) => self.id,
            MovableKind::Shadow { owner } => owner,
        }
    }

    /// The other half of a lane changing pair: the shadow of a vehicle,
    /// or the owner of a shadow.
    pub(crate) fn counterpart(&self) -> Option<MovableId> {
        match &self.kind {
            MovableKind::Vehicle(veh) => veh.lane_change.map(|lc| lc.shadow),
            MovableKind::Shadow { owner } => Some(*owner),
        }
    }
}

impl Vehicle {
    pub fn route(&self) -> Route {
        self.route
    }

    /// The maximum speed of the vehicle in m/s.
    pub fn max_speed(&self) -> f64 {
        self.max_speed
    }

    pub fn lane_change(&self) -> Option<&LaneChange> {
        self.lane_change.as_ref()
    }

    pub fn is_changing_lane(&self) -> bool {
        self.lane_change.is_some()
    }

    pub fn is_equipped(&self) -> bool {
        self.equipped
    }
}
