//! Recorded vehicle trajectories.

use crate::movable::Movable;
use crate::{LaneId, MovableId};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// The state of a vehicle at one moment.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrajectorySample {
    /// Simulation time in s.
    pub t: f64,
    pub lane: LaneId,
    /// Position of the front along the lane in m.
    pub x: f64,
    /// Velocity in m/s.
    pub v: f64,
    /// Acceleration in m/s<sup>2</sup>.
    pub a: f64,
}

/// The trajectory of one vehicle, sampled at a fixed period.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Trajectory {
    vehicle: MovableId,
    period: f64,
    samples: Vec<TrajectorySample>,
}

impl Trajectory {
    pub(crate) fn new(vehicle: MovableId, period: f64) -> Self {
        Self {
            vehicle,
            period,
            samples: vec![],
        }
    }

    /// The vehicle this trajectory belongs to.
    pub fn vehicle(&self) -> MovableId {
        self.vehicle
    }

    pub fn samples(&self) -> &[TrajectorySample] {
        &self.samples
    }

    /// Serialises the trajectory for export.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Samples the movable if a period has passed since the last sample.
    pub(crate) fn record(&mut self, t: f64, movable: &Movable) {
        let due = self
            .samples
            .last()
            .map_or(true, |last| t - last.t >= self.period - 1e-9);
        if due {
            self.samples.push(TrajectorySample {
                t,
                lane: movable.lane,
                x: movable.x,
                v: movable.v,
                a: movable.a,
            });
        }
    }
}

/// Holds the trajectories of vehicles that left the network until they are taken.
#[derive(Clone, Debug, Default)]
pub(crate) struct TrajectorySink {
    buffer: VecDeque<Trajectory>,
    capacity: usize,
}

impl TrajectorySink {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::new(),
            capacity,
        }
    }

    /// Adds a finished trajectory, dropping the oldest when the buffer is full.
    pub fn push(&mut self, trajectory: Trajectory) {
        if self.capacity == 0 {
            return;
        }
        while self.buffer.len() >= self.capacity {
            if let Some(dropped) = self.buffer.pop_front() {
                log::debug!("trajectory buffer full, dropping {:?}", dropped.vehicle);
            }
        }
        self.buffer.push_back(trajectory);
    }

    pub fn take(&mut self) -> Vec<Trajectory> {
        self.buffer.drain(..).collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::movable::{Movable, Vehicle};
    use crate::network::Route;
    use slotmap::Key;

    fn movable(x: f64) -> Movable {
        let vehicle = Vehicle {
            route: Route::Free,
            max_speed: 30.0,
            lane_change: None,
            trajectory: None,
            equipped: false,
        };
        Movable::new_vehicle(MovableId::null(), LaneId::null(), x, 4.0, 10.0, vehicle)
    }

    #[test]
    fn samples_at_period() {
        let mut traj = Trajectory::new(MovableId::null(), 1.0);
        for i in 0..10 {
            let t = i as f64 * 0.5;
            traj.record(t, &movable(t * 10.0));
        }
        let ts = traj.samples().iter().map(|s| s.t).collect::<Vec<_>>();
        assert_eq!(ts, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn sink_drops_oldest() {
        let mut sink = TrajectorySink::new(2);
        for _ in 0..3 {
            sink.push(Trajectory::new(MovableId::null(), 1.0));
        }
        assert_eq!(sink.take().len(), 2);
        assert!(sink.take().is_empty());
    }
}
