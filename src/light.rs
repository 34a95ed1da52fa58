use crate::rsu::{Controller, LightState};
use crate::{RsuId, RsuSet};
use serde::{Deserialize, Serialize};

/// A fixed-time controller for a set of coordinated traffic lights.
#[derive(Clone, Debug, Default)]
pub struct TrafficLightController {
    /// The movements.
    movements: Vec<Movement>,
    /// The conflicts between the movements.
    conflicts: Vec<Conflict>,
    /// The stages, cycled through in order.
    stages: Vec<LightStage>,
    /// The index of the current stage.
    stage: usize,
    /// The time spent in the current stage in s.
    stage_time: f64,
}

/// A stage of a fixed-time plan: the movements that are green, and for how long.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LightStage {
    pub movements: Vec<usize>,
    /// Duration in s.
    pub duration: f64,
}

/// A single traffic light movement.
#[derive(Clone, Debug)]
struct Movement {
    /// The traffic light units showing this movement's state.
    rsus: Vec<RsuId>,
    /// The current state.
    state: LightState,
    /// Whether the target state is green.
    active: bool,
    /// The time since the current state was entered, in s.
    since: f64,
    /// The duration of the amber phase in s.
    amber_time: f64,
}

/// Represents one traffic light movement's conflict with another.
#[derive(Clone, Copy, Debug)]
struct Conflict {
    /// The movement which is the subject of the conflict.
    subject: usize,
    /// The movement which conflicts with the subject.
    other: usize,
    /// The time in s that the conflicting movement must be red
    /// before the subject movement is allowed to turn green.
    wait: f64,
}

impl TrafficLightController {
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds a movement shown by the given traffic light units and returns its index.
    pub fn add_movement(&mut self, rsus: &[RsuId], amber_time: f64) -> usize {
        self.movements.push(Movement {
            rsus: rsus.to_vec(),
            state: LightState::Red,
            active: false,
            since: f64::INFINITY,
            amber_time,
        });
        self.movements.len() - 1
    }

    /// Specifies that movements `a` and `b` may not be green together, and that
    /// either must have been red for `wait` seconds before the other turns green.
    pub fn add_conflict(&mut self, a: usize, b: usize, wait: f64) {
        self.conflicts.push(Conflict {
            subject: a,
            other: b,
            wait,
        });
        self.conflicts.push(Conflict {
            subject: b,
            other: a,
            wait,
        });
    }

    pub fn add_stage(&mut self, stage: LightStage) {
        self.stages.push(stage);
    }

    /// The current state of a movement.
    pub fn state(&self, movement: usize) -> Option<LightState> {
        self.movements.get(movement).map(|m| m.state)
    }

    /// Advances the stage plan.
    fn advance_stage(&mut self, dt: f64) {
        if self.stages.is_empty() {
            return;
        }
        self.stage_time += dt;
        if self.stage_time >= self.stages[self.stage].duration {
            self.stage = (self.stage + 1) % self.stages.len();
            self.stage_time = 0.0;
        }
        let active = &self.stages[self.stage].movements;
        for (idx, movement) in self.movements.iter_mut().enumerate() {
            movement.active = active.contains(&idx);
        }
    }

    /// Checks that a movement is not blocked by any other movements.
    fn can_turn_green(&self, movement: usize) -> bool {
        self.conflicts
            .iter()
            .filter(|conflict| conflict.subject == movement)
            .all(|conflict| {
                let movement = &self.movements[conflict.other];
                movement.state == LightState::Red && movement.since >= conflict.wait
            })
    }
}

impl Controller for TrafficLightController {
    fn run(&mut self, _t: f64, dt: f64, rsus: &mut RsuSet) {
        self.advance_stage(dt);

        let next = (0..self.movements.len())
            .map(|idx| {
                use LightState::*;
                let movement = &self.movements[idx];
                match (movement.active, movement.state) {
                    (false, Green) => Amber,
                    (_, Amber) if movement.since >= movement.amber_time => Red,
                    (true, Red) if self.can_turn_green(idx) => Green,
                    (_, state) => state,
                }
            })
            .collect::<Vec<_>>();

        for (movement, next) in self.movements.iter_mut().zip(next) {
            if next != movement.state {
                movement.state = next;
                movement.since = dt;
            } else {
                movement.since += dt;
            }
            for rsu in &movement.rsus {
                if let Some(rsu) = rsus.get_mut(*rsu) {
                    rsu.set_light(movement.state);
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn run_for(ctrl: &mut TrafficLightController, rsus: &mut RsuSet, secs: f64) {
        let dt = 0.5;
        for _ in 0..(secs / dt) as usize {
            ctrl.run(0.0, dt, rsus);
        }
    }

    #[test]
    fn conflicting_movements_alternate() {
        let mut rsus = RsuSet::with_key();
        let mut ctrl = TrafficLightController::new();
        let a = ctrl.add_movement(&[], 3.0);
        let b = ctrl.add_movement(&[], 3.0);
        ctrl.add_conflict(a, b, 2.0);
        ctrl.add_stage(LightStage {
            movements: vec![a],
            duration: 30.0,
        });
        ctrl.add_stage(LightStage {
            movements: vec![b],
            duration: 30.0,
        });

        run_for(&mut ctrl, &mut rsus, 10.0);
        assert_eq!(ctrl.state(a), Some(LightState::Green));
        assert_eq!(ctrl.state(b), Some(LightState::Red));

        // Stage switch: amber first, the other waits for clearance
        run_for(&mut ctrl, &mut rsus, 21.0);
        assert_eq!(ctrl.state(a), Some(LightState::Amber));
        assert_eq!(ctrl.state(b), Some(LightState::Red));

        run_for(&mut ctrl, &mut rsus, 6.0);
        assert_eq!(ctrl.state(a), Some(LightState::Red));
        assert_eq!(ctrl.state(b), Some(LightState::Green));
    }
}
