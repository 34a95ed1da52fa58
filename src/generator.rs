//! Vehicle generation at the start of a lane.

use crate::driver::DriverParams;
use crate::error::{NetworkError, NetworkResult};
use crate::movable::graph::find_down;
use crate::network::{Network, Route};
use crate::{LaneId, MovableId, MovableSet};
use rand::distributions::WeightedIndex;
use rand::Rng;
use rand_distr::{Distribution, Exp, Normal};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// The number of speeds probed when inserting behind another vehicle.
const INSERTION_PROBES: usize = 10;

/// A class of vehicles a generator draws from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleClass {
    /// Relative frequency of this class.
    pub weight: f64,
    /// Vehicle length in m.
    pub length: f64,
    /// Absolute maximum speed in m/s.
    pub max_speed: f64,
    pub driver: DriverParams,
    /// Standard deviation of the desired speed factor around `driver.f_speed`.
    pub speed_spread: f64,
    /// Share of the vehicles carrying an on-board unit, between 0 and 1.
    pub equipped_share: f64,
}

impl Default for VehicleClass {
    fn default() -> Self {
        Self {
            weight: 1.0,
            length: 4.0,
            max_speed: 160.0 / 3.6,
            driver: DriverParams::default(),
            speed_spread: 0.0,
            equipped_share: 0.0,
        }
    }
}

/// A vehicle waiting to be inserted.
#[derive(Clone, Debug)]
pub(crate) struct PendingVehicle {
    pub length: f64,
    pub max_speed: f64,
    pub driver: DriverParams,
    pub route: Route,
    pub equipped: bool,
}

/// Generates vehicles with exponentially distributed headways.
#[derive(Clone, Debug)]
pub struct Generator {
    lane: LaneId,
    /// Flow in veh/h.
    flow: f64,
    classes: Vec<VehicleClass>,
    routes: Vec<(Route, f64)>,
    next_arrival: Option<f64>,
    queue: VecDeque<PendingVehicle>,
}

impl Generator {
    /// Creates a generator inserting `flow` vehicles per hour onto `lane`.
    pub fn new(lane: LaneId, flow: f64) -> NetworkResult<Self> {
        if !(flow >= 0.0) || !flow.is_finite() {
            return Err(NetworkError::InvalidParameter {
                name: "flow",
                reason: format!("must be a non-negative number of vehicles per hour, got {}", flow),
            });
        }
        Ok(Self {
            lane,
            flow,
            classes: vec![],
            routes: vec![],
            next_arrival: None,
            queue: VecDeque::new(),
        })
    }

    /// Adds a vehicle class. Without classes the default class is used.
    pub fn with_class(mut self, class: VehicleClass) -> Self {
        self.classes.push(class);
        self
    }

    /// Adds a route with a relative weight. Without routes vehicles drive freely.
    pub fn with_route(mut self, route: Route, weight: f64) -> Self {
        self.routes.push((route, weight));
        self
    }

    pub fn lane(&self) -> LaneId {
        self.lane
    }

    pub fn flow(&self) -> f64 {
        self.flow
    }

    /// The number of vehicles waiting to be inserted.
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Queues the vehicles arriving up to time `t`.
    pub(crate) fn arrivals(&mut self, t: f64, rng: &mut impl Rng) {
        if self.flow <= 0.0 {
            return;
        }
        let Ok(headways) = Exp::new(self.flow / 3600.0) else {
            return;
        };
        let mut next = self.next_arrival.unwrap_or_else(|| t + headways.sample(rng));
        while next <= t {
            let vehicle = self.sample_vehicle(rng);
            self.queue.push_back(vehicle);
            next += headways.sample(rng);
        }
        self.next_arrival = Some(next);
    }

    fn sample_vehicle(&self, rng: &mut impl Rng) -> PendingVehicle {
        let default_class = VehicleClass::default();
        let class = WeightedIndex::new(self.classes.iter().map(|c| c.weight))
            .map(|dist| &self.classes[dist.sample(rng)])
            .unwrap_or(&default_class);
        let route = WeightedIndex::new(self.routes.iter().map(|r| r.1))
            .map(|dist| self.routes[dist.sample(rng)].0)
            .unwrap_or(Route::Free);

        let mut driver = class.driver;
        if class.speed_spread > 0.0 {
            if let Ok(spread) = Normal::new(driver.f_speed, class.speed_spread) {
                let f_speed = driver.f_speed;
                driver.f_speed = spread.sample(rng).clamp(0.75 * f_speed, 1.25 * f_speed);
            }
        }

        PendingVehicle {
            length: class.length,
            max_speed: class.max_speed,
            driver,
            route,
            equipped: rng.gen_bool(class.equipped_share.clamp(0.0, 1.0)),
        }
    }

    /// Takes the next vehicle from the queue if it can be inserted now,
    /// together with its position and speed.
    pub(crate) fn try_insert(
        &mut self,
        network: &Network,
        movables: &MovableSet,
    ) -> Option<(PendingVehicle, f64, f64)> {
        let pending = self.queue.front()?;
        let (x, v) = self.insertion_point(pending, network, movables)?;
        let pending = self.queue.pop_front()?;
        Some((pending, x, v))
    }

    /// Probes the car following model for the highest speed at which the
    /// vehicle can enter behind the first vehicle on the lane.
    fn insertion_point(
        &self,
        pending: &PendingVehicle,
        network: &Network,
        movables: &MovableSet,
    ) -> Option<(f64, f64)> {
        let lane = &network[self.lane];
        let x = pending.length.min(lane.length());
        let v0 = f64::min(pending.max_speed, pending.driver.f_speed * lane.speed_limit());
        let none = |_: MovableId| false;
        let Some(leader) = find_down(network, movables, self.lane, 0.0, &none) else {
            return Some((x, v0));
        };
        let leader = &movables[leader];
        let Some(pos) = network.relative_x(self.lane, leader.lane, leader.x) else {
            return Some((x, v0));
        };
        let gap = pos - leader.length - x;
        let idm = pending.driver.idm();
        if gap <= idm.s0 {
            log::trace!("generator on {:?}: no room ({:.1} m)", self.lane, gap);
            return None;
        }
        for i in 0..=INSERTION_PROBES {
            let v = v0 * (1.0 - i as f64 / INSERTION_PROBES as f64);
            let acc = idm.longitudinal(v, v - leader.v, v0, gap);
            log::trace!("generator on {:?}: probe v={:.1} acc={:.2}", self.lane, v, acc);
            if acc >= -idm.b {
                return Some((x, v));
            }
        }
        None
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use slotmap::Key;

    #[test]
    fn arrivals_match_flow() {
        let mut generator = Generator::new(LaneId::null(), 1800.0).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        generator.arrivals(3600.0, &mut rng);
        // 1800 veh/h expected; allow a generous margin for randomness
        let n = generator.queue_len();
        assert!(n > 1600 && n < 2000, "{} arrivals", n);
    }

    #[test]
    fn zero_flow_generates_nothing() {
        let mut generator = Generator::new(LaneId::null(), 0.0).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        generator.arrivals(3600.0, &mut rng);
        assert_eq!(generator.queue_len(), 0);
    }

    #[test]
    fn rejects_negative_flow() {
        assert!(Generator::new(LaneId::null(), -1.0).is_err());
    }

    #[test]
    fn speed_factor_is_clamped() {
        let class = VehicleClass {
            speed_spread: 5.0,
            ..Default::default()
        };
        let generator = Generator::new(LaneId::null(), 100.0).unwrap().with_class(class);
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            let f = generator.sample_vehicle(&mut rng).driver.f_speed;
            assert!((0.75..=1.25).contains(&f));
        }
    }
}
