use serde::{Deserialize, Serialize};

/// Aggregated detector data of one period.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectorRecord {
    pub period_start: f64,
    pub period_end: f64,
    /// The number of vehicles that passed.
    pub count: u32,
    /// The arithmetic mean of their speeds in m/s; zero if none passed.
    pub mean_speed: f64,
}

/// Counts vehicles passing a point and aggregates their speeds per period.
#[derive(Clone, Debug)]
pub struct Detector {
    period: f64,
    store: bool,
    period_start: f64,
    count: u32,
    speed_sum: f64,
    records: Vec<DetectorRecord>,
}

impl Detector {
    /// Creates a detector whose first aggregation period starts at `delay` s.
    pub fn new(period: f64, delay: f64, store: bool) -> Self {
        Self {
            period,
            store,
            period_start: delay,
            count: 0,
            speed_sum: 0.0,
            records: vec![],
        }
    }

    /// The number of vehicles counted in the running period.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// The mean speed of the vehicles counted in the running period.
    pub fn mean_speed(&self) -> Option<f64> {
        (self.count > 0).then(|| self.speed_sum / self.count as f64)
    }

    /// The stored records of completed periods.
    pub fn records(&self) -> &[DetectorRecord] {
        &self.records
    }

    /// Drains the stored records.
    pub fn take_records(&mut self) -> Vec<DetectorRecord> {
        std::mem::take(&mut self.records)
    }

    /// Registers a vehicle passing at time `t` with speed `v`.
    pub(crate) fn pass(&mut self, t: f64, v: f64) {
        if t >= self.period_start {
            self.count += 1;
            self.speed_sum += v;
        }
    }

    /// Closes every period that has ended by time `t`.
    pub(crate) fn aggregate(&mut self, t: f64) {
        while self.period > 0.0 && t >= self.period_start + self.period {
            let period_end = self.period_start + self.period;
            if self.store {
                self.records.push(DetectorRecord {
                    period_start: self.period_start,
                    period_end,
                    count: self.count,
                    mean_speed: self.mean_speed().unwrap_or(0.0),
                });
            }
            log::debug!(
                "detector period {:.0}-{:.0} s: {} vehicles",
                self.period_start,
                period_end,
                self.count
            );
            self.count = 0;
            self.speed_sum = 0.0;
            self.period_start = period_end;
        }
    }
}

#[cfg(test)]
mod test {
    use super::Detector;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn aggregates_per_period() {
        let mut det = Detector::new(60.0, 0.0, true);
        det.pass(10.0, 10.0);
        det.pass(20.0, 20.0);
        assert_eq!(det.count(), 2);
        assert_approx_eq!(det.mean_speed().unwrap(), 15.0);

        det.aggregate(59.5);
        assert_eq!(det.count(), 2);
        det.aggregate(60.0);
        assert_eq!(det.count(), 0);
        assert!(det.mean_speed().is_none());

        let records = det.take_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].count, 2);
        assert_approx_eq!(records[0].mean_speed, 15.0);
        assert!(det.records().is_empty());
    }

    #[test]
    fn ignores_vehicles_during_warm_up() {
        let mut det = Detector::new(60.0, 120.0, false);
        det.pass(50.0, 10.0);
        assert_eq!(det.count(), 0);
        det.aggregate(180.0);
        det.pass(181.0, 10.0);
        assert_eq!(det.count(), 1);
        assert!(det.records().is_empty());
    }
}
