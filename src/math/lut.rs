use crate::util::Interval;

/// A lookup table of values sampled at regular intervals.
#[derive(Clone, Debug)]
pub struct LookupTable<T> {
    offset: f64,
    step: f64,
    values: Vec<T>,
}

impl<T> LookupTable<T> {
    /// Creates a lookup table by sampling `f` at both ends of `range`
    /// and every `step` in between.
    pub fn from_samples(range: Interval<f64>, step: f64, f: impl FnMut(f64) -> T) -> Self {
        let offset = range.min;
        let num_steps = (range.length() / step).ceil().max(1.0) as usize;
        let step = range.length() / num_steps as f64;
        let xs = (0..=num_steps).map(|i| offset + i as f64 * step);
        let values = xs.map(f).collect();
        Self {
            offset,
            step,
            values,
        }
    }

    fn index(&self, x: f64) -> usize {
        let idx = (x - self.offset) / self.step;
        if idx.is_nan() || idx <= 0.0 {
            0
        } else {
            usize::min(idx as usize, self.values.len() - 1)
        }
    }
}

impl LookupTable<Option<f64>> {
    /// Linearly interpolates between the two samples around `x`.
    /// Returns `None` if either sample is unavailable.
    pub fn interpolate(&self, x: f64) -> Option<f64> {
        if self.step == 0.0 || self.values.len() == 1 {
            return self.values[0];
        }
        let idx = usize::min(self.index(x), self.values.len() - 2);
        let (y1, y2) = (self.values[idx]?, self.values[idx + 1]?);
        let f = (x - self.offset) / self.step - idx as f64;
        Some(y1 + f * (y2 - y1))
    }
}

#[cfg(test)]
mod test {
    use super::LookupTable;
    use crate::util::Interval;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn interpolated_sample() {
        let lut = LookupTable::from_samples(Interval::new(0.0, 100.0), 4.0, |x| Some(0.5 * x));
        assert_approx_eq!(lut.interpolate(10.0).unwrap(), 5.0);
        assert_approx_eq!(lut.interpolate(99.0).unwrap(), 49.5);
        assert_approx_eq!(lut.interpolate(120.0).unwrap(), 60.0);
    }

    #[test]
    fn interpolation_through_gap_is_unavailable() {
        let lut =
            LookupTable::from_samples(Interval::new(0.0, 10.0), 1.0, |x| (x < 5.0).then_some(x));
        assert!(lut.interpolate(2.5).is_some());
        assert!(lut.interpolate(7.5).is_none());
    }
}
