/// Parameters of the IDM+ car following model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Idm {
    /// Stopping distance in m.
    pub s0: f64,
    /// Maximum acceleration in m/s<sup>2</sup>.
    pub a: f64,
    /// Comfortable deceleration in m/s<sup>2</sup>.
    pub b: f64,
    /// Maximum deceleration when above the desired speed, in m/s<sup>2</sup>.
    pub b0: f64,
    /// Desired time headway in s.
    pub t: f64,
}

impl Idm {
    /// The IDM+ acceleration.
    ///
    /// # Parameters
    /// * `v` - Own speed in m/s
    /// * `dv` - Approaching rate, own speed minus the leader's speed
    /// * `v0` - Desired speed in m/s
    /// * `s` - Net gap to the leader in m, infinite without a leader
    pub fn longitudinal(&self, v: f64, dv: f64, v0: f64, s: f64) -> f64 {
        let s_star = f64::max(self.s0 + v * self.t + v * dv / (2.0 * (self.a * self.b).sqrt()), 0.0);
        let s = f64::max(s, 1e-99);
        let a_int = self.a * (1.0 - (s_star / s).powi(2));
        f64::min(a_int, self.free(v, v0))
    }

    /// The free road acceleration.
    pub fn free(&self, v: f64, v0: f64) -> f64 {
        f64::max(self.a * (1.0 - (v / v0).powi(4)), -self.b0)
    }

    /// The same parameters with a different headway.
    pub fn with_headway(self, t: f64) -> Self {
        Self { t, ..self }
    }

    /// A hashable fingerprint of the parameters.
    pub(crate) fn key(&self) -> [u64; 3] {
        [self.s0.to_bits(), self.a.to_bits(), self.t.to_bits()]
    }
}

/// The time needed to travel `s` metres starting at speed `v` with constant
/// acceleration `a`. Infinite if the distance is never covered.
pub fn anticipate(s: f64, v: f64, a: f64) -> f64 {
    if s <= 0.0 {
        return 0.0;
    }
    if a == 0.0 {
        return if v > 0.0 { s / v } else { f64::INFINITY };
    }
    let tmp = v * v + 2.0 * a * s;
    if tmp < 0.0 {
        f64::INFINITY
    } else {
        (tmp.sqrt() - v) / a
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    const IDM: Idm = Idm {
        s0: 3.0,
        a: 1.25,
        b: 2.09,
        b0: 0.5,
        t: 1.2,
    };

    #[test]
    fn free_road() {
        assert_approx_eq!(IDM.longitudinal(0.0, 0.0, 30.0, f64::INFINITY), 1.25);
        assert_approx_eq!(IDM.longitudinal(30.0, 0.0, 30.0, f64::INFINITY), 0.0);
        // Far above the desired speed the deceleration is bounded
        assert_approx_eq!(IDM.free(40.0, 20.0), -0.5);
    }

    #[test]
    fn never_exceeds_free_acceleration() {
        for v in [0.0, 5.0, 15.0, 30.0] {
            for dv in [-10.0, 0.0, 10.0] {
                for s in [0.5, 5.0, 50.0, 500.0] {
                    assert!(IDM.longitudinal(v, dv, 25.0, s) <= IDM.free(v, 25.0));
                }
            }
        }
    }

    #[test]
    fn closer_gap_brakes_harder() {
        let mut last = f64::INFINITY;
        for i in (1..200).rev() {
            let s = i as f64 * 0.5;
            let acc = IDM.longitudinal(20.0, 5.0, 30.0, s);
            assert!(acc <= last);
            last = acc;
        }
    }

    #[test]
    fn zero_gap_brakes_hard() {
        let acc = IDM.longitudinal(10.0, 0.0, 30.0, 0.0);
        assert!(acc < -1e6);
    }

    #[test]
    fn anticipate_edge_cases() {
        assert_eq!(anticipate(0.0, 10.0, 2.0), 0.0);
        assert_eq!(anticipate(-3.0, 0.0, 0.0), 0.0);
        assert_eq!(anticipate(10.0, 0.0, 0.0), f64::INFINITY);
        assert_approx_eq!(anticipate(10.0, 5.0, 0.0), 2.0);
        // 0.5 * 2 * t^2 = 16 => t = 4
        assert_approx_eq!(anticipate(16.0, 0.0, 2.0), 4.0);
        // Braking to a stop before covering the distance
        assert_eq!(anticipate(100.0, 10.0, -2.0), f64::INFINITY);
        // s = 10t - t^2 reaches 16 at t = 2
        assert_approx_eq!(anticipate(16.0, 10.0, -2.0), 2.0);
    }
}
