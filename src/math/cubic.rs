use serde::{Deserialize, Serialize};

/// A cubic function of one variable, used to smooth the lateral
/// movement of a vehicle during a lane change.
#[derive(Clone, Copy, Serialize, Deserialize, Debug)]
pub struct CubicFn {
    coeffs: [f64; 4],
    offset: f64,
}

impl CubicFn {
    /// A cubic through `(x1, y1)` and `(x2, y2)` with zero slope at both ends.
    pub fn from_ends(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        let (x, y) = (x2 - x1, y2 - y1);
        let a = -2.0 * y * x.powi(-3);
        let b = 3.0 * y * x.powi(-2);
        Self {
            coeffs: [a, b, 0.0, y1],
            offset: -x1,
        }
    }

    pub fn y(&self, x: f64) -> f64 {
        let c = &self.coeffs;
        let x = x + self.offset;
        c[0] * x * x * x + c[1] * x * x + c[2] * x + c[3]
    }

    #[cfg(test)]
    fn dy(&self, x: f64) -> f64 {
        let c = &self.coeffs;
        let x = x + self.offset;
        c[0] * 3. * x * x + c[1] * 2. * x + c[2]
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn from_ends() {
        let cubic = CubicFn::from_ends(10., 20., 45.0, 5.0);
        assert_approx_eq!(cubic.y(10.), 20., 0.01);
        assert_approx_eq!(cubic.dy(10.), 0., 0.01);
        assert_approx_eq!(cubic.y(45.), 5., 0.01);
        assert_approx_eq!(cubic.dy(45.), 0., 0.01);
    }

    #[test]
    fn lane_change_profile_is_monotonic() {
        let cubic = CubicFn::from_ends(0.0, 0.0, 1.0, 3.5);
        let mut last = cubic.y(0.0);
        for i in 1..=20 {
            let y = cubic.y(i as f64 / 20.0);
            assert!(y >= last);
            last = y;
        }
        assert_approx_eq!(cubic.y(0.5), 1.75, 1e-9);
    }
}
