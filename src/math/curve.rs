use super::{Point2d, Vector2d};
use crate::util::Interval;
use cgmath::prelude::*;

/// A parametric curve in 2D space.
pub trait ParametricCurve2d {
    /// Samples the parametric curve.
    fn sample(&self, t: f64) -> Point2d;

    /// Returns the minimum and maximum t-values that define the bounds of the curve.
    fn bounds(&self) -> Interval<f64>;

    /// Samples the derivative of the parametric curve.
    ///
    /// The default implementation approximates the derivative by sampling
    /// two very nearby points along the curve.
    fn sample_dt(&self, t: f64) -> Vector2d {
        let delta = self.bounds().length() * 0.0001;
        let p1 = self.sample(t);
        let p2 = self.sample(t + delta);
        (p2 - p1) / delta
    }
}

impl<T: ParametricCurve2d + ?Sized> ParametricCurve2d for &T {
    fn sample(&self, t: f64) -> Point2d {
        (**self).sample(t)
    }

    fn bounds(&self) -> Interval<f64> {
        (**self).bounds()
    }

    fn sample_dt(&self, t: f64) -> Vector2d {
        (**self).sample_dt(t)
    }
}

/// A straight line segment, parameterised by arc length.
#[derive(Copy, Clone, Debug)]
pub struct LineSegment2d {
    start: Point2d,
    dir: Vector2d,
    length: f64,
}

impl LineSegment2d {
    /// Creates a line segment between two points.
    pub fn from_ends(start: Point2d, end: Point2d) -> Self {
        let length = (end - start).magnitude();
        let dir = if length > 0.0 {
            (end - start) / length
        } else {
            Vector2d::unit_x()
        };
        Self { start, dir, length }
    }
}

impl ParametricCurve2d for LineSegment2d {
    fn sample(&self, t: f64) -> Point2d {
        self.start + t * self.dir
    }

    fn bounds(&self) -> Interval<f64> {
        Interval::new(0.0, self.length)
    }

    fn sample_dt(&self, _t: f64) -> Vector2d {
        self.dir
    }
}

/// A quadratic bezier curve, used for curved lanes such as on- and off-ramps.
#[derive(Copy, Clone, Debug)]
pub struct QuadraticBezier2d {
    points: [Point2d; 3],
}

impl QuadraticBezier2d {
    pub const fn new(points: &[Point2d; 3]) -> Self {
        Self { points: *points }
    }
}

impl ParametricCurve2d for QuadraticBezier2d {
    fn sample(&self, t: f64) -> Point2d {
        let t1 = 1.0 - t;
        let [p0, p1, p2] = self.points.map(|p| p.to_vec());
        Point2d::from_vec(t1 * t1 * p0 + 2.0 * t1 * t * p1 + t * t * p2)
    }

    fn bounds(&self) -> Interval<f64> {
        Interval::new(0.0, 1.0)
    }

    fn sample_dt(&self, t: f64) -> Vector2d {
        let [p0, p1, p2] = self.points.map(|p| p.to_vec());
        2.0 * (1.0 - t) * (p1 - p0) + 2.0 * t * (p2 - p1)
    }
}

/// A cubic bezier curve.
#[derive(Copy, Clone, Debug)]
pub struct CubicBezier2d {
    points: [Point2d; 4],
}

impl CubicBezier2d {
    pub const fn new(points: &[Point2d; 4]) -> Self {
        Self { points: *points }
    }
}

impl ParametricCurve2d for CubicBezier2d {
    fn sample(&self, t: f64) -> Point2d {
        let t1 = 1.0 - t;
        let [p0, p1, p2, p3] = self.points.map(|p| p.to_vec());
        Point2d::from_vec(
            t1 * t1 * t1 * p0 + 3.0 * t1 * t1 * t * p1 + 3.0 * t1 * t * t * p2 + t * t * t * p3,
        )
    }

    fn bounds(&self) -> Interval<f64> {
        Interval::new(0.0, 1.0)
    }

    fn sample_dt(&self, t: f64) -> Vector2d {
        let t1 = 1.0 - t;
        let [p0, p1, p2, p3] = self.points.map(|p| p.to_vec());
        3.0 * t1 * t1 * (p1 - p0) + 6.0 * t1 * t * (p2 - p1) + 3.0 * t * t * (p3 - p2)
    }
}

/// Projects a point onto a parametric curve, returning the curve parameter
/// of the closest point, or `None` if Newton's method fails to converge.
pub fn project_point_onto_curve(
    curve: &impl ParametricCurve2d,
    point: Point2d,
    max_error: f64,
    t0: Option<f64>,
) -> Option<f64> {
    let bounds = curve.bounds();

    // Get initial guess for `t`
    let mut t = t0.unwrap_or_else(|| {
        (0..=16)
            .map(|i| bounds.lerp(i as f64 / 16.0))
            .map(|t| (t, (point - curve.sample(t)).magnitude2()))
            .fold((bounds.min, f64::INFINITY), |best, cand| {
                if cand.1 < best.1 {
                    cand
                } else {
                    best
                }
            })
            .0
    });

    // Refine `t` with Newton's method
    for _ in 0..64 {
        let (p, p_dt) = (curve.sample(t), curve.sample_dt(t));
        let speed = p_dt.magnitude();
        if speed == 0.0 || !speed.is_finite() {
            return None;
        }
        let error = p_dt.dot(point - p) / (speed * speed);
        t += error;
        if !t.is_finite() {
            return None;
        }
        if (error * speed).abs() < max_error || !bounds.contains(t) {
            return Some(t.clamp(bounds.min, bounds.max));
        }
    }

    None
}

/// Finds a set of evenly spaced points along the given parametric curve,
/// as well as the total length of the curve.
pub fn equidistant_points_along_curve(
    curve: &impl ParametricCurve2d,
    dist: f64,
) -> (Vec<Point2d>, f64) {
    let end_ts = curve.bounds();
    let end_ps = [curve.sample(end_ts.min), curve.sample(end_ts.max)];

    let mut ts = end_ts;
    let mut ps = end_ps;
    let mut dists = Interval::new(0.0, (ps[1] - ps[0]).magnitude());

    let mut points = vec![end_ps[0]];
    let mut last_p = end_ps[0];

    'outer: while dists.max > dist {
        for _ in 0..100 {
            let new_t = ts.lerp(dists.inv_lerp(dist));
            let new_p = curve.sample(new_t);
            let new_dist = (new_p - last_p).magnitude();
            let f = new_dist / dist;

            if f < 0.99 {
                ts.min = new_t;
                ps[0] = new_p;
                dists.min = new_dist;
            } else if f > 1.01 {
                ts.max = new_t;
                ps[1] = new_p;
                dists.max = new_dist;
            } else {
                points.push(new_p);
                last_p = new_p;

                ts = Interval::new(new_t, end_ts.max);
                ps = [new_p, end_ps[1]];
                dists = Interval::new(0.0, (ps[1] - ps[0]).magnitude());
                continue 'outer;
            }
        }
        // Bisection did not converge; accept the remainder as one segment
        break;
    }

    let end_vec = end_ps[1] - last_p;
    let end_magnitude = end_vec.magnitude();
    let mut length = (points.len() - 1) as f64 * dist;
    if end_magnitude > 0.001 * dist {
        length += end_magnitude;
        points.push(end_ps[1]);
    }

    (points, length)
}
