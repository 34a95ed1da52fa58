use crate::math::{equidistant_points_along_curve, rot90, ParametricCurve2d, Point2d, Vector2d};
use crate::util::Interval;
use cgmath::prelude::*;

/// The spacing of the points that make up a lane's centre line, in m.
const LANE_SEGMENT_LEN: f64 = 0.5;

/// The centre line of a lane, parameterised by arc length.
#[derive(Clone, Debug)]
pub struct LaneCurve {
    step: f64,
    length: f64,
    points: Vec<Point2d>,
}

impl LaneCurve {
    /// Resamples the given parametric curve into evenly spaced points.
    pub fn new(curve: &impl ParametricCurve2d) -> Self {
        let (points, length) = equidistant_points_along_curve(curve, LANE_SEGMENT_LEN);
        Self {
            step: LANE_SEGMENT_LEN,
            length,
            points,
        }
    }

    /// The length of the lane in m.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// Samples the centre line at `pos`, returning the point and the unit tangent.
    /// Positions beyond either end are extrapolated along the end segments.
    pub fn sample_centre(&self, pos: f64) -> (Point2d, Vector2d) {
        if self.points.len() < 2 {
            return (self.points[0], Vector2d::unit_x());
        }
        let idx = ((pos / self.step).floor().max(0.0) as usize).min(self.points.len() - 2);
        let (p1, p2) = (self.points[idx], self.points[idx + 1]);
        let seg = p2 - p1;
        let seg_len = seg.magnitude();
        if seg_len == 0.0 {
            return (p1, Vector2d::unit_x());
        }
        let tan = seg / seg_len;
        (p1 + (pos - idx as f64 * self.step) * tan, tan)
    }

    /// Samples a point `offset` metres to the left of the centre line.
    pub fn sample_offset(&self, pos: f64, offset: f64) -> (Point2d, Vector2d) {
        let (centre, tan) = self.sample_centre(pos);
        (centre + offset * rot90(tan), tan)
    }
}

impl ParametricCurve2d for LaneCurve {
    fn sample(&self, t: f64) -> Point2d {
        self.sample_centre(t).0
    }

    fn bounds(&self) -> Interval<f64> {
        Interval::new(0.0, self.length)
    }

    fn sample_dt(&self, t: f64) -> Vector2d {
        self.sample_centre(t).1
    }
}
