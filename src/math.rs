//! Geometry used to place lanes and vehicles in world space.

use cgmath::{Point2, Vector2};
pub use cubic::CubicFn;
pub use curve::{
    equidistant_points_along_curve, project_point_onto_curve, CubicBezier2d, LineSegment2d,
    ParametricCurve2d, QuadraticBezier2d,
};
pub use lut::LookupTable;

mod cubic;
mod curve;
mod lut;

/// A 2D point
pub type Point2d = Point2<f64>;

/// A 2D vector
pub type Vector2d = Vector2<f64>;

/// Rotates a vector 90 degrees anti-clockwise, i.e. towards the left of a lane.
pub fn rot90(vec: Vector2d) -> Vector2d {
    Vector2d::new(-vec.y, vec.x)
}
