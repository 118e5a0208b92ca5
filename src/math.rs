//! Mathematical structs and functions.

use cgmath::{InnerSpace, Point3, Vector3};

/// A 3D point
pub type Point3d = Point3<f64>;

/// A 3D vector
pub type Vector3d = Vector3<f64>;

/// Computes the dot product of two vectors restricted to the ground (XZ) plane.
pub fn flat_dot(a: Vector3d, b: Vector3d) -> f64 {
    a.x * b.x + a.z * b.z
}

/// Computes the ground-plane perpendicular pointing to the right of a heading.
pub fn right_of(v: Vector3d) -> Vector3d {
    Vector3d::new(-v.z, 0.0, v.x)
}

/// Normalises a vector in the ground plane.
/// Returns `None` for a degenerate or non-finite input.
pub fn flat_normalize(v: Vector3d) -> Option<Vector3d> {
    let flat = Vector3d::new(v.x, 0.0, v.z);
    let mag = flat.magnitude();
    if mag > f64::EPSILON {
        Some(flat / mag)
    } else {
        None
    }
}

/// Computes the unit direction from `from` to `to` in the ground plane,
/// or `None` when the points coincide.
pub fn flat_direction(from: Point3d, to: Point3d) -> Option<Vector3d> {
    flat_normalize(to - from)
}

/// Linearly interpolates from `start` to `end` by `amount`.
pub fn lerp(start: f64, end: f64, amount: f64) -> f64 {
    start + amount * (end - start)
}
