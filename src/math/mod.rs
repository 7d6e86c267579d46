mod point;

pub use point::Point2;

/// Wraps an angle in degrees into (-180, 180].
pub fn normalize_degrees(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(360.);
    if wrapped > 180. {
        wrapped - 360.
    } else {
        wrapped
    }
}
