/// Converts degrees to radians.
pub fn to_radians(degrees: f32) -> f32 {
    degrees.to_radians()
}

/// Converts radians to degrees.
pub fn to_degrees(radians: f32) -> f32 {
    radians.to_degrees()
}

/// Wraps an angle in degrees into `[0, 360)`.
///
/// Negative angles wrap from the top (`-10` becomes `350`). A tiny negative
/// input can round to exactly `360.0` in `f32`; that case is folded to `0.0`
/// so the upper bound is always exclusive.
pub fn wrap_degrees(degrees: f32) -> f32 {
    let wrapped = degrees.rem_euclid(360.0);
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_keeps_values_in_range() {
        assert_eq!(wrap_degrees(0.0), 0.0);
        assert_eq!(wrap_degrees(90.0), 90.0);
        assert_eq!(wrap_degrees(360.0), 0.0);
        assert_eq!(wrap_degrees(370.0), 10.0);
        assert_eq!(wrap_degrees(-10.0), 350.0);
        assert_eq!(wrap_degrees(-720.0), 0.0);
    }

    #[test]
    fn wrap_folds_rounding_to_zero() {
        let wrapped = wrap_degrees(-1e-7);
        assert!((0.0..360.0).contains(&wrapped));
    }

    #[test]
    fn radians_round_trip() {
        assert!((to_radians(180.0) - std::f32::consts::PI).abs() < 1e-6);
        assert!((to_degrees(std::f32::consts::FRAC_PI_2) - 90.0).abs() < 1e-4);
    }
}
