/// Finite and non-decreasing.
pub fn is_valid_knots(times: &[f64]) -> bool {
    times.iter().all(|t| t.is_finite()) && times.windows(2).all(|w| w[0] <= w[1])
}

/// Linear interpolation of `values` over the knots `times`, which must satisfy
/// [`is_valid_knots`]. Values outside the knot range are held at the nearest
/// end. `None` for empty or mismatched inputs and for a NaN `t`.
pub fn interpolate(times: &[f64], values: &[na::DVector<f64>], t: f64) -> Option<na::DVector<f64>> {
    let (first, last) = (times.first()?, times.last()?);
    if times.len() != values.len() || t.is_nan() {
        return None;
    }
    if t <= *first {
        return Some(values[0].clone());
    }
    if t >= *last {
        return Some(values[values.len() - 1].clone());
    }

    // t_i <= t < t_{i+1} となる i を探す
    // ここでは len >= 2
    let i = times.partition_point(|&ti| ti <= t).saturating_sub(1).min(times.len() - 2);
    let (t0, t1) = (times[i], times[i + 1]);
    let span = t1 - t0;
    if span <= 0.0 {
        return Some(values[i + 1].clone());
    }
    let alpha = (t - t0) / span;
    Some(&values[i] * (1.0 - alpha) + &values[i + 1] * alpha)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn interpolates_between_knots() {
        let times = [0.0, 1.0, 2.0];
        let values = [na::dvector![0.0], na::dvector![2.0], na::dvector![-2.0]];
        assert_relative_eq!(interpolate(&times, &values, 0.25).unwrap()[0], 0.5);
        assert_relative_eq!(interpolate(&times, &values, 1.0).unwrap()[0], 2.0);
        assert_relative_eq!(interpolate(&times, &values, 1.5).unwrap()[0], 0.0);
    }

    #[test]
    fn holds_outside_range() {
        let times = [0.0, 1.0];
        let values = [na::dvector![1.0], na::dvector![3.0]];
        assert_relative_eq!(interpolate(&times, &values, -5.0).unwrap()[0], 1.0);
        assert_relative_eq!(interpolate(&times, &values, 7.0).unwrap()[0], 3.0);
    }

    #[test]
    fn empty_or_mismatched_is_none() {
        assert!(interpolate(&[], &[], 0.0).is_none());
        assert!(interpolate(&[0.0, 1.0], &[na::dvector![1.0]], 0.5).is_none());
    }

    #[test]
    fn nan_time_is_none() {
        let times = [0.0, 1.0, 2.0];
        let values = [na::dvector![0.0], na::dvector![2.0], na::dvector![-2.0]];
        assert!(interpolate(&times, &values, f64::NAN).is_none());
    }

    #[test]
    fn knot_validation() {
        assert!(is_valid_knots(&[]));
        assert!(is_valid_knots(&[0.0, 0.5, 0.5, 1.0]));
        assert!(!is_valid_knots(&[0.0, 1.0, 0.5]));
        assert!(!is_valid_knots(&[0.0, f64::NAN]));
        assert!(!is_valid_knots(&[f64::NEG_INFINITY, 0.0]));
    }
}
