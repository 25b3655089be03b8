//! Small numeric helpers for the election algorithms.

/// Sample standard deviation (n - 1 denominator).
///
/// Fewer than two values have no spread and yield 0.
pub(crate) fn sample_std(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    var.sqrt()
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Standard normal cumulative distribution Φ(z).
///
/// NaN in, NaN out; callers decide the fallback.
pub(crate) fn normal_cdf(z: f64) -> f64 {
    if z.is_nan() {
        return f64::NAN;
    }
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}

/// Abramowitz & Stegun 7.1.26, absolute error below 1.5e-7.
fn erf(x: f64) -> f64 {
    const A1: f64 = 0.254_829_592;
    const A2: f64 = -0.284_496_736;
    const A3: f64 = 1.421_413_741;
    const A4: f64 = -1.453_152_027;
    const A5: f64 = 1.061_405_429;
    const P: f64 = 0.327_591_1;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + P * x);
    let poly = ((((A5 * t + A4) * t + A3) * t + A2) * t + A1) * t;
    sign * (1.0 - poly * (-x * x).exp())
}

/// Sort descending by score; ties keep their input order.
pub(crate) fn sort_desc_by<T>(items: &mut [T], score: impl Fn(&T) -> f64) {
    items.sort_by(|a, b| score(b).total_cmp(&score(a)));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn sample_std_matches_known_values() {
        assert!(close(sample_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]), 2.1381));
        assert_eq!(sample_std(&[0.5]), 0.0);
        assert_eq!(sample_std(&[]), 0.0);
    }

    #[test]
    fn normal_cdf_reference_points() {
        assert!(close(normal_cdf(0.0), 0.5));
        assert!(close(normal_cdf(1.0), 0.8413));
        assert!(close(normal_cdf(-1.96), 0.0250));
        assert_eq!(normal_cdf(f64::INFINITY), 1.0);
        assert!(normal_cdf(f64::NAN).is_nan());
    }

    #[test]
    fn rounding() {
        assert_eq!(round_to(0.456, 2), 0.46);
        assert_eq!(round_to(0.4604, 3), 0.46);
    }

    #[test]
    fn sort_is_stable_on_ties() {
        let mut items = vec![("a", 0.2), ("b", 0.5), ("c", 0.2)];
        sort_desc_by(&mut items, |i| i.1);
        assert_eq!(items, vec![("b", 0.5), ("a", 0.2), ("c", 0.2)]);
    }
}
