//! Small statistics helpers.

/// Two-sided z for a 95% interval.
pub const Z_95: f64 = 1.959963984540054;

/// Wilson score interval for `successes` out of `total` Bernoulli trials.
/// Returns `(0.0, 0.0)` when there are no trials.
pub fn wilson_interval(successes: usize, total: usize, z: f64) -> (f64, f64) {
    if total == 0 {
        return (0.0, 0.0);
    }

    let n = total as f64;
    let p = successes as f64 / n;
    let z2 = z * z;

    let denom = 1.0 + z2 / n;
    let center = p + z2 / (2.0 * n);
    let margin = z * (p * (1.0 - p) / n + z2 / (4.0 * n * n)).sqrt();

    ((center - margin) / denom, (center + margin) / denom)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-4,
            "{} != {}",
            actual,
            expected
        );
    }

    #[test]
    fn wilson_four_of_five() {
        let (low, high) = wilson_interval(4, 5, Z_95);
        assert_close(low, 0.3755);
        assert_close(high, 0.9638);
    }

    #[test]
    fn wilson_extremes() {
        let (low, high) = wilson_interval(0, 10, Z_95);
        assert!(low.abs() < 1e-12);
        assert!(high > 0.0 && high < 0.35);

        let (low, high) = wilson_interval(10, 10, Z_95);
        assert!(low > 0.65 && low < 1.0);
        assert_close(high, 1.0);
    }

    #[test]
    fn wilson_no_trials() {
        assert_eq!(wilson_interval(0, 0, Z_95), (0.0, 0.0));
    }
}
