/// Small numeric helpers shared by the indicator engine, the synthesizer and
/// the scoring engine.

/// Compute the mean of a data slice. Returns `None` for an empty slice.
pub fn mean(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    Some(data.iter().sum::<f64>() / data.len() as f64)
}

/// Population standard deviation (divides by N, the Bollinger convention).
pub fn population_std_dev(data: &[f64]) -> Option<f64> {
    let m = mean(data)?;
    let variance = data.iter().map(|x| (x - m).powi(2)).sum::<f64>() / data.len() as f64;
    Some(variance.sqrt())
}

/// Linearly map `value` from `[low, high]` onto `[0, 100]`, clamping outside
/// the range. When `low > high` the mapping is inverted (lower is better).
pub fn scale_to_score(value: f64, low: f64, high: f64) -> f64 {
    if (high - low).abs() < f64::EPSILON {
        return 50.0;
    }
    (((value - low) / (high - low)) * 100.0).clamp(0.0, 100.0)
}

/// Round to a fixed number of decimals; keeps synthesized prices looking like
/// exchange prints.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean() {
        assert_eq!(mean(&[]), None);
        assert!((mean(&[1.0, 2.0, 3.0]).unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_population_std_dev() {
        let data = vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((population_std_dev(&data).unwrap() - 2.0).abs() < 1e-12);
        assert_eq!(population_std_dev(&[]), None);
    }

    #[test]
    fn test_scale_to_score() {
        assert!((scale_to_score(10.0, 0.0, 20.0) - 50.0).abs() < 1e-9);
        assert_eq!(scale_to_score(-5.0, 0.0, 20.0), 0.0);
        assert_eq!(scale_to_score(50.0, 0.0, 20.0), 100.0);
        // Inverted: lower leverage scores higher
        assert_eq!(scale_to_score(0.0, 3.0, 0.0), 100.0);
        assert_eq!(scale_to_score(3.0, 3.0, 0.0), 0.0);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(123.456, 2), 123.46);
        assert_eq!(round_to(0.004, 2), 0.0);
    }
}
