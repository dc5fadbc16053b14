//! Summary statistics for amount baselines

/// Arithmetic mean, `None` for an empty sample
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Population standard deviation
pub fn population_std_dev(values: &[f64]) -> Option<f64> {
    let mean = mean(values)?;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

/// Standard score of `value` against `sample`.
///
/// `None` when the sample is empty or has no spread: a flat history
/// cannot say how unusual a value is.
pub fn z_score(value: f64, sample: &[f64]) -> Option<f64> {
    let mean = mean(sample)?;
    let std_dev = population_std_dev(sample)?;
    if std_dev < f64::EPSILON {
        return None;
    }
    Some((value - mean) / std_dev)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HISTORY: [f64; 5] = [10.0, 12.0, 11.0, 9.0, 13.0];

    #[test]
    fn test_mean_and_std_dev() {
        assert_eq!(mean(&HISTORY), Some(11.0));
        let sd = population_std_dev(&HISTORY).unwrap();
        assert!((sd - 2f64.sqrt()).abs() < 1e-9);
        assert_eq!(mean(&[]), None);
    }

    #[test]
    fn test_z_score() {
        assert!(z_score(1000.0, &HISTORY).unwrap() > 3.0);
        assert!(z_score(12.0, &HISTORY).unwrap() < 1.0);
        assert_eq!(z_score(50.0, &[20.0, 20.0, 20.0]), None);
    }
}
