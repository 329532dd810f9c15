use encore_domain::{DimensionScore, ScoringDimension, ToleranceConfig};

/// Closeness of the mean tempo to the target (10 pts) plus tempo steadiness
/// (10 pts).
pub fn score_speed(
    target_bpm: f32,
    bpm_samples: &[f32],
    tolerance: &ToleranceConfig,
) -> DimensionScore {
    if bpm_samples.is_empty() || target_bpm <= 0.0 {
        return DimensionScore::new(ScoringDimension::Speed, 0.0, "No tempo data detected");
    }
    let n = bpm_samples.len() as f64;
    let mean = bpm_samples.iter().map(|b| f64::from(*b)).sum::<f64>() / n;
    let target = f64::from(target_bpm);
    let deviation = (mean - target).abs() / target * 100.0;
    let variance = bpm_samples
        .iter()
        .map(|b| (f64::from(*b) - mean).powi(2))
        .sum::<f64>()
        / n;
    let cv = if mean > 0.0 {
        variance.sqrt() / mean * 100.0
    } else {
        100.0
    };

    let deviation_points =
        (10.0 * (1.0 - deviation / f64::from(tolerance.speed_percent))).max(0.0);
    let stability_points = (10.0 * (1.0 - cv / 20.0)).max(0.0);
    DimensionScore::new(
        ScoringDimension::Speed,
        deviation_points + stability_points,
        format!(
            "Avg BPM: {mean:.1} (target: {target_bpm}), deviation: {deviation:.1}%, stability CV: {cv:.1}%"
        ),
    )
}
