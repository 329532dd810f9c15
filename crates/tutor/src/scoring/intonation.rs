use encore_domain::{AlignStatus, AlignedNote, DimensionScore, ScoringDimension, ToleranceConfig};

/// Keyboards are scored on the share of correct notes. Continuous-pitch
/// instruments get an in-tune share (12 pts) plus average precision (8 pts).
pub fn score_intonation(
    played: &[&AlignedNote],
    polyphonic: bool,
    tolerance: &ToleranceConfig,
) -> DimensionScore {
    if played.is_empty() {
        return DimensionScore::new(ScoringDimension::Intonation, 0.0, "No pitch data");
    }
    let n = played.len();
    if polyphonic {
        let correct = played
            .iter()
            .filter(|a| a.status == AlignStatus::Correct)
            .count();
        let accuracy = correct as f64 / n as f64;
        return DimensionScore::new(
            ScoringDimension::Intonation,
            accuracy * 20.0,
            format!("{correct}/{n} correct notes ({:.0}%)", accuracy * 100.0),
        );
    }

    let limit = f64::from(tolerance.pitch_cents);
    let deviations: Vec<f64> = played
        .iter()
        .map(|a| f64::from(a.pitch_deviation).abs())
        .collect();
    let in_tune = deviations.iter().filter(|d| **d <= limit).count();
    let average = deviations.iter().sum::<f64>() / n as f64;
    let accuracy = in_tune as f64 / n as f64;
    let precision = (8.0 * (1.0 - average / (3.0 * limit))).max(0.0);
    DimensionScore::new(
        ScoringDimension::Intonation,
        accuracy * 12.0 + precision,
        format!("{in_tune}/{n} in tune, avg deviation: {average:.1} cents"),
    )
}
