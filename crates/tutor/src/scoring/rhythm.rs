use encore_domain::{DimensionScore, ScoringDimension, ToleranceConfig};

/// Share of notes on time (10 pts) plus average timing precision (10 pts).
/// `deviations` are in beats, one per note that was played.
pub fn score_rhythm(deviations: &[f64], tolerance: &ToleranceConfig) -> DimensionScore {
    if deviations.is_empty() {
        return DimensionScore::new(ScoringDimension::Rhythm, 0.0, "No rhythm data");
    }
    let limit = tolerance.rhythm_beats();
    let n = deviations.len();
    let on_time = deviations.iter().filter(|d| d.abs() <= limit).count();
    let average = deviations.iter().map(|d| d.abs()).sum::<f64>() / n as f64;
    let accuracy = on_time as f64 / n as f64;
    let precision = (10.0 * (1.0 - average / (3.0 * limit))).max(0.0);
    DimensionScore::new(
        ScoringDimension::Rhythm,
        accuracy * 10.0 + precision,
        format!(
            "{on_time}/{n} notes on time ({:.0}%), avg deviation: {average:.3} beats",
            accuracy * 100.0
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_timing() {
        assert_eq!(score_rhythm(&[0.0, 0.0], &ToleranceConfig::default()).score, 20);
    }

    #[test]
    fn sloppy_timing() {
        // 0.3 beat tolerance: one note on time, average 0.45 beats.
        let score = score_rhythm(&[0.0, -0.9], &ToleranceConfig::default());
        assert_eq!(score.score, 10);
    }

    #[test]
    fn nothing_played() {
        assert_eq!(score_rhythm(&[], &ToleranceConfig::default()).score, 0);
    }
}
