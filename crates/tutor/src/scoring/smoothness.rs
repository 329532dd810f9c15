use encore_domain::{DimensionScore, ScoringDimension};

/// Onsets closer than this are one attack (a chord).
const SAME_ONSET: f64 = 0.001;

/// Penalizes unexpected pauses: gaps longer than three times the median gap.
/// Continuity (12 pts) counts pauses, flow (8 pts) weighs their length
/// against the piece.
pub fn score_smoothness(onsets: &[f64], piece_length: f64) -> DimensionScore {
    let mut times: Vec<f64> = onsets.to_vec();
    times.sort_by(f64::total_cmp);
    times.dedup_by(|b, a| (*b - *a).abs() < SAME_ONSET);
    if times.len() < 2 {
        return DimensionScore::new(
            ScoringDimension::Smoothness,
            20.0,
            "Too few notes to evaluate",
        );
    }

    let gaps: Vec<f64> = times.windows(2).map(|w| w[1] - w[0]).collect();
    let median = median(&gaps);
    let threshold = median * 3.0;
    let (pauses, pause_time) = gaps
        .iter()
        .filter(|gap| **gap > threshold)
        .fold((0usize, 0.0), |(count, time), gap| (count + 1, time + gap - median));

    let continuity = (12.0 * (1.0 - 5.0 * pauses as f64 / gaps.len() as f64)).max(0.0);
    let flow = if piece_length > 0.0 {
        (8.0 * (1.0 - 3.0 * pause_time / piece_length)).max(0.0)
    } else {
        8.0
    };
    DimensionScore::new(
        ScoringDimension::Smoothness,
        continuity + flow,
        format!(
            "{pauses} unexpected pauses, total pause: {pause_time:.1}s / {piece_length:.1}s"
        ),
    )
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
