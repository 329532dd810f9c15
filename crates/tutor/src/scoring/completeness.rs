use encore_domain::{DimensionScore, ScoringDimension};

/// Coverage of score notes (14 pts) and of measures (6 pts).
pub fn score_completeness(
    matched_notes: usize,
    total_notes: usize,
    played_measures: usize,
    total_measures: usize,
) -> DimensionScore {
    if total_notes == 0 {
        return DimensionScore::new(ScoringDimension::Completeness, 20.0, "No notes in score");
    }
    let note_ratio = (matched_notes as f64 / total_notes as f64).min(1.0);
    let measure_ratio = if total_measures == 0 {
        1.0
    } else {
        (played_measures as f64 / total_measures as f64).min(1.0)
    };
    let skipped = total_measures.saturating_sub(played_measures);
    DimensionScore::new(
        ScoringDimension::Completeness,
        note_ratio * 14.0 + measure_ratio * 6.0,
        format!(
            "{matched_notes}/{total_notes} notes played ({:.0}%), {skipped} measures skipped",
            note_ratio * 100.0
        ),
    )
}
