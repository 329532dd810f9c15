//! Online score following by windowed dynamic time warping over chroma.

use std::collections::VecDeque;

use encore_audio::CHROMA_BINS;
use encore_domain::notes::pitch_class;
use encore_domain::{Measure, ParsedScore};
use ndarray::{Array2, ArrayView1};
use tracing::trace;

/// Cumulative costs for one live frame over the columns it searched.
#[derive(Debug, Clone)]
struct DtwRow {
    start: usize,
    costs: Vec<f32>,
}

impl DtwRow {
    fn cost(&self, column: usize) -> f32 {
        column
            .checked_sub(self.start)
            .and_then(|offset| self.costs.get(offset))
            .copied()
            .unwrap_or(f32::INFINITY)
    }
}

#[derive(Debug, Clone)]
pub struct ScoreFollower {
    reference: Array2<f32>,
    window: usize,
    max_rows: usize,
    rows: VecDeque<DtwRow>,
    position: usize,
    active: bool,
}

impl ScoreFollower {
    /// `reference` holds one chroma frame per row.
    pub fn new(reference: Array2<f32>, window: usize, max_rows: usize) -> Self {
        let max_rows = max_rows.max(1);
        Self {
            reference,
            window: window.max(1),
            max_rows,
            rows: VecDeque::with_capacity(max_rows),
            position: 0,
            active: false,
        }
    }

    pub fn start(&mut self) {
        self.active = true;
    }

    pub fn stop(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn reference_len(&self) -> usize {
        self.reference.nrows()
    }

    pub fn progress(&self) -> f32 {
        match self.reference.nrows() {
            0 => 0.0,
            1 => 1.0,
            n => self.position as f32 / (n - 1) as f32,
        }
    }

    pub fn reset(&mut self) {
        self.rows.clear();
        self.position = 0;
    }

    /// Extends the cost matrix by one live frame. Returns the new position
    /// when it moved forward.
    pub fn push_frame(&mut self, chroma: &[f32]) -> Option<usize> {
        let frames = self.reference.nrows();
        if !self.active || frames == 0 {
            return None;
        }
        let lo = self.position.saturating_sub(self.window);
        let hi = (self.position + self.window).min(frames - 1);
        let previous = self.rows.back();

        let mut costs: Vec<f32> = Vec::with_capacity(hi - lo + 1);
        for column in lo..=hi {
            let local = frame_distance(chroma, self.reference.row(column));
            let left = if column > lo {
                costs[column - lo - 1]
            } else {
                f32::INFINITY
            };
            let best = match previous {
                Some(row) => {
                    let diagonal = column
                        .checked_sub(1)
                        .map_or(f32::INFINITY, |c| row.cost(c));
                    row.cost(column).min(diagonal).min(left)
                }
                // The path starts at the top of the score.
                None if column == 0 => 0.0,
                None => left,
            };
            costs.push(local + best);
        }

        let Some((offset, floor)) = costs
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, cost)| cost.is_finite())
            .min_by(|a, b| a.1.total_cmp(&b.1))
        else {
            trace!(position = self.position, "no viable match in window, holding");
            return None;
        };

        // Rebase so cumulative costs stay bounded; argmin is unaffected.
        for cost in costs.iter_mut().filter(|c| c.is_finite()) {
            *cost -= floor;
        }
        if self.rows.len() == self.max_rows {
            self.rows.pop_front();
        }
        self.rows.push_back(DtwRow { start: lo, costs });

        let candidate = lo + offset;
        if candidate > self.position {
            self.position = candidate;
            Some(candidate)
        } else {
            None
        }
    }
}

fn frame_distance(live: &[f32], reference: ArrayView1<'_, f32>) -> f32 {
    reference
        .iter()
        .zip(live)
        .map(|(r, l)| (r - l) * (r - l))
        .sum::<f32>()
        .sqrt()
}

/// Renders the expected chroma of a timed score, one frame per hop. Each frame
/// marks the pitch classes of every note sounding at its start instant.
pub fn score_chroma(score: &ParsedScore, hop_seconds: f64) -> Array2<f32> {
    let duration = score.duration();
    if !(duration > 0.0 && hop_seconds > 0.0) {
        return Array2::zeros((0, CHROMA_BINS));
    }
    let frames = (duration / hop_seconds).ceil() as usize;
    let mut template = Array2::zeros((frames, CHROMA_BINS));
    for measure in score.parts.iter().flat_map(|part| &part.measures) {
        let quarter_beats = score.time_signature_at(measure.number).quarter_beats();
        if quarter_beats <= 0.0 {
            continue;
        }
        let seconds_per_beat = measure.duration() / quarter_beats;
        for note in &measure.notes {
            let start = measure.start_time + note.start_beat * seconds_per_beat;
            let end = start + note.duration_beats * seconds_per_beat;
            let first = (start / hop_seconds).floor() as usize;
            let last = ((end / hop_seconds).ceil() as usize).max(first + 1).min(frames);
            for frame in first..last {
                template[[frame, pitch_class(note.midi)]] = 1.0;
            }
        }
    }
    template
}

/// Measure whose time span contains `time`; the final measure also claims its
/// end instant.
pub fn measure_at_time(measures: &[Measure], time: f64) -> Option<u32> {
    let last = measures.len().checked_sub(1)?;
    measures.iter().enumerate().find_map(|(i, m)| {
        let inside = time >= m.start_time
            && (time < m.end_time || (i == last && time <= m.end_time));
        inside.then_some(m.number)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use encore_audio::chroma::chroma_for_notes;
    use encore_domain::{Part, ScoreNote};

    fn triad_reference() -> Array2<f32> {
        let mut reference = Array2::zeros((30, CHROMA_BINS));
        for (block, midi) in [60u8, 64, 67].iter().enumerate() {
            for frame in block * 10..(block + 1) * 10 {
                reference[[frame, pitch_class(*midi)]] = 1.0;
            }
        }
        reference
    }

    #[test]
    fn follows_c_e_g_sequence() {
        let mut follower = ScoreFollower::new(triad_reference(), 50, 150);
        follower.start();
        for _ in 0..10 {
            follower.push_frame(&chroma_for_notes([60]));
        }
        assert!(follower.position() < 10);
        for _ in 0..10 {
            follower.push_frame(&chroma_for_notes([64]));
        }
        assert!(follower.position() >= 10);
        for _ in 0..10 {
            follower.push_frame(&chroma_for_notes([67]));
        }
        assert!(follower.position() >= 20);
    }

    #[test]
    fn position_never_regresses() {
        let mut follower = ScoreFollower::new(triad_reference(), 50, 150);
        follower.start();
        let mut last = 0;
        for midi in [60, 64, 67, 60, 60, 64, 60] {
            for _ in 0..5 {
                follower.push_frame(&chroma_for_notes([midi]));
                assert!(follower.position() >= last);
                last = follower.position();
            }
        }
    }

    #[test]
    fn inactive_follower_ignores_frames() {
        let mut follower = ScoreFollower::new(triad_reference(), 50, 150);
        assert_eq!(follower.push_frame(&chroma_for_notes([67])), None);
        assert_eq!(follower.position(), 0);
        follower.start();
        follower.stop();
        assert_eq!(follower.push_frame(&chroma_for_notes([67])), None);
    }

    #[test]
    fn row_count_is_bounded() {
        let mut follower = ScoreFollower::new(triad_reference(), 4, 12);
        follower.start();
        for _ in 0..40 {
            follower.push_frame(&chroma_for_notes([60]));
        }
        assert_eq!(follower.rows.len(), 12);
    }

    #[test]
    fn empty_reference_holds() {
        let mut follower = ScoreFollower::new(Array2::zeros((0, CHROMA_BINS)), 50, 150);
        follower.start();
        assert_eq!(follower.push_frame(&chroma_for_notes([60])), None);
        assert_eq!(follower.progress(), 0.0);
    }

    #[test]
    fn template_marks_sounding_notes() {
        let score = ParsedScore {
            parts: vec![Part {
                id: "P1".into(),
                name: "Cello".into(),
                measures: vec![Measure::new(
                    1,
                    vec![ScoreNote::new(60, 0.0, 2.0), ScoreNote::new(67, 2.0, 2.0)],
                )],
            }],
            total_measures: 1,
            ..Default::default()
        }
        .timed(120.0)
        .unwrap();
        // 2 s measure at 0.5 s per frame.
        let template = score_chroma(&score, 0.5);
        assert_eq!(template.nrows(), 4);
        assert_eq!(template[[0, 0]], 1.0);
        assert_eq!(template[[1, 0]], 1.0);
        assert_eq!(template[[2, 7]], 1.0);
        assert_eq!(template[[2, 0]], 0.0);
    }

    #[test]
    fn measure_lookup_is_half_open() {
        let mut first = Measure::new(1, Vec::new());
        first.end_time = 2.0;
        let mut second = Measure::new(2, Vec::new());
        second.start_time = 2.0;
        second.end_time = 4.0;
        let measures = vec![first, second];
        assert_eq!(measure_at_time(&measures, 1.99), Some(1));
        assert_eq!(measure_at_time(&measures, 2.0), Some(2));
        assert_eq!(measure_at_time(&measures, 4.0), Some(2));
        assert_eq!(measure_at_time(&measures, 4.1), None);
    }
}
