use encore_domain::notes::midi_to_name;
use encore_domain::{AlignStatus, AlignedNote, DetectedNote, Measure, ToleranceConfig};
use tracing::trace;

/// Weight of one second of timing error against one semitone of pitch error.
const TIME_WEIGHT: f64 = 10.0;

/// Alignment of a single measure.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasureAlignment {
    pub number: u32,
    pub start_time: f64,
    pub aligned: Vec<AlignedNote>,
    /// Detections in the measure that no score note claimed.
    pub extra: Vec<DetectedNote>,
    /// Whether anything was detected inside the measure's time span.
    pub played: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct NoteAligner {
    tolerance_cents: f32,
    tolerance_beats: f64,
}

impl NoteAligner {
    pub fn new(tolerance: &ToleranceConfig) -> Self {
        Self {
            tolerance_cents: tolerance.pitch_cents,
            tolerance_beats: tolerance.rhythm_beats(),
        }
    }

    /// Aligns every measure against the detections that fall in its time
    /// span. Spans are half-open except for the last measure.
    pub fn align(
        &self,
        measures: &[Measure],
        detected: &[DetectedNote],
        bpm: f32,
    ) -> Vec<MeasureAlignment> {
        let last = measures.len().saturating_sub(1);
        measures
            .iter()
            .enumerate()
            .map(|(i, measure)| {
                let inside: Vec<DetectedNote> = detected
                    .iter()
                    .filter(|n| {
                        n.timestamp >= measure.start_time
                            && (n.timestamp < measure.end_time
                                || (i == last && n.timestamp <= measure.end_time))
                    })
                    .copied()
                    .collect();
                self.align_measure(measure, &inside, bpm)
            })
            .collect()
    }

    /// Greedy matching in score order: each score note claims the unused
    /// detection with the lowest combined time and pitch cost.
    pub fn align_measure(
        &self,
        measure: &Measure,
        detected: &[DetectedNote],
        bpm: f32,
    ) -> MeasureAlignment {
        let seconds_per_beat = 60.0 / f64::from(bpm);
        let mut used = vec![false; detected.len()];
        let mut aligned = Vec::with_capacity(measure.notes.len());

        for note in &measure.notes {
            let expected_time = measure.start_time + note.start_beat * seconds_per_beat;
            let best = detected
                .iter()
                .enumerate()
                .filter(|(i, _)| !used[*i])
                .map(|(i, d)| {
                    let cost = (d.timestamp - expected_time).abs() * TIME_WEIGHT
                        + f64::from((i16::from(d.midi) - i16::from(note.midi)).abs());
                    (i, cost)
                })
                .min_by(|a, b| a.1.total_cmp(&b.1));

            let Some((index, _)) = best else {
                aligned.push(AlignedNote {
                    measure: measure.number,
                    score_note: *note,
                    detected: None,
                    status: AlignStatus::Missed,
                    pitch_deviation: 0.0,
                    time_deviation: 0.0,
                });
                continue;
            };
            used[index] = true;
            let hit = detected[index];
            let semitones = i16::from(hit.midi) - i16::from(note.midi);
            let pitch_deviation = f32::from(semitones) * 100.0 + hit.cents;
            let time_deviation = (hit.timestamp - expected_time) / seconds_per_beat;
            let pitch_ok = semitones == 0 && hit.cents.abs() <= self.tolerance_cents;
            let time_ok = time_deviation.abs() <= self.tolerance_beats;
            trace!(
                measure = measure.number,
                expected = %midi_to_name(note.midi),
                played = %hit.name(),
                pitch_deviation,
                time_deviation,
                "aligned note"
            );
            aligned.push(AlignedNote {
                measure: measure.number,
                score_note: *note,
                detected: Some(hit),
                status: if pitch_ok && time_ok {
                    AlignStatus::Correct
                } else {
                    AlignStatus::WrongPitch
                },
                pitch_deviation,
                time_deviation,
            });
        }

        let extra = detected
            .iter()
            .zip(&used)
            .filter(|(_, used)| !**used)
            .map(|(d, _)| *d)
            .collect();
        MeasureAlignment {
            number: measure.number,
            start_time: measure.start_time,
            aligned,
            extra,
            played: !detected.is_empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use encore_domain::ScoreNote;

    fn two_note_measure() -> Measure {
        let mut measure = Measure::new(
            1,
            vec![ScoreNote::new(60, 0.0, 1.0), ScoreNote::new(62, 1.0, 1.0)],
        );
        measure.end_time = 2.0;
        measure
    }

    fn hit(midi: u8, timestamp: f64) -> DetectedNote {
        DetectedNote {
            midi,
            frequency: 0.0,
            cents: 0.0,
            confidence: 1.0,
            timestamp,
        }
    }

    fn aligner() -> NoteAligner {
        NoteAligner::new(&ToleranceConfig::default())
    }

    #[test]
    fn exact_performance_is_correct() {
        let result =
            aligner().align_measure(&two_note_measure(), &[hit(60, 0.0), hit(62, 0.5)], 120.0);
        assert_eq!(result.aligned.len(), 2);
        assert!(result
            .aligned
            .iter()
            .all(|a| a.status == AlignStatus::Correct));
        assert!(result.extra.is_empty());
        assert!(result.played);
    }

    #[test]
    fn silence_is_missed() {
        let result = aligner().align_measure(&two_note_measure(), &[], 120.0);
        assert_eq!(result.aligned.len(), 2);
        assert!(result
            .aligned
            .iter()
            .all(|a| a.status == AlignStatus::Missed));
        assert!(!result.played);
    }

    #[test]
    fn three_semitones_off_is_wrong_pitch() {
        let result =
            aligner().align_measure(&two_note_measure(), &[hit(63, 0.0), hit(62, 0.5)], 120.0);
        assert_eq!(result.aligned[0].status, AlignStatus::WrongPitch);
        assert_abs_diff_eq!(result.aligned[0].pitch_deviation, 300.0);
        assert_eq!(result.aligned[1].status, AlignStatus::Correct);
    }

    #[test]
    fn late_note_reports_beat_deviation() {
        let result =
            aligner().align_measure(&two_note_measure(), &[hit(60, 0.25), hit(62, 0.5)], 120.0);
        assert_abs_diff_eq!(result.aligned[0].time_deviation, 0.5);
        assert_eq!(result.aligned[0].status, AlignStatus::WrongPitch);
    }

    #[test]
    fn detections_are_consumed_once() {
        let result = aligner().align_measure(
            &two_note_measure(),
            &[hit(60, 0.0), hit(60, 0.01), hit(72, 1.9)],
            120.0,
        );
        let claimed: Vec<f64> = result
            .aligned
            .iter()
            .filter_map(|a| a.detected.map(|d| d.timestamp))
            .collect();
        assert_eq!(claimed.len(), 2);
        assert_ne!(claimed[0], claimed[1]);
        assert_eq!(result.extra.len(), 1);
    }

    #[test]
    fn detections_are_split_by_measure() {
        let first = two_note_measure();
        let mut second = Measure::new(2, vec![ScoreNote::new(64, 0.0, 4.0)]);
        second.start_time = 2.0;
        second.end_time = 4.0;
        let alignments = aligner().align(
            &[first, second],
            &[hit(60, 0.0), hit(62, 0.5), hit(64, 2.0)],
            120.0,
        );
        assert_eq!(alignments.len(), 2);
        assert_eq!(alignments[0].aligned.len(), 2);
        assert_eq!(alignments[1].aligned.len(), 1);
        assert_eq!(alignments[1].aligned[0].status, AlignStatus::Correct);
    }
}
