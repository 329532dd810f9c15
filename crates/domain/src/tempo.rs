use serde::{Deserialize, Serialize};

use crate::score::ParsedScore;
use crate::DomainError;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct TempoEvent {
    /// Seconds from the start of the piece.
    pub time: f64,
    /// Quarter-note beats per minute.
    pub bpm: f32,
}

impl TempoEvent {
    pub fn new(time: f64, bpm: f32) -> Result<Self, DomainError> {
        if time < 0.0 {
            return Err(DomainError::validation(
                "tempo events cannot have negative time",
            ));
        }
        if !(10.0..=400.0).contains(&bpm) {
            return Err(DomainError::validation(
                "tempo bpm must be between 10 and 400",
            ));
        }
        Ok(Self { time, bpm })
    }

    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / self.bpm as f64
    }
}

/// Piecewise-constant tempo over the piece. Always holds at least one event,
/// starting at time zero.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TempoMap {
    events: Vec<TempoEvent>,
}

impl TempoMap {
    pub fn new(events: Vec<TempoEvent>) -> Result<Self, DomainError> {
        let mut sorted = events;
        sorted.sort_by(|a, b| a.time.total_cmp(&b.time));
        match sorted.first() {
            Some(first) if first.time != 0.0 => {
                Err(DomainError::validation("tempo map must start at time 0"))
            }
            Some(_) => Ok(Self { events: sorted }),
            None => Err(DomainError::validation(
                "tempo map requires at least one event",
            )),
        }
    }

    pub fn constant(bpm: f32) -> Result<Self, DomainError> {
        Ok(Self {
            events: vec![TempoEvent::new(0.0, bpm)?],
        })
    }

    pub fn events(&self) -> &[TempoEvent] {
        &self.events
    }

    pub fn bpm_at(&self, time: f64) -> f32 {
        self.events
            .iter()
            .take_while(|event| event.time <= time)
            .last()
            .unwrap_or(&self.events[0])
            .bpm
    }

    pub fn beat_at_time(&self, time: f64) -> f64 {
        let mut prev_time = 0.0;
        let mut beat_accum = 0.0;
        let mut current = self.events[0];
        for event in &self.events[1..] {
            if event.time > time {
                break;
            }
            let segment_duration = event.time - prev_time;
            beat_accum += segment_duration / current.seconds_per_beat();
            prev_time = event.time;
            current = *event;
        }
        beat_accum + (time - prev_time) / current.seconds_per_beat()
    }

    pub fn time_at_beat(&self, beat: f64) -> f64 {
        let mut beat_cursor = 0.0;
        let mut current = self.events[0];
        for event in &self.events[1..] {
            let segment_beats = (event.time - current.time) / current.seconds_per_beat();
            if beat_cursor + segment_beats > beat {
                break;
            }
            beat_cursor += segment_beats;
            current = *event;
        }
        current.time + (beat - beat_cursor) * current.seconds_per_beat()
    }
}

impl ParsedScore {
    /// Copy of the score with every measure's start and end time assigned for
    /// a performance at `bpm`, honouring time-signature changes.
    pub fn timed(&self, bpm: f32) -> Result<ParsedScore, DomainError> {
        let map = TempoMap::constant(bpm)?;
        Ok(self.timed_with(&map))
    }

    pub fn timed_with(&self, map: &TempoMap) -> ParsedScore {
        let mut timed = self.clone();
        for part in &mut timed.parts {
            let mut beat = 0.0;
            for measure in &mut part.measures {
                let length = self.time_signature_at(measure.number).quarter_beats();
                measure.start_time = map.time_at_beat(beat);
                beat += length;
                measure.end_time = map.time_at_beat(beat);
            }
        }
        timed
    }
}
