use std::collections::VecDeque;

pub const MIN_BPM: f32 = 30.0;
pub const MAX_BPM: f32 = 300.0;

const MIN_INTERVAL: f64 = 0.1;
const MAX_INTERVAL: f64 = 3.0;

/// Estimates the player's tempo from recent onset times.
#[derive(Debug, Clone)]
pub struct BpmTracker {
    onsets: VecDeque<f64>,
    capacity: usize,
    smoothing: f32,
    bpm: f32,
}

impl Default for BpmTracker {
    fn default() -> Self {
        Self::new(50, 0.3)
    }
}

impl BpmTracker {
    pub fn new(capacity: usize, smoothing: f32) -> Self {
        Self {
            onsets: VecDeque::with_capacity(capacity.max(2)),
            capacity: capacity.max(2),
            smoothing: smoothing.clamp(0.0, 1.0),
            bpm: 0.0,
        }
    }

    pub fn add_onset(&mut self, timestamp: f64) {
        if self.onsets.len() == self.capacity {
            self.onsets.pop_front();
        }
        self.onsets.push_back(timestamp);
        self.update();
    }

    /// Smoothed tempo rounded to a tenth, or `None` before enough onsets.
    pub fn bpm(&self) -> Option<f32> {
        (self.bpm > 0.0).then_some(self.bpm)
    }

    /// 1 for perfectly even playing, dropping toward 0 as intervals vary.
    pub fn stability(&self) -> f32 {
        if self.onsets.len() < 4 {
            return 0.0;
        }
        let intervals = self.intervals();
        if intervals.len() < 3 {
            return 0.0;
        }
        let n = intervals.len() as f64;
        let mean = intervals.iter().sum::<f64>() / n;
        if mean <= 0.0 {
            return 0.0;
        }
        let variance = intervals.iter().map(|i| (i - mean).powi(2)).sum::<f64>() / n;
        let cv = variance.sqrt() / mean;
        (1.0 - 2.0 * cv).max(0.0) as f32
    }

    pub fn onset_count(&self) -> usize {
        self.onsets.len()
    }

    pub fn reset(&mut self) {
        self.onsets.clear();
        self.bpm = 0.0;
    }

    fn intervals(&self) -> Vec<f64> {
        self.onsets
            .iter()
            .zip(self.onsets.iter().skip(1))
            .map(|(a, b)| b - a)
            .filter(|gap| *gap > MIN_INTERVAL && *gap < MAX_INTERVAL)
            .collect()
    }

    fn update(&mut self) {
        if self.onsets.len() < 3 {
            return;
        }
        let mut intervals = self.intervals();
        if intervals.is_empty() {
            return;
        }
        intervals.sort_by(f64::total_cmp);
        let median = intervals[intervals.len() / 2];
        let raw = (60.0 / median as f32).clamp(MIN_BPM, MAX_BPM);
        let smoothed = if self.bpm > 0.0 {
            self.bpm + self.smoothing * (raw - self.bpm)
        } else {
            raw
        };
        self.bpm = (smoothed * 10.0).round() / 10.0;
    }
}
