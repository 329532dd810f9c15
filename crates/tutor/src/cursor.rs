use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CursorState {
    Idle,
    Following,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorEvent {
    Start,
    /// The follower moved to template `frame`, which lies in `measure`.
    Position { frame: usize, measure: u32 },
    Stop,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CursorUpdate {
    pub frame: usize,
    pub measure: u32,
    pub previous_measure: Option<u32>,
}

/// Tracks which measure should be highlighted, independent of any renderer.
#[derive(Debug, Clone)]
pub struct ScoreCursor {
    state: CursorState,
    measure: Option<u32>,
    frame: usize,
}

impl Default for ScoreCursor {
    fn default() -> Self {
        Self::new()
    }
}

impl ScoreCursor {
    pub fn new() -> Self {
        Self {
            state: CursorState::Idle,
            measure: None,
            frame: 0,
        }
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    pub fn measure(&self) -> Option<u32> {
        self.measure
    }

    pub fn frame(&self) -> usize {
        self.frame
    }

    /// Applies an event. Only a measure change while following yields an update.
    pub fn handle(&mut self, event: CursorEvent) -> Option<CursorUpdate> {
        match (self.state, event) {
            (CursorState::Idle, CursorEvent::Start) => {
                self.state = CursorState::Following;
                None
            }
            (CursorState::Stopped, CursorEvent::Start) => {
                debug!("ignoring start on a stopped cursor");
                None
            }
            (CursorState::Following, CursorEvent::Position { frame, measure }) => {
                self.frame = frame;
                if self.measure == Some(measure) {
                    return None;
                }
                let previous_measure = self.measure.replace(measure);
                Some(CursorUpdate {
                    frame,
                    measure,
                    previous_measure,
                })
            }
            (_, CursorEvent::Stop) => {
                self.state = CursorState::Stopped;
                None
            }
            _ => None,
        }
    }
}
