use serde::{Deserialize, Serialize};

use crate::DomainError;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SkillLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl std::str::FromStr for SkillLevel {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "beginner" => Ok(SkillLevel::Beginner),
            "intermediate" => Ok(SkillLevel::Intermediate),
            "advanced" => Ok(SkillLevel::Advanced),
            other => Err(DomainError::validation(format!(
                "unknown skill level {other:?}"
            ))),
        }
    }
}

/// How far a performance may stray before it counts against the player.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToleranceConfig {
    pub pitch_cents: f32,
    /// Percent of a beat.
    pub rhythm_percent: f32,
    /// Percent of the target BPM.
    pub speed_percent: f32,
}

impl ToleranceConfig {
    pub fn for_level(level: SkillLevel) -> Self {
        match level {
            SkillLevel::Beginner => Self {
                pitch_cents: 50.0,
                rhythm_percent: 30.0,
                speed_percent: 40.0,
            },
            SkillLevel::Intermediate => Self {
                pitch_cents: 25.0,
                rhythm_percent: 15.0,
                speed_percent: 20.0,
            },
            SkillLevel::Advanced => Self {
                pitch_cents: 10.0,
                rhythm_percent: 8.0,
                speed_percent: 10.0,
            },
        }
    }

    /// Rhythm tolerance as a fraction of a beat.
    pub fn rhythm_beats(&self) -> f64 {
        f64::from(self.rhythm_percent) / 100.0
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        let all_positive = [self.pitch_cents, self.rhythm_percent, self.speed_percent]
            .iter()
            .all(|v| v.is_finite() && *v > 0.0);
        if !all_positive {
            return Err(DomainError::validation(
                "tolerances must be positive and finite",
            ));
        }
        Ok(())
    }
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self::for_level(SkillLevel::Beginner)
    }
}
