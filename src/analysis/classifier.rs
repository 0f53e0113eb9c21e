//! Maps (loudness, pitch) to an affective state.
//!
//! Rules are checked in order and the first match wins, so a high pitch is reported as
//! `Anxious` even when the speaker is quiet.

use crate::config::AnalysisConfig;
use serde::{Deserialize, Serialize};

/// Discrete affective state of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StressStatus {
    Relaxed,
    Loud,
    Anxious,
}

impl StressStatus {
    /// Score sent to the client alongside the label.
    pub fn intensity(&self) -> u8 {
        match self {
            StressStatus::Anxious => 85,
            StressStatus::Loud => 70,
            StressStatus::Relaxed => 10,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StressStatus::Relaxed => "Relaxed",
            StressStatus::Loud => "Loud",
            StressStatus::Anxious => "Anxious",
        }
    }

    /// Only non-relaxed states may trigger feedback.
    pub fn wants_feedback(&self) -> bool {
        !matches!(self, StressStatus::Relaxed)
    }
}

/// Classify a frame.
pub fn classify(loudness: f32, pitch_hz: f32, config: &AnalysisConfig) -> StressStatus {
    if pitch_hz > config.pitch_threshold {
        StressStatus::Anxious
    } else if loudness > config.loud_threshold {
        StressStatus::Loud
    } else {
        StressStatus::Relaxed
    }
}
