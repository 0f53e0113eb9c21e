//! # Per-Frame Analysis Pipeline
//!
//! Turns one raw audio frame into a stress classification and, when allowed, a feedback
//! message.
//!
//! ## Stages:
//! ```text
//! bytes ─▶ decoder ─▶ loudness ─┬─▶ (silent) ─▶ nothing
//!                               └─▶ pitch ─▶ classifier ─▶ cooldown gate ─▶ responder ─▶ result
//! ```
//!
//! ## Audio Format Requirements:
//! - **Encoding**: 32-bit IEEE-754 float, little-endian
//! - **Channels**: Mono
//! - **Sample Rate**: `analysis.sample_rate` (44.1kHz by default), fixed per process
//!
//! ## Failure model:
//! Nothing in here returns an error to the caller. Malformed, empty and silent frames all
//! end in "no result for this frame". Every stage is synchronous and CPU-bound.

pub mod classifier;
pub mod decoder;
pub mod loudness;
pub mod pitch;

use crate::config::AnalysisConfig;
use crate::feedback::{CooldownGate, Responder};
use classifier::StressStatus;
use decoder::FrameError;
use pitch::PitchDetector;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Output of one analyzed frame. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    /// RMS amplitude, always above the noise floor
    pub loudness: f32,
    /// Dominant frequency in Hz
    pub pitch_hz: f32,
    pub status: StressStatus,
    pub intensity: u8,
    /// Empty when the frame was relaxed or the cooldown suppressed feedback
    pub feedback_message: String,
}

impl AnalysisResult {
    pub fn has_feedback(&self) -> bool {
        !self.feedback_message.is_empty()
    }
}

/// What happened to a frame. `FrameOutcome::into_result` collapses it to the
/// result-or-nothing view the transport needs; the other variants feed metrics.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    Malformed(FrameError),
    Silent { loudness: f32 },
    Analyzed(AnalysisResult),
}

impl FrameOutcome {
    pub fn into_result(self) -> Option<AnalysisResult> {
        match self {
            FrameOutcome::Analyzed(result) => Some(result),
            _ => None,
        }
    }
}

/// Sees every frame outcome produced by `AnalysisPipeline::analyze`, including the ones
/// that end without a result.
pub trait FrameObserver: Send + Sync {
    fn observe(&self, outcome: &FrameOutcome);
}

/// The analysis pipeline for one cooldown scope.
///
/// The gate is injected: pass the same `Arc<CooldownGate>` to every pipeline for a global
/// cooldown, or a fresh one per session for isolated cooldowns.
pub struct AnalysisPipeline {
    config: AnalysisConfig,
    detector: PitchDetector,
    gate: Arc<CooldownGate>,
    responder: Arc<dyn Responder>,
    observer: Option<Arc<dyn FrameObserver>>,
}

impl AnalysisPipeline {
    pub fn new(config: AnalysisConfig, gate: Arc<CooldownGate>, responder: Arc<dyn Responder>) -> Self {
        let detector = PitchDetector::new(config.sample_rate);
        Self {
            config,
            detector,
            gate,
            responder,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn FrameObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn gate(&self) -> &Arc<CooldownGate> {
        &self.gate
    }

    /// Analyze one frame, returning `None` for malformed, empty or silent frames.
    ///
    /// The observer, if any, is notified before the outcome is collapsed.
    pub fn analyze(&self, raw: &[u8], now: Instant) -> Option<AnalysisResult> {
        let outcome = self.process(raw, now);
        if let Some(observer) = &self.observer {
            observer.observe(&outcome);
        }
        outcome.into_result()
    }

    /// Analyze one frame and report why no result was produced, if none was.
    pub fn process(&self, raw: &[u8], now: Instant) -> FrameOutcome {
        let samples = match decoder::decode_frame(raw) {
            Ok(samples) => samples,
            Err(err) => {
                debug!("Skipping frame: {}", err);
                return FrameOutcome::Malformed(err);
            }
        };

        let loudness = loudness::rms(&samples);
        if loudness::is_silent(loudness, self.config.noise_floor) {
            return FrameOutcome::Silent { loudness };
        }

        let pitch_hz = self.detector.dominant_frequency(&samples);
        let status = classifier::classify(loudness, pitch_hz, &self.config);

        let feedback_message = if self.gate.try_emit(status, now) {
            let message = self.responder.respond(status);
            info!(status = status.as_str(), feedback = %message, "Feedback emitted");
            message
        } else {
            String::new()
        };

        debug!(
            samples = samples.len(),
            loudness = loudness,
            pitch_hz = pitch_hz,
            status = status.as_str(),
            "Frame analyzed"
        );

        FrameOutcome::Analyzed(AnalysisResult {
            loudness,
            pitch_hz,
            status,
            intensity: status.intensity(),
            feedback_message,
        })
    }
}
