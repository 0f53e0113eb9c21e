//! # Application State Management
//!
//! State shared by every actix worker and every WebSocket actor.
//!
//! ## Key Rust Concepts:
//!
//! ### Arc (Atomically Reference Counted)
//! - **Purpose**: Lets many workers and connections share one value
//! - **Cloning**: Cloning an `Arc` copies a pointer, not the data
//!
//! ### RwLock (Reader-Writer Lock)
//! - **Purpose**: Many readers OR one writer at a time
//! - **Used for**: Frame counters, written by every connection and read by `/metrics`
//!
//! ### Trait objects (`Arc<dyn Responder>`)
//! - **Purpose**: The feedback text producer is chosen at startup; the rest of the code
//!   only sees the trait
//!
//! ## What is shared and what is not:
//! - The configuration is immutable and shared as `Arc<AppConfig>`
//! - The cooldown gate is shared only when `feedback.cooldown_scope = "global"`;
//!   otherwise each session builds its own (see `gate_for_session`)

use crate::analysis::classifier::StressStatus;
use crate::analysis::{AnalysisPipeline, FrameObserver, FrameOutcome};
use crate::config::{AppConfig, CooldownScope};
use crate::feedback::{CatalogResponder, CooldownGate, Responder};
use crate::session::SessionManager;
use anyhow::Result;
use std::sync::{Arc, RwLock};
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    /// Immutable after startup
    pub config: Arc<AppConfig>,

    /// Frame counters across all sessions
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// Open audio streams
    pub sessions: Arc<SessionManager>,

    /// The process-wide cooldown, used when the scope is global
    shared_gate: Arc<CooldownGate>,

    /// Feedback text producer, shared by every pipeline
    responder: Arc<dyn Responder>,

    /// When the server started
    pub start_time: Instant,
}

/// Frame counters collected across all sessions.
///
/// ## Accounting:
/// Every received frame lands in exactly one of `malformed_frames`, `silent_frames` or
/// `analyzed_frames`. Analyzed frames are further split by status, and non-relaxed ones
/// by whether the cooldown let feedback through.
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    pub frames_received: u64,
    pub malformed_frames: u64,
    pub silent_frames: u64,
    pub analyzed_frames: u64,
    pub relaxed_frames: u64,
    pub loud_frames: u64,
    pub anxious_frames: u64,
    pub feedback_emitted: u64,
    pub feedback_suppressed: u64,
}

impl AppMetrics {
    /// Count one processed frame.
    pub fn record(&mut self, outcome: &FrameOutcome) {
        self.frames_received += 1;

        match outcome {
            FrameOutcome::Malformed(_) => self.malformed_frames += 1,
            FrameOutcome::Silent { .. } => self.silent_frames += 1,
            FrameOutcome::Analyzed(result) => {
                self.analyzed_frames += 1;
                match result.status {
                    StressStatus::Relaxed => self.relaxed_frames += 1,
                    StressStatus::Loud => self.loud_frames += 1,
                    StressStatus::Anxious => self.anxious_frames += 1,
                }

                if result.has_feedback() {
                    self.feedback_emitted += 1;
                } else if result.status.wants_feedback() {
                    self.feedback_suppressed += 1;
                }
            }
        }
    }
}

/// Pipelines report straight into the shared counters.
impl FrameObserver for RwLock<AppMetrics> {
    fn observe(&self, outcome: &FrameOutcome) {
        self.write().unwrap_or_else(|e| e.into_inner()).record(outcome);
    }
}

impl AppState {
    /// Build the shared state from a validated configuration.
    ///
    /// Uses the catalog responder from `feedback.messages`.
    pub fn new(config: AppConfig) -> Result<Self> {
        let responder = CatalogResponder::new(config.feedback.messages.clone())
            .ok_or_else(|| anyhow::anyhow!("Feedback message catalog cannot be empty"))?;
        Ok(Self::with_responder(config, Arc::new(responder)))
    }

    /// Build the shared state with a custom responder.
    pub fn with_responder(config: AppConfig, responder: Arc<dyn Responder>) -> Self {
        let shared_gate = Arc::new(Self::build_gate(&config));
        let sessions = Arc::new(SessionManager::new(config.performance.max_concurrent_sessions));

        Self {
            config: Arc::new(config),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            sessions,
            shared_gate,
            responder,
            start_time: Instant::now(),
        }
    }

    fn build_gate(config: &AppConfig) -> CooldownGate {
        CooldownGate::from_seconds(config.feedback.cooldown_seconds, config.feedback.cooldown_scope)
    }

    pub fn get_config(&self) -> Arc<AppConfig> {
        self.config.clone()
    }

    /// The cooldown gate a new session should use, according to the configured scope.
    pub fn gate_for_session(&self) -> Arc<CooldownGate> {
        match self.config.feedback.cooldown_scope {
            CooldownScope::Global => self.shared_gate.clone(),
            CooldownScope::PerSession => Arc::new(Self::build_gate(&self.config)),
        }
    }

    /// The process-wide gate. Only consulted by sessions when the scope is global.
    pub fn shared_gate(&self) -> &Arc<CooldownGate> {
        &self.shared_gate
    }

    /// A pipeline for a new session, counting its frames into `metrics`.
    pub fn pipeline_for_session(&self) -> AnalysisPipeline {
        let observer: Arc<dyn FrameObserver> = self.metrics.clone();
        AnalysisPipeline::new(
            self.config.analysis.clone(),
            self.gate_for_session(),
            self.responder.clone(),
        )
        .with_observer(observer)
    }

    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.metrics.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::decoder::FrameError;
    use crate::analysis::AnalysisResult;

    fn analyzed(status: StressStatus, message: &str) -> FrameOutcome {
        FrameOutcome::Analyzed(AnalysisResult {
            loudness: 0.2,
            pitch_hz: 120.0,
            status,
            intensity: status.intensity(),
            feedback_message: message.to_string(),
        })
    }

    #[test]
    fn test_metrics_accounting() {
        let mut metrics = AppMetrics::default();
        metrics.record(&FrameOutcome::Malformed(FrameError::Empty));
        metrics.record(&FrameOutcome::Silent { loudness: 0.0 });
        metrics.record(&analyzed(StressStatus::Relaxed, ""));
        metrics.record(&analyzed(StressStatus::Loud, "Breathe."));
        metrics.record(&analyzed(StressStatus::Anxious, ""));

        assert_eq!(metrics.frames_received, 5);
        assert_eq!(metrics.malformed_frames, 1);
        assert_eq!(metrics.silent_frames, 1);
        assert_eq!(metrics.analyzed_frames, 3);
        assert_eq!(metrics.relaxed_frames, 1);
        assert_eq!(metrics.loud_frames, 1);
        assert_eq!(metrics.anxious_frames, 1);
        assert_eq!(metrics.feedback_emitted, 1);
        assert_eq!(metrics.feedback_suppressed, 1);
    }

    #[test]
    fn test_global_scope_shares_one_gate() {
        let state = AppState::new(AppConfig::default()).unwrap();
        assert!(Arc::ptr_eq(&state.gate_for_session(), &state.gate_for_session()));
        assert!(Arc::ptr_eq(state.pipeline_for_session().gate(), &state.gate_for_session()));
    }

    #[test]
    fn test_per_session_scope_isolates_gates() {
        let mut config = AppConfig::default();
        config.feedback.cooldown_scope = CooldownScope::PerSession;
        let state = AppState::new(config).unwrap();

        let a = state.gate_for_session();
        let b = state.gate_for_session();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(a.scope(), CooldownScope::PerSession);
    }

    #[test]
    fn test_empty_catalog_rejected() {
        let mut config = AppConfig::default();
        config.feedback.messages.clear();
        assert!(AppState::new(config).is_err());
    }

    #[test]
    fn test_session_pipelines_feed_shared_metrics() {
        let state = AppState::new(AppConfig::default()).unwrap();
        let now = Instant::now();

        assert!(state.pipeline_for_session().analyze(&[0u8; 5], now).is_none());
        assert!(state.pipeline_for_session().analyze(&[0u8; 16], now).is_none());

        let metrics = state.get_metrics_snapshot();
        assert_eq!(metrics.frames_received, 2);
        assert_eq!(metrics.malformed_frames, 1);
        assert_eq!(metrics.silent_frames, 1);
    }
}
