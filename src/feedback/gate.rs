//! # Feedback Cooldown Gate
//!
//! Rate limiter deciding whether a feedback message may be emitted for a frame.
//!
//! ## Contract:
//! `try_emit(status, now)` passes when `status` is not `Relaxed` and more than
//! `cooldown` has elapsed since the last emission (or nothing was emitted yet).
//! A pass records `now` as the new emission time before returning, under the same lock
//! as the check, so two frames racing through the gate cannot both pass inside one
//! cooldown window.
//!
//! ## Scope:
//! Whether the gate is shared by every connection or owned by one is decided by whoever
//! builds it (see `CooldownScope` and `AppState::gate_for_session`). The gate itself does
//! not know.
//!
//! ## Monotonicity:
//! The stored timestamp never moves backwards. A `now` older than the stored value
//! (a stale reading from a concurrent session) sees zero elapsed time and fails.

use crate::analysis::classifier::StressStatus;
use crate::config::CooldownScope;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct CooldownGate {
    cooldown: Duration,
    scope: CooldownScope,
    last_emission: Mutex<Option<Instant>>,
}

impl CooldownGate {
    pub fn new(cooldown: Duration, scope: CooldownScope) -> Self {
        Self {
            cooldown,
            scope,
            last_emission: Mutex::new(None),
        }
    }

    /// Build from the `feedback.cooldown_seconds` setting. Negative values mean no cooldown,
    /// unrepresentably large ones mean feedback is only ever emitted once.
    pub fn from_seconds(seconds: f64, scope: CooldownScope) -> Self {
        let cooldown = Duration::try_from_secs_f64(seconds.max(0.0)).unwrap_or(Duration::MAX);
        Self::new(cooldown, scope)
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn scope(&self) -> CooldownScope {
        self.scope
    }

    /// Time of the most recent emission, if any.
    pub fn last_emission(&self) -> Option<Instant> {
        *self.last_emission.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Check the cooldown and claim it on success.
    pub fn try_emit(&self, status: StressStatus, now: Instant) -> bool {
        if !status.wants_feedback() {
            return false;
        }

        let mut last = self.last_emission.lock().unwrap_or_else(|e| e.into_inner());
        let open = match *last {
            None => true,
            Some(previous) => now.saturating_duration_since(previous) > self.cooldown,
        };

        if open {
            *last = Some(now);
        }
        open
    }
}
