//! Feedback text producers.
//!
//! The pipeline only knows the `Responder` trait. The shipped implementation picks a line
//! from a fixed catalog; a real inference backend can replace it without touching the
//! analysis code.

use crate::analysis::classifier::StressStatus;
use rand::seq::SliceRandom;

/// Produces the feedback text for a frame that passed the cooldown gate.
///
/// Only called with non-`Relaxed` statuses.
pub trait Responder: Send + Sync {
    fn respond(&self, status: StressStatus) -> String;
}

/// Uniform random choice from a fixed, non-empty catalog.
///
/// The same line may be picked twice in a row, and the status does not influence the pick.
pub struct CatalogResponder {
    messages: Vec<String>,
}

impl CatalogResponder {
    /// Returns `None` for an empty catalog.
    pub fn new(messages: Vec<String>) -> Option<Self> {
        if messages.is_empty() {
            None
        } else {
            Some(Self { messages })
        }
    }
}

impl Responder for CatalogResponder {
    fn respond(&self, _status: StressStatus) -> String {
        let mut rng = rand::thread_rng();
        self.messages
            .choose(&mut rng)
            .cloned()
            .unwrap_or_default()
    }
}
