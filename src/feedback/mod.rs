//! # Feedback
//!
//! Deciding when to talk back to the speaker and what to say.
//!
//! ## Components:
//! - **Cooldown Gate**: Rate limiter shared globally or owned per session
//! - **Responder**: Pluggable text producer; the default draws from a fixed catalog

pub mod gate;
pub mod responder;

pub use gate::CooldownGate;
pub use responder::{CatalogResponder, Responder};
