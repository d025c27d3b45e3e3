//! Engine-specific error types.
//!
//! The engine recovers locally wherever it can keep making forward
//! progress: a malformed event is dropped and counted, a failing sink is
//! degraded, a predicate type mismatch is simply false. Only rule loading
//! surfaces hard errors, because those reflect operator intent.

use thiserror::Error;

/// Errors that can occur during ingestion or rule loading.
#[derive(Debug, Error)]
pub enum EngineError {
    /// An admitted event is structurally unusable (not an object, or
    /// missing its `type` tag). The event is dropped and counted in
    /// `events_rejected`; no rule evaluation runs.
    #[error("event schema error: {0}")]
    EventSchema(String),

    /// One or more enabled rules failed load-time validation.
    #[error("{} rule(s) failed validation", .0.len())]
    RuleValidation(Vec<correl_rules::RuleError>),

    /// The shutdown drain exceeded its deadline; remaining queued events
    /// were discarded.
    #[error("shutdown drain exceeded deadline, {discarded} event(s) discarded")]
    ShutdownDeadlineExceeded { discarded: usize },
}

pub type Result<T> = std::result::Result<T, EngineError>;
