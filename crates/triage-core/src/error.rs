//! Error types for triage operations.

use thiserror::Error;

/// Errors that can occur while classifying free text.
///
/// These never reach an end user: [`crate::GuardedTriage`] absorbs them and
/// degrades to the local strategy or a canned reply.
#[derive(Debug, Error)]
pub enum TriageError {
    /// The strategy is misconfigured (missing API key, bad client setup).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The remote service could not be reached.
    #[error("network error: {0}")]
    Network(String),

    /// The remote service answered with an error.
    #[error("processing failed: {0}")]
    ProcessingFailed(String),

    /// The remote service answered with something that is not the expected JSON shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The strategy did not answer in time.
    #[error("classification timed out")]
    Timeout,
}

/// A stored or submitted value did not match any known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    /// The enum being parsed (e.g. "urgency level").
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}
