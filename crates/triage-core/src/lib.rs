//! Core trait and types for triage classifiers.
//!
//! This crate provides the shared interface for every triage strategy used by
//! the CareConnect intake service. It defines:
//!
//! - [`Triage`] - The trait that all classification strategies implement
//! - [`ConcernContext`] / [`AiSummary`] - Input and output of patient intake triage
//! - [`ChatReply`] / [`MessageAnalysis`] - Output of the chat assistant
//! - [`KeywordTriage`] - The deterministic local strategy
//! - [`GuardedTriage`] - Emergency short-circuit, timeout and fallback around any strategy
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use triage_core::{ConcernContext, GuardedTriage, KeywordTriage, UrgencyLevel};
//!
//! #[tokio::main]
//! async fn main() {
//!     let triage = GuardedTriage::new(Arc::new(KeywordTriage::new()), Duration::from_secs(5));
//!
//!     let context = ConcernContext::new("I have a headache", UrgencyLevel::Medium);
//!     let summary = triage.summarize(&context).await;
//!     assert_eq!(summary.symptoms, vec!["headache".to_string()]);
//! }
//! ```

mod emergency;
mod error;
mod guard;
mod keyword;
mod trait_def;
mod types;

pub use emergency::{detect_emergency, emergency_reply, EMERGENCY_TERMS};
pub use error::{TriageError, UnknownVariant};
pub use guard::GuardedTriage;
pub use keyword::{fallback_reply, summarize_concern, KeywordTriage};
pub use trait_def::Triage;
pub use types::{
    AiSummary, ChatReply, ChatUrgency, ConcernContext, Entity, MessageAnalysis, Priority,
    RiskLevel, Sentiment, SentimentLabel, UrgencyAssessment, UrgencyLevel,
};

// Re-export async_trait for strategy implementations
pub use async_trait::async_trait;
