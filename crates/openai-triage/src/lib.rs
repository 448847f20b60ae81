//! Remote triage strategy for an OpenAI-compatible chat-completions API.
//!
//! # Features
//!
//! - Structured patient summaries requested as JSON
//! - Chat replies preceded by a JSON message analysis (intent, urgency, sentiment)
//! - Local degradation when the model answers with something that is not JSON
//! - Configurable via environment variables or a builder
//!
//! Wrap the strategy in [`triage_core::GuardedTriage`] to get the emergency
//! short-circuit and the timeout fallback.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use openai_triage::OpenAiTriage;
//! use triage_core::GuardedTriage;
//!
//! fn build() -> Result<GuardedTriage, Box<dyn std::error::Error>> {
//!     let remote = OpenAiTriage::from_env()?;
//!     Ok(GuardedTriage::new(Arc::new(remote), Duration::from_secs(10)))
//! }
//! ```

mod api_types;
mod config;
mod prompt;
mod triage;

pub use config::{OpenAiTriageConfig, OpenAiTriageConfigBuilder};
pub use prompt::hash_prompt;
pub use triage::OpenAiTriage;

// Re-export triage-core types for convenience
pub use triage_core::{Triage, TriageError};
