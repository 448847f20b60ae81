//! The Triage trait definition.

use async_trait::async_trait;

use crate::error::TriageError;
use crate::types::{AiSummary, ChatReply, ConcernContext};

/// A strategy that derives urgency, keywords and recommendations from free text.
///
/// Implementations range from the deterministic [`crate::KeywordTriage`] to
/// remote language-model backends. The trait is object-safe and is normally
/// held as `Arc<dyn Triage>` behind a [`crate::GuardedTriage`].
#[async_trait]
pub trait Triage: Send + Sync {
    /// Summarize a patient's medical concern for staff.
    async fn summarize(&self, context: &ConcernContext) -> Result<AiSummary, TriageError>;

    /// Answer a chat message and analyze its intent and urgency.
    async fn reply(&self, message: &str) -> Result<ChatReply, TriageError>;

    /// Get a human-readable name for this strategy.
    fn name(&self) -> &str;
}
