//! Timeout, fallback and emergency short-circuit around a triage strategy.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{info, warn};

use crate::emergency::{detect_emergency, emergency_reply};
use crate::error::TriageError;
use crate::keyword::{fallback_reply, summarize_concern};
use crate::trait_def::Triage;
use crate::types::{AiSummary, ChatReply, ConcernContext};

/// Wraps a strategy so that triage never fails and never blocks intake.
///
/// - Chat messages containing an emergency term get the canned emergency reply
///   without the strategy being called.
/// - Each strategy call runs under `timeout`.
/// - Failed or timed-out summaries fall back to the keyword summary; failed
///   replies fall back to a canned answer.
#[derive(Clone)]
pub struct GuardedTriage {
    strategy: Arc<dyn Triage>,
    timeout: Duration,
}

impl GuardedTriage {
    /// Guard `strategy`, bounding each call by `timeout`.
    pub fn new(strategy: Arc<dyn Triage>, timeout: Duration) -> Self {
        info!(
            strategy = strategy.name(),
            timeout_ms = timeout.as_millis() as u64,
            "Triage strategy configured"
        );
        Self { strategy, timeout }
    }

    /// Name of the wrapped strategy.
    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    /// Summarize a patient concern, degrading to keyword rules on failure.
    pub async fn summarize(&self, context: &ConcernContext) -> AiSummary {
        match self.bounded(self.strategy.summarize(context)).await {
            Ok(summary) => summary,
            Err(err) => {
                warn!(
                    strategy = self.strategy.name(),
                    error = %err,
                    "Summary failed, using keyword summary"
                );
                summarize_concern(context)
            }
        }
    }

    /// Answer a chat message.
    pub async fn reply(&self, message: &str) -> ChatReply {
        if let Some(term) = detect_emergency(message) {
            info!(term, "Emergency term detected, skipping classification");
            return emergency_reply();
        }

        match self.bounded(self.strategy.reply(message)).await {
            Ok(reply) => reply,
            Err(err) => {
                warn!(
                    strategy = self.strategy.name(),
                    error = %err,
                    "Reply failed, using fallback reply"
                );
                fallback_reply()
            }
        }
    }

    async fn bounded<T>(
        &self,
        call: impl std::future::Future<Output = Result<T, TriageError>>,
    ) -> Result<T, TriageError> {
        timeout(self.timeout, call)
            .await
            .unwrap_or(Err(TriageError::Timeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyword::KeywordTriage;
    use crate::types::{Priority, RiskLevel, UrgencyLevel};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::sleep;

    /// Counts calls and answers with a fixed reply.
    #[derive(Default)]
    struct CountingTriage {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Triage for CountingTriage {
        async fn summarize(&self, context: &ConcernContext) -> Result<AiSummary, TriageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(summarize_concern(context))
        }

        async fn reply(&self, _message: &str) -> Result<ChatReply, TriageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ChatReply::local("counted"))
        }

        fn name(&self) -> &str {
            "CountingTriage"
        }
    }

    /// Always fails.
    struct FailingTriage;

    #[async_trait]
    impl Triage for FailingTriage {
        async fn summarize(&self, _context: &ConcernContext) -> Result<AiSummary, TriageError> {
            Err(TriageError::Network("connection refused".to_string()))
        }

        async fn reply(&self, _message: &str) -> Result<ChatReply, TriageError> {
            Err(TriageError::MalformedResponse("not json".to_string()))
        }

        fn name(&self) -> &str {
            "FailingTriage"
        }
    }

    /// Sleeps longer than any test timeout.
    struct SlowTriage;

    #[async_trait]
    impl Triage for SlowTriage {
        async fn summarize(&self, context: &ConcernContext) -> Result<AiSummary, TriageError> {
            sleep(Duration::from_secs(5)).await;
            Ok(AiSummary {
                symptoms: vec!["never".to_string()],
                ..summarize_concern(context)
            })
        }

        async fn reply(&self, _message: &str) -> Result<ChatReply, TriageError> {
            sleep(Duration::from_secs(5)).await;
            Ok(ChatReply::local("too late"))
        }

        fn name(&self) -> &str {
            "SlowTriage"
        }
    }

    #[tokio::test]
    async fn test_chest_pain_short_circuits() {
        let counting = Arc::new(CountingTriage::default());
        let guard = GuardedTriage::new(counting.clone(), Duration::from_secs(1));

        let reply = guard.reply("I have chest pain and feel dizzy").await;

        assert!(reply.is_emergency);
        assert!(reply.analysis.escalate);
        assert_eq!(counting.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_regular_message_reaches_strategy() {
        let counting = Arc::new(CountingTriage::default());
        let guard = GuardedTriage::new(counting.clone(), Duration::from_secs(1));

        let reply = guard.reply("How do I book an appointment?").await;

        assert_eq!(reply.response, "counted");
        assert!(!reply.is_emergency);
        assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failing_strategy_falls_back() {
        let guard = GuardedTriage::new(Arc::new(FailingTriage), Duration::from_secs(1));

        let summary = guard
            .summarize(&ConcernContext::new("bad cough", UrgencyLevel::High))
            .await;
        assert_eq!(summary.symptoms, vec!["cough"]);
        assert_eq!(summary.suggested_priority, Priority::Urgent);

        let reply = guard.reply("hello").await;
        assert_eq!(reply, fallback_reply());
    }

    #[tokio::test]
    async fn test_slow_strategy_times_out() {
        let guard = GuardedTriage::new(Arc::new(SlowTriage), Duration::from_millis(20));

        let summary = guard
            .summarize(&ConcernContext::new("fatigue", UrgencyLevel::Low))
            .await;
        assert_eq!(summary.symptoms, vec!["fatigue"]);
        assert_eq!(summary.risk_level, RiskLevel::Low);

        let reply = guard.reply("hello").await;
        assert_eq!(reply, fallback_reply());
    }

    #[tokio::test]
    async fn test_keyword_strategy_name() {
        let guard = GuardedTriage::new(Arc::new(KeywordTriage::new()), Duration::from_secs(1));
        assert_eq!(guard.strategy_name(), "KeywordTriage");
    }
}
