//! Emergency term detection for chat messages.

use crate::types::{ChatReply, ChatUrgency, MessageAnalysis, UrgencyAssessment};

/// Terms that bypass classification and trigger an emergency escalation.
pub const EMERGENCY_TERMS: &[&str] = &[
    "emergency",
    "die",
    "dying",
    "suicide",
    "kill myself",
    "heart attack",
    "stroke",
    "cannot breathe",
    "can't breathe",
    "chest pain",
    "severe bleeding",
    "unconscious",
    "overdose",
    "poison",
    "severe burn",
    "broken bone",
    "head injury",
];

const EMERGENCY_RESPONSE: &str = "EMERGENCY DETECTED\n\n\
Based on your message, you may be experiencing a medical emergency. Please:\n\n\
1. Call 112 immediately - don't wait\n\
2. Go to the nearest emergency room\n\
3. If possible, have someone stay with you\n\
4. Don't attempt to drive yourself\n\n\
This chat is not a substitute for emergency medical care. \
If you need guidance while waiting for emergency services I'm here to help, but please call 112 first.";

/// Return the first emergency term found in `message`, if any.
///
/// Terms match on word boundaries, so "diet" does not match "die".
pub fn detect_emergency(message: &str) -> Option<&'static str> {
    let lower = message.to_lowercase();
    EMERGENCY_TERMS
        .iter()
        .copied()
        .find(|term| contains_term(&lower, term))
}

/// The canned reply returned when an emergency term is found.
pub fn emergency_reply() -> ChatReply {
    ChatReply {
        response: EMERGENCY_RESPONSE.to_string(),
        analysis: MessageAnalysis {
            intent: "emergency".to_string(),
            urgency: UrgencyAssessment {
                level: ChatUrgency::Critical,
                confidence: 1.0,
            },
            recommended_actions: vec!["call-112".to_string(), "emergency-room".to_string()],
            escalate: true,
            ..MessageAnalysis::default()
        },
        is_emergency: true,
        tokens_used: 0,
        model: None,
    }
}

fn contains_term(haystack: &str, term: &str) -> bool {
    haystack.match_indices(term).any(|(start, _)| {
        let end = start + term.len();
        let before = haystack[..start].chars().next_back();
        let after = haystack[end..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}
