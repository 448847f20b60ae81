//! Fixed instruction templates sent to the model.

use sha2::{Digest, Sha256};
use triage_core::{ConcernContext, MessageAnalysis};

/// System prompt for the chat assistant.
pub const ASSISTANT_PROMPT: &str = "You are a healthcare support assistant for CareConnect. \
Provide helpful, accurate general health information while keeping professional boundaries. \
Always say you are not a substitute for professional medical care. For emergencies always advise \
calling 112 or visiting emergency services. Never diagnose or prescribe. Encourage users to seek \
professional care for serious conditions and offer to connect them with CareConnect volunteers. \
Start with empathy, give general information, include disclaimers and suggest next steps. \
Keep the answer under 300 words.";

/// System prompt for structured summaries.
pub const SUMMARY_SYSTEM: &str =
    "You are a medical professional creating patient summaries. Respond only with valid JSON.";

/// System prompt for message analysis.
pub const ANALYSIS_SYSTEM: &str =
    "You are a medical message analyzer. Respond only with valid JSON.";

/// Build the summary request for a patient concern.
pub fn summary_prompt(context: &ConcernContext) -> String {
    let age = context
        .age
        .map(|a| a.to_string())
        .unwrap_or_else(|| "Not specified".to_string());
    let gender = context.gender.as_deref().unwrap_or("Not specified");

    format!(
        r#"Generate a structured medical summary for healthcare professionals.

Patient information:
- Age: {age}
- Gender: {gender}
- Urgency level: {urgency}

Medical concern: "{concern}"

Reply with a JSON object of this shape:
{{
  "symptoms": ["symptom1", "symptom2"],
  "duration": "estimated duration",
  "riskLevel": "low|medium|high",
  "suggestedPriority": "low|medium|high|urgent",
  "recommendations": ["recommendation1", "recommendation2"]
}}"#,
        urgency = context.urgency,
        concern = context.concern,
    )
}

/// Build the analysis request for a chat message.
pub fn analysis_prompt(message: &str) -> String {
    format!(
        r#"Analyze this healthcare message for intent, urgency and key information.

Message: "{message}"

Reply with a JSON object of this shape:
{{
  "intent": "symptom-check|medication-info|appointment-booking|volunteer-info|general-inquiry|other",
  "urgency": "low|medium|high|critical",
  "confidence": 0.0,
  "keywords": ["keyword1"],
  "entities": [{{"type": "symptom|medication|condition", "value": "extracted value"}}],
  "sentiment": "positive|neutral|negative",
  "sentimentScore": 0.0,
  "escalate": false
}}"#
    )
}

/// Build the system prompt for the reply, embedding the analysis.
pub fn reply_prompt(analysis: &MessageAnalysis) -> String {
    format!(
        "{ASSISTANT_PROMPT}\n\nMessage analysis:\n- Intent: {}\n- Urgency: {}\n- Keywords: {}",
        analysis.intent,
        analysis.urgency.level,
        analysis.keywords.join(", ")
    )
}

/// Stable fingerprint of a prompt, logged so deployments can be compared.
pub fn hash_prompt(prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        hex.push_str(&format!("{:02x}", byte));
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::*;
    use triage_core::UrgencyLevel;

    #[test]
    fn test_hash_prompt_stable() {
        let first = hash_prompt(ASSISTANT_PROMPT);
        let second = hash_prompt(ASSISTANT_PROMPT);

        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        assert_ne!(first, hash_prompt(SUMMARY_SYSTEM));
    }

    #[test]
    fn test_summary_prompt_includes_context() {
        let context = ConcernContext::new("sharp knee pain", UrgencyLevel::High)
            .with_demographics(42, "female");
        let prompt = summary_prompt(&context);

        assert!(prompt.contains("Age: 42"));
        assert!(prompt.contains("Gender: female"));
        assert!(prompt.contains("Urgency level: high"));
        assert!(prompt.contains("sharp knee pain"));
    }

    #[test]
    fn test_summary_prompt_unknown_demographics() {
        let prompt = summary_prompt(&ConcernContext::new("cough", UrgencyLevel::Low));
        assert!(prompt.contains("Age: Not specified"));
    }
}
