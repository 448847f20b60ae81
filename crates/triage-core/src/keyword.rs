//! Deterministic keyword strategy.

use async_trait::async_trait;

use crate::error::TriageError;
use crate::trait_def::Triage;
use crate::types::{
    AiSummary, ChatReply, ConcernContext, MessageAnalysis, Priority, RiskLevel, UrgencyLevel,
};

/// Symptoms recognised by plain containment.
const SYMPTOM_KEYWORDS: &[&str] = &["headache", "fever", "pain", "cough", "fatigue"];

const CONSULT_PROFESSIONAL: &str = "Consult with healthcare professional";
const MONITOR_SYMPTOMS: &str = "Monitor symptoms closely";
const SEEK_IMMEDIATE_ATTENTION: &str = "Seek immediate medical attention if symptoms worsen";

const REPLY_URGENT: &str = "This sounds urgent. Please call 112 immediately for emergency medical \
services. If it is not an emergency but you need urgent guidance, visit the nearest hospital or \
call our support hotline at 1800-123-4567.";
const REPLY_VOLUNTEER: &str = "Thank you for your interest in volunteering with CareConnect! You \
can register as a healthcare volunteer on our platform. We'll review your application and connect \
you with patients who need your expertise.";
const REPLY_SYMPTOM: &str = "I understand you're experiencing symptoms. For severe symptoms, call \
112 immediately. For non-emergency symptoms you can submit a patient support request. Keep track \
of how long symptoms last and how severe they are, stay hydrated and rest. Please consult a \
healthcare professional for a proper diagnosis.";
const REPLY_APPOINTMENT: &str = "For appointments, submit a patient support request and we'll \
connect you with an appropriate healthcare provider. You can also browse our services to find the \
right type of care.";
const REPLY_MEDICINE: &str = "For medication questions, please consult a healthcare professional. \
Our volunteers can give guidance on medications and their proper use. Never share personal \
medical information in chat.";
const REPLY_SUPPORT: &str = "I can help you get the support you need! Submit a patient support \
request and we'll connect you with healthcare volunteers. For urgent medical concerns, call 112 \
immediately.";
const REPLY_DEFAULT: &str = "I'm here to help you with healthcare support! I can help you find \
the right services, connect with healthcare volunteers, and answer general health questions. For \
emergencies, please call 112. How can I help you today?";
const REPLY_FALLBACK: &str = "I'm here to help you with healthcare support. You can ask me about \
symptoms, volunteer opportunities, or how to get medical assistance. For emergencies, please call \
112.";

/// The local, always-available triage strategy.
///
/// Symptoms come from keyword containment and risk is mapped straight from the
/// urgency the patient selected. Chat replies are canned answers chosen by
/// keyword.
#[derive(Debug, Clone, Default)]
pub struct KeywordTriage;

impl KeywordTriage {
    /// Create a new KeywordTriage.
    pub fn new() -> Self {
        Self
    }

    /// Pick a canned reply for a chat message.
    pub fn canned_reply(message: &str) -> ChatReply {
        let lower = message.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));

        let (response, intent) = if has(&["emergency", "urgent"]) {
            (REPLY_URGENT, "emergency-guidance")
        } else if has(&["volunteer"]) {
            (REPLY_VOLUNTEER, "volunteer-info")
        } else if has(&["symptom", "pain", "fever", "headache"]) {
            (REPLY_SYMPTOM, "symptom-check")
        } else if has(&["appointment", "book", "schedule"]) {
            (REPLY_APPOINTMENT, "appointment-booking")
        } else if has(&["medicine", "drug", "medication"]) {
            (REPLY_MEDICINE, "medication-info")
        } else if has(&["support", "help"]) {
            (REPLY_SUPPORT, "general-inquiry")
        } else {
            (REPLY_DEFAULT, "general-inquiry")
        };

        ChatReply {
            response: response.to_string(),
            analysis: MessageAnalysis {
                intent: intent.to_string(),
                keywords: SYMPTOM_KEYWORDS
                    .iter()
                    .filter(|k| lower.contains(*k))
                    .map(|k| k.to_string())
                    .collect(),
                ..MessageAnalysis::default()
            },
            is_emergency: false,
            tokens_used: 0,
            model: None,
        }
    }
}

/// Summarize a concern with keyword rules.
pub fn summarize_concern(context: &ConcernContext) -> AiSummary {
    let concern = context.concern.to_lowercase();

    let symptoms: Vec<String> = SYMPTOM_KEYWORDS
        .iter()
        .filter(|keyword| concern.contains(*keyword))
        .map(|keyword| keyword.to_string())
        .collect();

    let (risk_level, suggested_priority) = match context.urgency {
        UrgencyLevel::High => (RiskLevel::High, Priority::Urgent),
        UrgencyLevel::Medium => (RiskLevel::Medium, Priority::Medium),
        UrgencyLevel::Low => (RiskLevel::Low, Priority::Low),
    };

    let mut recommendations = vec![CONSULT_PROFESSIONAL.to_string()];
    if !symptoms.is_empty() {
        recommendations.push(MONITOR_SYMPTOMS.to_string());
    }
    if context.urgency == UrgencyLevel::High {
        recommendations.push(SEEK_IMMEDIATE_ATTENTION.to_string());
    }

    AiSummary {
        symptoms,
        duration: "recent onset".to_string(),
        risk_level,
        suggested_priority,
        recommendations,
    }
}

/// Reply used when a strategy fails or times out.
pub fn fallback_reply() -> ChatReply {
    ChatReply::local(REPLY_FALLBACK)
}

#[async_trait]
impl Triage for KeywordTriage {
    async fn summarize(&self, context: &ConcernContext) -> Result<AiSummary, TriageError> {
        Ok(summarize_concern(context))
    }

    async fn reply(&self, message: &str) -> Result<ChatReply, TriageError> {
        Ok(Self::canned_reply(message))
    }

    fn name(&self) -> &str {
        "KeywordTriage"
    }
}
