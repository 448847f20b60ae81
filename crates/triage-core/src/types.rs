//! Triage input and output types.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::UnknownVariant;

/// Declares a lowercase text enum with parsing, display and `TryFrom<String>`.
macro_rules! level_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            /// Every variant, in ascending order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Wire and storage representation.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }

            /// Parse from user input, ignoring case and surrounding whitespace.
            pub fn parse(s: &str) -> Option<Self> {
                match s.trim().to_lowercase().as_str() {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl TryFrom<String> for $name {
            type Error = UnknownVariant;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                $name::parse(&value).ok_or(UnknownVariant { kind: $kind, value })
            }
        }
    };
}

level_enum!(
    /// Urgency a patient selects when submitting a request.
    UrgencyLevel, "urgency level" {
        Low => "low",
        Medium => "medium",
        High => "high",
    }
);

level_enum!(
    /// Clinical risk derived by triage.
    RiskLevel, "risk level" {
        Low => "low",
        Medium => "medium",
        High => "high",
    }
);

level_enum!(
    /// Staff-facing queue priority.
    Priority, "priority" {
        Low => "low",
        Medium => "medium",
        High => "high",
        Urgent => "urgent",
    }
);

level_enum!(
    /// Urgency assessed for a chat message.
    ChatUrgency, "chat urgency" {
        Low => "low",
        Medium => "medium",
        High => "high",
        Critical => "critical",
    }
);

level_enum!(
    /// Coarse sentiment of a chat message.
    SentimentLabel, "sentiment" {
        Positive => "positive",
        Neutral => "neutral",
        Negative => "negative",
    }
);

/// Structured input for patient intake triage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConcernContext {
    /// The patient's free-text medical concern.
    pub concern: String,
    /// Urgency the patient selected.
    pub urgency: UrgencyLevel,
    /// Patient age, if known.
    pub age: Option<u32>,
    /// Patient gender, if known.
    pub gender: Option<String>,
}

impl ConcernContext {
    /// Create a context with no demographic details.
    pub fn new(concern: impl Into<String>, urgency: UrgencyLevel) -> Self {
        Self {
            concern: concern.into(),
            urgency,
            age: None,
            gender: None,
        }
    }

    /// Attach age and gender.
    pub fn with_demographics(mut self, age: u32, gender: impl Into<String>) -> Self {
        self.age = Some(age);
        self.gender = Some(gender.into());
        self
    }
}

/// Triage summary attached to a patient request at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiSummary {
    pub symptoms: Vec<String>,
    pub duration: String,
    pub risk_level: RiskLevel,
    pub suggested_priority: Priority,
    pub recommendations: Vec<String>,
}

/// An entity extracted from a chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Entity kind: symptom, medication, condition.
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Sentiment score in [-1, 1] with its label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    pub score: f64,
    pub label: SentimentLabel,
}

impl Default for Sentiment {
    fn default() -> Self {
        Self {
            score: 0.0,
            label: SentimentLabel::Neutral,
        }
    }
}

/// Urgency level with the classifier's confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrgencyAssessment {
    pub level: ChatUrgency,
    pub confidence: f64,
}

impl Default for UrgencyAssessment {
    fn default() -> Self {
        Self {
            level: ChatUrgency::Medium,
            confidence: 0.5,
        }
    }
}

/// Analysis of a single chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageAnalysis {
    /// Intent, expressed as a session category (e.g. "symptom-check").
    pub intent: String,
    pub urgency: UrgencyAssessment,
    pub sentiment: Sentiment,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub recommended_actions: Vec<String>,
    /// Whether a human should take over.
    #[serde(default)]
    pub escalate: bool,
}

impl Default for MessageAnalysis {
    fn default() -> Self {
        Self {
            intent: "general-inquiry".to_string(),
            urgency: UrgencyAssessment::default(),
            sentiment: Sentiment::default(),
            keywords: Vec::new(),
            entities: Vec::new(),
            recommended_actions: Vec::new(),
            escalate: false,
        }
    }
}

/// The assistant's answer to a chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub response: String,
    pub analysis: MessageAnalysis,
    pub is_emergency: bool,
    /// Tokens consumed by a remote model, 0 for local replies.
    pub tokens_used: u32,
    /// Model that produced the reply, if any.
    pub model: Option<String>,
}

impl ChatReply {
    /// A locally produced reply with default analysis.
    pub fn local(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            analysis: MessageAnalysis::default(),
            is_emergency: false,
            tokens_used: 0,
            model: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parse() {
        assert_eq!(UrgencyLevel::parse("High"), Some(UrgencyLevel::High));
        assert_eq!(UrgencyLevel::parse(" low "), Some(UrgencyLevel::Low));
        assert_eq!(UrgencyLevel::parse("severe"), None);
        assert_eq!(Priority::parse("urgent"), Some(Priority::Urgent));
        assert_eq!(ChatUrgency::parse("critical"), Some(ChatUrgency::Critical));
    }

    #[test]
    fn test_try_from_string() {
        let level = UrgencyLevel::try_from("medium".to_string()).unwrap();
        assert_eq!(level, UrgencyLevel::Medium);

        let err = Priority::try_from("whenever".to_string()).unwrap_err();
        assert_eq!(err.to_string(), "unknown priority value: whenever");
    }

    #[test]
    fn test_summary_serializes_camel_case() {
        let summary = AiSummary {
            symptoms: vec!["fever".to_string()],
            duration: "recent onset".to_string(),
            risk_level: RiskLevel::High,
            suggested_priority: Priority::Urgent,
            recommendations: vec![],
        };

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["riskLevel"], "high");
        assert_eq!(json["suggestedPriority"], "urgent");
    }

    #[test]
    fn test_entity_kind_renamed() {
        let entity: Entity =
            serde_json::from_str(r#"{"type":"symptom","value":"cough"}"#).unwrap();
        assert_eq!(entity.kind, "symptom");
        assert!(entity.confidence.is_none());
    }
}
