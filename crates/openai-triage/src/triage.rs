//! OpenAiTriage implementation using an OpenAI-compatible chat-completions API.

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};
use triage_core::{
    async_trait, summarize_concern, AiSummary, ChatReply, ChatUrgency, ConcernContext, Entity,
    MessageAnalysis, Priority, RiskLevel, Sentiment, SentimentLabel, Triage, TriageError,
    UrgencyAssessment,
};

use crate::api_types::{ApiError, ChatCompletionRequest, ChatCompletionResponse, ChatMessage};
use crate::config::OpenAiTriageConfig;
use crate::prompt::{
    analysis_prompt, hash_prompt, reply_prompt, summary_prompt, ANALYSIS_SYSTEM,
    ASSISTANT_PROMPT, SUMMARY_SYSTEM,
};

/// Token budget for the structured calls.
const STRUCTURED_MAX_TOKENS: u32 = 300;

/// Temperature for conversational replies.
const REPLY_TEMPERATURE: f32 = 0.7;

/// A triage strategy backed by a remote language model.
///
/// Summaries and message analyses are requested as JSON. A reply that is not
/// the expected JSON degrades locally (keyword summary, neutral analysis);
/// transport failures are returned as errors for the caller's guard to absorb.
pub struct OpenAiTriage {
    client: Client,
    config: OpenAiTriageConfig,
}

impl OpenAiTriage {
    /// Create a new OpenAiTriage with the given configuration.
    pub fn new(config: OpenAiTriageConfig) -> Result<Self, TriageError> {
        if config.api_key.trim().is_empty() {
            return Err(TriageError::Configuration("API key is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                TriageError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        info!(
            "OpenAiTriage initialized with model: {}, prompt fingerprint: {}",
            config.model,
            hash_prompt(ASSISTANT_PROMPT)
        );

        Ok(Self { client, config })
    }

    /// Create an OpenAiTriage from environment variables.
    ///
    /// See [`OpenAiTriageConfig::from_env`] for the variables read.
    pub fn from_env() -> Result<Self, TriageError> {
        Self::new(OpenAiTriageConfig::from_env()?)
    }

    /// Get the configuration.
    pub fn config(&self) -> &OpenAiTriageConfig {
        &self.config
    }

    /// Make a chat completion request.
    async fn chat_completion(
        &self,
        messages: Vec<ChatMessage>,
        temperature: Option<f32>,
        max_tokens: Option<u32>,
    ) -> Result<ChatCompletionResponse, TriageError> {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.api_url.trim_end_matches('/')
        );

        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages,
            max_tokens,
            temperature,
        };

        debug!("Sending request to chat completions API: {:?}", request);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TriageError::Timeout
                } else {
                    TriageError::Network(format!("Failed to send request: {}", e))
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();

            if let Ok(api_error) = serde_json::from_str::<ApiError>(&error_text) {
                return Err(TriageError::ProcessingFailed(format!(
                    "API error ({}): {}",
                    status.as_u16(),
                    api_error.error.message
                )));
            }

            return Err(TriageError::ProcessingFailed(format!(
                "API error ({}): {}",
                status.as_u16(),
                error_text
            )));
        }

        let completion: ChatCompletionResponse = response.json().await.map_err(|e| {
            TriageError::MalformedResponse(format!("Failed to parse response: {}", e))
        })?;

        debug!(
            tokens = completion.total_tokens(),
            "Received chat completions response"
        );

        Ok(completion)
    }

    /// Analyze a chat message, returning the analysis and tokens spent.
    async fn analyze(&self, message: &str) -> Result<(MessageAnalysis, u32), TriageError> {
        let completion = self
            .chat_completion(
                vec![
                    ChatMessage::system(ANALYSIS_SYSTEM),
                    ChatMessage::user(analysis_prompt(message)),
                ],
                Some(0.1),
                Some(STRUCTURED_MAX_TOKENS),
            )
            .await?;

        let analysis = match completion.content().map(parse_analysis) {
            Some(Ok(analysis)) => analysis,
            Some(Err(err)) => {
                warn!(error = %err, "Unusable message analysis, using default");
                MessageAnalysis::default()
            }
            None => {
                warn!("Empty message analysis, using default");
                MessageAnalysis::default()
            }
        };

        Ok((analysis, completion.total_tokens()))
    }
}

#[async_trait]
impl Triage for OpenAiTriage {
    async fn summarize(&self, context: &ConcernContext) -> Result<AiSummary, TriageError> {
        let completion = self
            .chat_completion(
                vec![
                    ChatMessage::system(SUMMARY_SYSTEM),
                    ChatMessage::user(summary_prompt(context)),
                ],
                self.config.temperature,
                Some(STRUCTURED_MAX_TOKENS),
            )
            .await?;

        let parsed = completion
            .content()
            .ok_or_else(|| TriageError::MalformedResponse("empty summary".to_string()))
            .and_then(parse_summary);

        match parsed {
            Ok(summary) => Ok(summary),
            Err(err) => {
                warn!(error = %err, "Unusable remote summary, using keyword summary");
                Ok(summarize_concern(context))
            }
        }
    }

    async fn reply(&self, message: &str) -> Result<ChatReply, TriageError> {
        let (analysis, analysis_tokens) = self.analyze(message).await?;

        let completion = self
            .chat_completion(
                vec![
                    ChatMessage::system(reply_prompt(&analysis)),
                    ChatMessage::user(message),
                ],
                Some(REPLY_TEMPERATURE),
                self.config.max_tokens,
            )
            .await?;

        let response = completion
            .content()
            .ok_or_else(|| TriageError::ProcessingFailed("empty reply".to_string()))?
            .to_string();

        Ok(ChatReply {
            response,
            analysis,
            is_emergency: false,
            tokens_used: analysis_tokens + completion.total_tokens(),
            model: Some(self.config.model.clone()),
        })
    }

    fn name(&self) -> &str {
        "OpenAiTriage"
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteSummary {
    #[serde(default)]
    symptoms: Vec<String>,
    duration: Option<String>,
    risk_level: Option<String>,
    suggested_priority: Option<String>,
    #[serde(default)]
    recommendations: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteAnalysis {
    intent: Option<String>,
    urgency: Option<String>,
    confidence: Option<f64>,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    entities: Vec<Entity>,
    sentiment: Option<String>,
    sentiment_score: Option<f64>,
    #[serde(default)]
    escalate: bool,
}

/// Models often wrap JSON in a markdown fence.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    match trimmed.strip_prefix("```") {
        Some(rest) => {
            let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
            body.trim_end().trim_end_matches("```").trim()
        }
        None => trimmed,
    }
}

fn parse_summary(text: &str) -> Result<AiSummary, TriageError> {
    let remote: RemoteSummary = serde_json::from_str(strip_code_fence(text))
        .map_err(|e| TriageError::MalformedResponse(e.to_string()))?;

    let risk_level = remote
        .risk_level
        .as_deref()
        .and_then(RiskLevel::parse)
        .ok_or_else(|| TriageError::MalformedResponse("missing or invalid riskLevel".into()))?;

    let suggested_priority = remote
        .suggested_priority
        .as_deref()
        .and_then(Priority::parse)
        .ok_or_else(|| {
            TriageError::MalformedResponse("missing or invalid suggestedPriority".into())
        })?;

    Ok(AiSummary {
        symptoms: remote.symptoms,
        duration: remote.duration.unwrap_or_else(|| "unknown".to_string()),
        risk_level,
        suggested_priority,
        recommendations: remote.recommendations,
    })
}

fn parse_analysis(text: &str) -> Result<MessageAnalysis, TriageError> {
    let remote: RemoteAnalysis = serde_json::from_str(strip_code_fence(text))
        .map_err(|e| TriageError::MalformedResponse(e.to_string()))?;

    let defaults = MessageAnalysis::default();

    Ok(MessageAnalysis {
        intent: remote
            .intent
            .map(|i| i.trim().to_lowercase())
            .filter(|i| !i.is_empty())
            .unwrap_or(defaults.intent),
        urgency: UrgencyAssessment {
            level: remote
                .urgency
                .as_deref()
                .and_then(ChatUrgency::parse)
                .unwrap_or(ChatUrgency::Medium),
            confidence: remote.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
        },
        sentiment: Sentiment {
            score: remote.sentiment_score.unwrap_or(0.0).clamp(-1.0, 1.0),
            label: remote
                .sentiment
                .as_deref()
                .and_then(SentimentLabel::parse)
                .unwrap_or(SentimentLabel::Neutral),
        },
        keywords: remote.keywords,
        entities: remote.entities,
        recommended_actions: Vec::new(),
        escalate: remote.escalate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use triage_core::UrgencyLevel;

    #[test]
    fn test_parse_summary_plain_json() {
        let summary = parse_summary(
            r#"{"symptoms":["migraine"],"duration":"2 days","riskLevel":"Medium",
                "suggestedPriority":"high","recommendations":["rest"]}"#,
        )
        .unwrap();

        assert_eq!(summary.symptoms, vec!["migraine"]);
        assert_eq!(summary.duration, "2 days");
        assert_eq!(summary.risk_level, RiskLevel::Medium);
        assert_eq!(summary.suggested_priority, Priority::High);
    }

    #[test]
    fn test_parse_summary_fenced_json() {
        let text = "```json\n{\"riskLevel\":\"low\",\"suggestedPriority\":\"low\"}\n```";
        let summary = parse_summary(text).unwrap();

        assert!(summary.symptoms.is_empty());
        assert_eq!(summary.duration, "unknown");
        assert_eq!(summary.suggested_priority, Priority::Low);
    }

    #[test]
    fn test_parse_summary_rejects_prose() {
        let result = parse_summary("I think the patient should rest.");
        assert!(matches!(result, Err(TriageError::MalformedResponse(_))));
    }

    #[test]
    fn test_parse_summary_rejects_unknown_priority() {
        let result = parse_summary(r#"{"riskLevel":"low","suggestedPriority":"asap"}"#);
        assert!(matches!(result, Err(TriageError::MalformedResponse(_))));
    }

    #[test]
    fn test_parse_analysis_defaults() {
        let analysis = parse_analysis(
            r#"{"intent":"Symptom-Check","urgency":"critical","keywords":["rash"],
                "entities":[{"type":"symptom","value":"rash"}],"sentiment":"negative",
                "sentimentScore":-3.0,"escalate":true}"#,
        )
        .unwrap();

        assert_eq!(analysis.intent, "symptom-check");
        assert_eq!(analysis.urgency.level, ChatUrgency::Critical);
        assert_eq!(analysis.urgency.confidence, 0.5);
        assert_eq!(analysis.sentiment.label, SentimentLabel::Negative);
        assert_eq!(analysis.sentiment.score, -1.0);
        assert_eq!(analysis.entities.len(), 1);
        assert!(analysis.escalate);
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("  {\"a\":1} "), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{\"a\":1}\n```"), "{\"a\":1}");
    }

    #[test]
    fn test_new_requires_api_key() {
        let result = OpenAiTriage::new(OpenAiTriageConfig::default());
        assert!(matches!(result, Err(TriageError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_unreachable_api_is_an_error() {
        let config = OpenAiTriageConfig::builder()
            .api_key("test-key")
            .api_url("http://127.0.0.1:9")
            .timeout(Duration::from_secs(2))
            .build();
        let triage = OpenAiTriage::new(config).unwrap();

        let result = triage
            .summarize(&ConcernContext::new("cough", UrgencyLevel::Low))
            .await;
        assert!(matches!(
            result,
            Err(TriageError::Network(_)) | Err(TriageError::Timeout)
        ));

        let result = triage.reply("hello").await;
        assert!(result.is_err());
    }
}
