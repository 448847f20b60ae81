//! Configuration for OpenAiTriage.

use std::env;
use std::time::Duration;

use triage_core::TriageError;

/// Configuration for OpenAiTriage.
#[derive(Debug, Clone)]
pub struct OpenAiTriageConfig {
    /// API base URL.
    pub api_url: String,

    /// API key for authentication.
    pub api_key: String,

    /// Model name to use.
    pub model: String,

    /// Maximum tokens for the chat response.
    pub max_tokens: Option<u32>,

    /// Temperature for structured (JSON) calls.
    pub temperature: Option<f32>,

    /// HTTP timeout for a single API request.
    pub timeout: Duration,
}

impl Default for OpenAiTriageConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.openai.com".to_string(),
            api_key: String::new(),
            model: "gpt-3.5-turbo".to_string(),
            max_tokens: Some(400),
            temperature: Some(0.2),
            timeout: Duration::from_secs(10),
        }
    }
}

impl OpenAiTriageConfig {
    /// Create configuration from environment variables.
    ///
    /// Required environment variables:
    /// - `OPENAI_API_KEY` - API key for authentication
    ///
    /// Optional environment variables:
    /// - `OPENAI_API_URL` - API URL (default: https://api.openai.com)
    /// - `OPENAI_MODEL` - Model name (default: gpt-3.5-turbo)
    /// - `OPENAI_MAX_TOKENS` - Max tokens (default: 400)
    /// - `OPENAI_TEMPERATURE` - Temperature (default: 0.2)
    ///
    /// The timeout keeps its default; callers that own a timeout setting
    /// override it on the returned config.
    pub fn from_env() -> Result<Self, TriageError> {
        let api_key = env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| TriageError::Configuration("OPENAI_API_KEY not set".to_string()))?;

        let defaults = Self::default();

        let api_url = env::var("OPENAI_API_URL").unwrap_or(defaults.api_url);

        let model = env::var("OPENAI_MODEL").unwrap_or(defaults.model);

        let max_tokens = env::var("OPENAI_MAX_TOKENS")
            .ok()
            .and_then(|v| v.parse().ok())
            .or(defaults.max_tokens);

        let temperature = env::var("OPENAI_TEMPERATURE")
            .ok()
            .and_then(|v| v.parse().ok())
            .or(defaults.temperature);

        Ok(Self {
            api_url,
            api_key,
            model,
            max_tokens,
            temperature,
            timeout: defaults.timeout,
        })
    }

    /// Create a new config builder.
    pub fn builder() -> OpenAiTriageConfigBuilder {
        OpenAiTriageConfigBuilder::default()
    }
}

/// Builder for OpenAiTriageConfig.
#[derive(Debug, Default)]
pub struct OpenAiTriageConfigBuilder {
    config: OpenAiTriageConfig,
}

impl OpenAiTriageConfigBuilder {
    /// Set the API key.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = key.into();
        self
    }

    /// Set the API URL.
    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_url = url.into();
        self
    }

    /// Set the model name.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    /// Set the max tokens.
    pub fn max_tokens(mut self, tokens: u32) -> Self {
        self.config.max_tokens = Some(tokens);
        self
    }

    /// Set the temperature.
    pub fn temperature(mut self, temp: f32) -> Self {
        self.config.temperature = Some(temp);
        self
    }

    /// Set the HTTP timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> OpenAiTriageConfig {
        self.config
    }
}
