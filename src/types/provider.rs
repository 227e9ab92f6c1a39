//! Provider identity and credentials.

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Closed set of supported vendors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderId {
    /// OpenAI Responses API.
    #[serde(rename = "openai")]
    OpenAi,
    /// Any server speaking the OpenAI Chat Completions dialect (DeepSeek, Groq, Ollama, ...).
    #[serde(rename = "openai-compatible")]
    OpenAiCompatible,
    /// Anthropic Messages API.
    #[serde(rename = "anthropic")]
    Anthropic,
    /// Google Gemini generateContent API.
    #[serde(rename = "gemini")]
    Gemini,
}

impl ProviderId {
    pub const ALL: [ProviderId; 4] = [
        ProviderId::OpenAi,
        ProviderId::OpenAiCompatible,
        ProviderId::Anthropic,
        ProviderId::Gemini,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            ProviderId::OpenAi => "openai",
            ProviderId::OpenAiCompatible => "openai-compatible",
            ProviderId::Anthropic => "anthropic",
            ProviderId::Gemini => "gemini",
        }
    }

    /// Human-facing vendor name, used in configuration error messages.
    pub fn vendor_name(&self) -> &'static str {
        match self {
            ProviderId::OpenAi => "OpenAI",
            ProviderId::OpenAiCompatible => "OpenAI-compatible",
            ProviderId::Anthropic => "Anthropic",
            ProviderId::Gemini => "Gemini",
        }
    }

    /// Prefix of the `<PREFIX>_API_KEY` / `_BASE_URL` / `_MODEL` variables.
    pub fn env_prefix(&self) -> &'static str {
        match self {
            ProviderId::OpenAi => "OPENAI",
            ProviderId::OpenAiCompatible => "OPENAI_COMPATIBLE",
            ProviderId::Anthropic => "ANTHROPIC",
            ProviderId::Gemini => "GEMINI",
        }
    }

    pub fn default_base_url(&self) -> Option<&'static str> {
        match self {
            ProviderId::OpenAi => Some("https://api.openai.com/v1"),
            ProviderId::OpenAiCompatible => None,
            ProviderId::Anthropic => Some("https://api.anthropic.com/v1"),
            ProviderId::Gemini => Some("https://generativelanguage.googleapis.com/v1beta"),
        }
    }

    /// Built-in model used when neither the request nor the env names one.
    ///
    /// OpenAI-compatible servers host arbitrary models, so there is no safe default.
    pub fn builtin_model(&self) -> Option<&'static str> {
        match self {
            ProviderId::OpenAi => Some("gpt-4o-mini"),
            ProviderId::OpenAiCompatible => None,
            ProviderId::Anthropic => Some("claude-3-5-haiku-latest"),
            ProviderId::Gemini => Some("gemini-1.5-flash"),
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for ProviderId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ProviderId::ALL
            .into_iter()
            .find(|p| p.id() == wanted)
            .ok_or_else(|| Error::unsupported_provider(s))
    }
}

/// Credentials and overrides for one provider, supplied by an external
/// configuration loader.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderEnv {
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl ProviderEnv {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: None,
            default_model: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    /// Read `<PREFIX>_API_KEY`, `<PREFIX>_BASE_URL` and `<PREFIX>_MODEL`.
    ///
    /// Returns `None` when no non-empty key is set.
    pub fn from_env(provider: ProviderId) -> Option<Self> {
        let read = |suffix: &str| {
            env::var(format!("{}_{}", provider.env_prefix(), suffix))
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let api_key = read("API_KEY")?;
        Some(Self {
            api_key,
            base_url: read("BASE_URL"),
            default_model: read("MODEL"),
        })
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

impl fmt::Debug for ProviderEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderEnv")
            .field("api_key", &if self.has_api_key() { "<redacted>" } else { "<empty>" })
            .field("base_url", &self.base_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}
