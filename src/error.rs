use crate::normalize::{self, ErrorKind, NormalizedError, RawFault};
use crate::transport::TransportError;
use crate::types::ProviderId;
use std::sync::Arc;
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "env.api_key", "request.model")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected value, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "session_runner", "openai_driver")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors raised synchronously, before a chunk stream exists.
///
/// Runtime faults never surface here; they arrive as `error` chunks.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Network transport error: {0}")]
    Transport(#[from] TransportError),
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Error::Configuration {
            message: msg.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// `Missing <Vendor> API key`, raised when an adapter is built without credentials.
    pub fn missing_api_key(provider: ProviderId) -> Self {
        Self::configuration_with_context(
            format!("Missing {} API key", provider.vendor_name()),
            ErrorContext::new()
                .with_field_path("env.api_key")
                .with_source(provider.id()),
        )
    }

    pub fn missing_model(provider: ProviderId) -> Self {
        Self::configuration_with_context(
            format!(
                "No model for {}: set one on the request or via {}_MODEL",
                provider.vendor_name(),
                provider.env_prefix()
            ),
            ErrorContext::new()
                .with_field_path("request.model")
                .with_source(provider.id()),
        )
    }

    pub fn provider_mismatch(bound: ProviderId, requested: ProviderId) -> Self {
        Self::configuration_with_context(
            format!(
                "provider mismatch: binding serves '{}' but the request targets '{}'",
                bound, requested
            ),
            ErrorContext::new()
                .with_field_path("request.provider_id")
                .with_source("session_runner"),
        )
    }

    pub fn unsupported_provider(id: &str) -> Self {
        Self::configuration_with_context(
            format!("unsupported provider '{}'", id),
            ErrorContext::new().with_field_path("provider_id"),
        )
    }

    /// The bare message for configuration errors, the display string otherwise.
    pub fn message(&self) -> String {
        match self {
            Error::Configuration { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. } => Some(context),
            _ => None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration { .. } => ErrorKind::Configuration,
            Error::Transport(_) => ErrorKind::Transport,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration { .. })
    }

    /// Pass this error through the normalizer, for callers that render every
    /// failure the same way.
    pub fn normalized(self) -> Arc<NormalizedError> {
        let fallback = self.message();
        normalize::normalize(RawFault::from(self), &fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_message_names_vendor() {
        let err = Error::missing_api_key(ProviderId::Anthropic);
        assert_eq!(err.message(), "Missing Anthropic API key");
        assert!(err.to_string().contains("Missing Anthropic API key"));
        assert!(err.to_string().contains("field: env.api_key"));
    }

    #[test]
    fn configuration_errors_normalize_with_configuration_kind() {
        let n = Error::missing_api_key(ProviderId::Gemini).normalized();
        assert_eq!(n.kind(), ErrorKind::Configuration);
        assert!(n.message().contains("Missing Gemini API key"));
    }
}
