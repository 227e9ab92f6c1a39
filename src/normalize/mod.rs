//! 错误归一化模块：把各厂商的异构失败形态收敛为统一的错误表示。
//!
//! # Error Normalizer
//!
//! Every fault observed while talking to a provider (an HTTP error body, a
//! nested `{ "error": { ... } }` object, a bare string, a transport fault, a
//! cancellation) is funnelled through [`normalize`] before it becomes the
//! payload of an [`Chunk::Error`](crate::types::Chunk::Error).
//!
//! ## Message rule
//!
//! A [`NormalizedError`] renders as `"<code>: <message>"` when it carries a code
//! that is not already a prefix of the message, otherwise as the message alone.
//!
//! ## Identity
//!
//! Normalizing a value that is already canonical returns the same `Arc`, so the
//! original allocation and its `source()` chain survive for diagnostics.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use crate::error_code::StandardErrorCode;

/// Category of a normalized error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The vendor reported the failure (HTTP error body, in-stream error event).
    Provider,
    /// Connection, TLS or socket failure.
    Transport,
    /// A frame could not be decoded.
    Decode,
    /// A bounded wait expired.
    Timeout,
    /// The caller cancelled the operation.
    Cancelled,
    /// Credentials, model or provider identity were not usable.
    Configuration,
    Unknown,
}

/// The single error shape carried by `error` chunks and probe failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "ErrorRepr", into = "ErrorRepr")]
pub struct NormalizedError {
    kind: ErrorKind,
    message: String,
    code: Option<String>,
    source: Option<Arc<dyn StdError + Send + Sync + 'static>>,
}

impl NormalizedError {
    /// Build an error from a message without a code.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
            source: None,
        }
    }

    /// Build an error whose message already follows the `"<code>: <message>"` rule.
    pub fn coded(kind: ErrorKind, code: impl Into<String>, message: impl AsRef<str>) -> Self {
        let code = code.into();
        Self {
            kind,
            message: compose_message(Some(&code), message.as_ref()),
            code: Some(code),
            source: None,
        }
    }

    /// Attach a machine-readable code without touching the message.
    ///
    /// Values built this way are not guaranteed canonical; [`normalize`] fixes
    /// the message up when it sees one.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_source(mut self, source: Arc<dyn StdError + Send + Sync + 'static>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == ErrorKind::Timeout
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }

    fn has_canonical_message(&self) -> bool {
        match &self.code {
            Some(code) => self.message.starts_with(code.as_str()),
            None => true,
        }
    }
}

impl PartialEq for NormalizedError {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.message == other.message && self.code == other.code
    }
}

impl fmt::Display for NormalizedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for NormalizedError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|s| s.as_ref() as &(dyn StdError + 'static))
    }
}

#[derive(Serialize, Deserialize)]
struct ErrorRepr {
    kind: ErrorKind,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}

impl From<ErrorRepr> for NormalizedError {
    fn from(r: ErrorRepr) -> Self {
        Self {
            kind: r.kind,
            message: r.message,
            code: r.code,
            source: None,
        }
    }
}

impl From<NormalizedError> for ErrorRepr {
    fn from(e: NormalizedError) -> Self {
        Self {
            kind: e.kind,
            message: e.message,
            code: e.code,
        }
    }
}

/// Shapes a fault can arrive in before normalization.
#[derive(Debug, Clone)]
pub enum RawFault {
    /// Already the canonical shape.
    Normalized(Arc<NormalizedError>),
    /// A bare string.
    Text(String),
    /// A structured vendor object, e.g. `{ "code": .., "message": .. }` or
    /// `{ "error": { "code": .., "message": .. } }`.
    Json(Value),
    /// A non-success HTTP response and its body.
    Http { status: u16, body: String },
    /// A native Rust error.
    Native {
        kind: ErrorKind,
        error: Arc<dyn StdError + Send + Sync + 'static>,
    },
    /// The caller's cancellation token fired.
    Cancelled,
}

impl RawFault {
    pub fn native(kind: ErrorKind, error: impl StdError + Send + Sync + 'static) -> Self {
        RawFault::Native {
            kind,
            error: Arc::new(error),
        }
    }
}

impl From<NormalizedError> for RawFault {
    fn from(e: NormalizedError) -> Self {
        RawFault::Normalized(Arc::new(e))
    }
}

impl From<Arc<NormalizedError>> for RawFault {
    fn from(e: Arc<NormalizedError>) -> Self {
        RawFault::Normalized(e)
    }
}

impl From<String> for RawFault {
    fn from(s: String) -> Self {
        RawFault::Text(s)
    }
}

impl From<&str> for RawFault {
    fn from(s: &str) -> Self {
        RawFault::Text(s.to_string())
    }
}

impl From<Value> for RawFault {
    fn from(v: Value) -> Self {
        RawFault::Json(v)
    }
}

impl From<crate::Error> for RawFault {
    fn from(e: crate::Error) -> Self {
        let kind = e.kind();
        RawFault::Native {
            kind,
            error: Arc::new(e),
        }
    }
}

impl From<reqwest::Error> for RawFault {
    fn from(e: reqwest::Error) -> Self {
        RawFault::native(ErrorKind::Transport, e)
    }
}

/// Combine a code and a message: `"<code>: <message>"` unless the message
/// already starts with the code.
pub fn compose_message(code: Option<&str>, message: &str) -> String {
    match code {
        Some(code) if !code.is_empty() && !message.starts_with(code) => {
            format!("{}: {}", code, message)
        }
        _ => message.to_string(),
    }
}

/// Collapse any fault into a [`NormalizedError`]. Never fails.
///
/// `fallback` is used as the message when the fault carries nothing usable.
pub fn normalize(raw: impl Into<RawFault>, fallback: &str) -> Arc<NormalizedError> {
    match raw.into() {
        RawFault::Normalized(err) => {
            if err.has_canonical_message() {
                return err;
            }
            let code = err.code.clone();
            Arc::new(NormalizedError {
                kind: err.kind,
                message: compose_message(code.as_deref(), &err.message),
                code,
                source: Some(err as Arc<dyn StdError + Send + Sync + 'static>),
            })
        }
        RawFault::Text(s) => Arc::new(NormalizedError::new(
            ErrorKind::Unknown,
            non_empty_or(&s, fallback),
        )),
        RawFault::Json(v) => Arc::new(from_json(&v, ErrorKind::Provider, None, fallback)),
        RawFault::Http { status, body } => Arc::new(from_http(status, &body, fallback)),
        RawFault::Native { kind, error } => {
            if let Some(inner) = error.downcast_ref::<NormalizedError>() {
                return normalize(inner.clone(), fallback);
            }
            let message = non_empty_or(&error.to_string(), fallback);
            Arc::new(NormalizedError::new(kind, message).with_source(error))
        }
        RawFault::Cancelled => Arc::new(NormalizedError::coded(
            ErrorKind::Cancelled,
            "cancelled",
            "request cancelled",
        )),
    }
}

fn non_empty_or(s: &str, fallback: &str) -> String {
    let t = s.trim();
    if t.is_empty() {
        fallback.to_string()
    } else {
        t.to_string()
    }
}

fn code_of(v: &Value) -> Option<String> {
    match v.get("code")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn message_of(v: &Value) -> Option<String> {
    v.get("message")
        .and_then(|m| m.as_str())
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(String::from)
}

/// Top-level `code`/`message`, else one level into `error`.
fn extract_fields(v: &Value) -> (Option<String>, Option<String>) {
    let code = code_of(v);
    let message = message_of(v);
    if code.is_some() || message.is_some() {
        return (code, message);
    }
    match v.get("error") {
        Some(nested @ Value::Object(_)) => (code_of(nested), message_of(nested)),
        Some(Value::String(s)) if !s.trim().is_empty() => (None, Some(s.trim().to_string())),
        _ => (None, None),
    }
}

fn from_json(
    v: &Value,
    kind: ErrorKind,
    default_code: Option<String>,
    fallback: &str,
) -> NormalizedError {
    if let Value::String(s) = v {
        return NormalizedError::new(kind, non_empty_or(s, fallback));
    }
    let (code, message) = extract_fields(v);
    let message = message.unwrap_or_else(|| fallback.to_string());
    match code.or(default_code) {
        Some(code) => NormalizedError::coded(kind, code, message),
        None => NormalizedError::new(kind, message),
    }
}

fn from_http(status: u16, body: &str, fallback: &str) -> NormalizedError {
    let class = StandardErrorCode::from_http_status(status);
    let default_code = if class == StandardErrorCode::Unknown {
        format!("http_{}", status)
    } else {
        class.name().to_string()
    };
    let trimmed = body.trim();
    match serde_json::from_str::<Value>(trimmed) {
        Ok(v) => from_json(&v, ErrorKind::Provider, Some(default_code), fallback),
        Err(_) if !trimmed.is_empty() => {
            NormalizedError::coded(ErrorKind::Provider, default_code, trimmed)
        }
        Err(_) => NormalizedError::coded(
            ErrorKind::Provider,
            default_code,
            format!("HTTP {} {}", status, fallback),
        ),
    }
}
