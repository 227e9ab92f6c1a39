//! 标准错误类别：在厂商响应未携带错误码时，按 HTTP 状态推导一个稳定的错误码。
//!
//! Standard error classes.
//!
//! Vendors do not always put a machine-readable code in their error bodies.
//! When they don't, the normalizer names the failure after the HTTP status
//! using the classes below, so `error` chunks still carry a stable code.
//!
//! ## Example
//!
//! ```rust
//! use ai_chat_stream::error_code::StandardErrorCode;
//!
//! let code = StandardErrorCode::from_http_status(429);
//! assert_eq!(code.name(), "rate_limited");
//! ```

use std::fmt;

/// Canonical error class derived from an HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardErrorCode {
    /// Malformed request, invalid parameters, or missing required fields
    InvalidRequest,
    /// Invalid, expired, or missing API key
    Authentication,
    /// Valid credentials but insufficient permissions
    PermissionDenied,
    /// Requested model, endpoint, or resource does not exist
    NotFound,
    /// Input exceeds context window or API payload size limit
    RequestTooLarge,
    /// Request rate limit exceeded
    RateLimited,
    /// Internal server error on provider side
    ServerError,
    /// Provider service temporarily overloaded
    Overloaded,
    /// Request timed out before response received
    Timeout,
    /// State conflict (e.g., concurrent modification)
    Conflict,
    /// Error could not be classified
    Unknown,
}

impl StandardErrorCode {
    /// Returns the standard name (e.g., `"invalid_request"`).
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::Authentication => "authentication",
            Self::PermissionDenied => "permission_denied",
            Self::NotFound => "not_found",
            Self::RequestTooLarge => "request_too_large",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::Overloaded => "overloaded",
            Self::Timeout => "timeout",
            Self::Conflict => "conflict",
            Self::Unknown => "unknown",
        }
    }

    /// Maps an HTTP status code to the most likely class.
    ///
    /// Status codes without a standard mapping return `StandardErrorCode::Unknown`.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            400 => Self::InvalidRequest,
            401 => Self::Authentication,
            403 => Self::PermissionDenied,
            404 => Self::NotFound,
            408 => Self::Timeout,
            409 => Self::Conflict,
            413 => Self::RequestTooLarge,
            429 => Self::RateLimited,
            500 => Self::ServerError,
            503 => Self::Overloaded,
            504 => Self::Timeout,
            529 => Self::Overloaded, // Anthropic overloaded; non-standard but commonly used
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for StandardErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
