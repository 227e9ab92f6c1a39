use crate::error::{Error, ErrorContext};
use crate::normalize::RawFault;
use crate::{BoxStream, FaultResult, Result};
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::Proxy;
use serde_json::Value;
use std::env;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// One streaming POST.
#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Value,
}

impl StreamRequest {
    pub fn new(url: Url, body: Value) -> Self {
        Self {
            url,
            headers: HeaderMap::new(),
            body,
        }
    }

    /// Add a header. Values that are not valid header text are skipped.
    pub fn header(mut self, name: &'static str, value: &str) -> Self {
        match HeaderValue::from_str(value) {
            Ok(v) => {
                self.headers.insert(name, v);
            }
            Err(_) => warn!(header = name, "skipping header with invalid value"),
        }
        self
    }
}

/// Shared reqwest client bound to one vendor base URL.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self::with_client(Self::build_client()?, parse_base_url(base_url)?))
    }

    pub fn with_client(client: reqwest::Client, base_url: Url) -> Self {
        Self { client, base_url }
    }

    /// Build a client from env-overridable defaults.
    ///
    /// No total request timeout: a session runs until the vendor stream ends,
    /// fails, or is cancelled.
    pub fn build_client() -> Result<reqwest::Client> {
        let connect_secs = env_parse::<u64>("AI_HTTP_CONNECT_TIMEOUT_SECS").unwrap_or(10);

        let mut builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(connect_secs))
            .pool_max_idle_per_host(env_parse("AI_HTTP_POOL_MAX_IDLE_PER_HOST").unwrap_or(32))
            .pool_idle_timeout(Some(Duration::from_secs(
                env_parse("AI_HTTP_POOL_IDLE_TIMEOUT_SECS").unwrap_or(90),
            )))
            .http2_adaptive_window(true)
            .http2_keep_alive_interval(Some(Duration::from_secs(30)))
            .http2_keep_alive_timeout(Duration::from_secs(10));

        if let Ok(proxy_url) = env::var("AI_PROXY_URL") {
            match Proxy::all(&proxy_url) {
                Ok(proxy) => builder = builder.proxy(proxy),
                Err(e) => warn!(error = %e, "ignoring invalid AI_PROXY_URL"),
            }
        }

        builder
            .build()
            .map_err(|e| Error::Transport(TransportError::from(e)))
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve `path` (may carry a query) against the base URL.
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| {
                Error::configuration_with_context(
                    format!("cannot build endpoint URL from '{}': {}", path, e),
                    ErrorContext::new()
                        .with_field_path("env.base_url")
                        .with_details(self.base_url.to_string()),
                )
            })
    }

    /// POST `request` and hand back the response body as a byte stream.
    ///
    /// A non-success status is read to the end and returned as
    /// [`RawFault::Http`]. So is a success whose content type is not
    /// `text/event-stream`; a JSON body there becomes [`RawFault::Json`].
    /// Cancelling `cancel` aborts the send and ends the
    /// body stream.
    pub async fn open_stream(
        &self,
        request: StreamRequest,
        cancel: CancellationToken,
    ) -> FaultResult<BoxStream<'static, Bytes>> {
        let started = Instant::now();
        let send = self
            .client
            .post(request.url.clone())
            .headers(request.headers)
            .header(ACCEPT, "text/event-stream")
            .json(&request.body)
            .send();

        let resp = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RawFault::Cancelled),
            r = send => r?,
        };

        let status = resp.status();
        if !status.is_success() {
            let body = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RawFault::Cancelled),
                b = resp.text() => b.unwrap_or_default(),
            };
            info!(
                http_status = status.as_u16(),
                duration_ms = started.elapsed().as_millis() as u64,
                url = %request.url,
                "vendor request rejected"
            );
            return Err(RawFault::Http {
                status: status.as_u16(),
                body,
            });
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_ascii_lowercase);
        if let Some(content_type) = content_type.filter(|ct| !ct.contains("text/event-stream")) {
            let body = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RawFault::Cancelled),
                b = resp.text() => b.unwrap_or_default(),
            };
            info!(
                http_status = status.as_u16(),
                content_type = %content_type,
                duration_ms = started.elapsed().as_millis() as u64,
                url = %request.url,
                "vendor answered without an event stream"
            );
            return Err(non_stream_fault(status.as_u16(), body));
        }

        debug!(
            http_status = status.as_u16(),
            duration_ms = started.elapsed().as_millis() as u64,
            "vendor stream opened"
        );

        let byte_stream = resp
            .bytes_stream()
            .map_err(RawFault::from)
            .take_until(cancel.cancelled_owned());
        Ok(Box::pin(byte_stream))
    }
}

/// A 2xx body that is not an event stream. Gateways put error objects there.
fn non_stream_fault(status: u16, body: String) -> RawFault {
    match serde_json::from_str::<Value>(body.trim()) {
        Ok(v @ Value::Object(_)) => RawFault::Json(v),
        _ => RawFault::Http { status, body },
    }
}

/// Validate a base URL and give it a trailing slash so relative joins append.
pub fn parse_base_url(raw: &str) -> Result<Url> {
    let invalid = |details: String| {
        Error::configuration_with_context(
            format!("invalid base URL '{}'", raw),
            ErrorContext::new()
                .with_field_path("env.base_url")
                .with_details(details),
        )
    };
    let mut url = Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gets_trailing_slash() {
        let url = parse_base_url("https://api.openai.com/v1").unwrap();
        assert_eq!(url.as_str(), "https://api.openai.com/v1/");
        let t = HttpTransport::with_client(reqwest::Client::new(), url);
        assert_eq!(
            t.endpoint("/responses").unwrap().as_str(),
            "https://api.openai.com/v1/responses"
        );
    }

    #[test]
    fn endpoint_keeps_query_and_colon_path() {
        let t = HttpTransport::with_client(
            reqwest::Client::new(),
            parse_base_url("https://generativelanguage.googleapis.com/v1beta").unwrap(),
        );
        let url = t
            .endpoint("models/gemini-1.5-flash:streamGenerateContent?alt=sse")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:streamGenerateContent?alt=sse"
        );
    }

    #[test]
    fn non_stream_body_keeps_vendor_error() {
        let fault = non_stream_fault(
            200,
            r#" {"error":{"code":"model_not_found","message":"no such model"}} "#.into(),
        );
        assert!(matches!(fault, RawFault::Json(_)));

        let page = non_stream_fault(200, "<html>gateway login</html>".into());
        assert!(matches!(page, RawFault::Http { status: 200, ref body } if body.contains("login")));
    }

    #[test]
    fn rejects_non_http_base_url() {
        let err = parse_base_url("ftp://example.com").unwrap_err();
        assert!(err.is_configuration());
        let err = parse_base_url("not a url").unwrap_err();
        assert!(err.message().contains("invalid base URL"));
    }

    #[tokio::test]
    async fn cancelled_before_send_returns_cancelled() {
        let t = HttpTransport::with_client(
            reqwest::Client::new(),
            parse_base_url("http://127.0.0.1:9").unwrap(),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();
        let req = StreamRequest::new(t.endpoint("x").unwrap(), serde_json::json!({}));
        let out = t.open_stream(req, cancel).await;
        assert!(matches!(out, Err(RawFault::Cancelled)));
    }
}
