//! 连通性探测模块：在限定时间内发起最小调用以校验凭据。
//!
//! # Connectivity Prober
//!
//! Issues the cheapest real call a provider accepts and races it against a
//! timer. The timer wins ties: once it fires, the call is cancelled through
//! its token and whatever it later reports is discarded.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::drivers::{create_driver, ProviderDriver};
use crate::error::Error;
use crate::normalize::{normalize, ErrorKind, NormalizedError};
use crate::types::{ProviderEnv, ProviderId};

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(8000);

/// Message of the error returned when a probe runs out of time.
pub const PROBE_TIMEOUT_MESSAGE: &str =
    "Connection check timed out. Verify the API key and base URL, then try again.";

pub type ProbeResult = std::result::Result<(), Arc<NormalizedError>>;

/// The fixed timeout error: kind `Timeout`, no code.
pub fn timeout_error() -> Arc<NormalizedError> {
    Arc::new(NormalizedError::new(ErrorKind::Timeout, PROBE_TIMEOUT_MESSAGE))
}

/// Race `call` against `timeout`.
///
/// `call` receives the token it must honour; the token is cancelled when the
/// timer fires first.
pub async fn probe_with<F, Fut>(call: F, timeout: Duration) -> ProbeResult
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = ProbeResult>,
{
    let token = CancellationToken::new();
    let started = Instant::now();
    let call = call(token.clone());

    tokio::select! {
        biased;
        _ = tokio::time::sleep(timeout) => {
            token.cancel();
            warn!(timeout_ms = timeout.as_millis() as u64, "connection check timed out");
            Err(timeout_error())
        }
        outcome = call => {
            let duration_ms = started.elapsed().as_millis() as u64;
            match outcome {
                Ok(()) => {
                    debug!(duration_ms, "connection check succeeded");
                    Ok(())
                }
                Err(e) => {
                    debug!(duration_ms, error = %e, "connection check failed");
                    Err(normalize(e, "connection check failed"))
                }
            }
        }
    }
}

/// Probe an already-built driver.
pub async fn probe(driver: &dyn ProviderDriver, timeout: Duration) -> ProbeResult {
    probe_with(|token| driver.ping(token), timeout).await
}

/// Build the driver for `provider_id` from `env` and probe it. Configuration
/// errors come back normalized, with kind `Configuration`.
pub async fn probe_env(provider_id: ProviderId, env: ProviderEnv, timeout: Duration) -> ProbeResult {
    let driver = create_driver(provider_id, env).map_err(Error::normalized)?;
    probe(driver.as_ref(), timeout).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[tokio::test]
    async fn never_resolving_call_times_out_with_fixed_message() {
        let seen: Arc<Mutex<Option<CancellationToken>>> = Arc::default();
        let slot = seen.clone();
        let started = Instant::now();
        let err = probe_with(
            move |token| {
                *slot.lock().unwrap() = Some(token);
                std::future::pending::<ProbeResult>()
            },
            Duration::from_millis(10),
        )
        .await
        .unwrap_err();

        assert_eq!(err.message(), PROBE_TIMEOUT_MESSAGE);
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(err.code(), None);
        assert!(started.elapsed() < Duration::from_millis(500));
        assert!(seen.lock().unwrap().as_ref().unwrap().is_cancelled());
    }

    #[tokio::test]
    async fn late_vendor_failure_is_discarded() {
        let err = probe_with(
            |_| async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Err(Arc::new(NormalizedError::new(ErrorKind::Provider, "invalid api key")))
            },
            Duration::from_millis(10),
        )
        .await
        .unwrap_err();
        assert_eq!(err.message(), PROBE_TIMEOUT_MESSAGE);
    }

    #[tokio::test]
    async fn early_failure_propagates_same_error() {
        let vendor = Arc::new(NormalizedError::coded(
            ErrorKind::Provider,
            "authentication",
            "invalid x-api-key",
        ));
        let expected = vendor.clone();
        let err = probe_with(move |_| async move { Err(vendor) }, DEFAULT_PROBE_TIMEOUT)
            .await
            .unwrap_err();
        assert!(Arc::ptr_eq(&err, &expected));
    }

    #[tokio::test]
    async fn success_before_timeout() {
        let out = probe_with(|_| async { Ok(()) }, Duration::from_millis(50)).await;
        assert!(out.is_ok());
    }

    #[tokio::test]
    async fn missing_key_is_a_configuration_failure() {
        let err = probe_env(ProviderId::Anthropic, ProviderEnv::new(""), DEFAULT_PROBE_TIMEOUT)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.message().contains("Missing Anthropic API key"));
    }
}
