//! Native platform implementations
//!
//! Implements core platform traits using native Rust libraries:
//! - HttpClient: reqwest with a per-request timeout
//! - Clock: std::time::SystemTime
//! - Environment: process environment variables

use async_trait::async_trait;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use obo_gateway_core::error::{ApiError, Result};
use obo_gateway_core::platform::{Clock, Environment, HttpClient, HttpResponse};

/// reqwest-based HTTP client
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::internal(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    async fn send(&self, builder: reqwest::RequestBuilder, headers: &[(&str, &str)]) -> Result<HttpResponse> {
        let mut builder = builder;
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }

        let response = builder.send().await.map_err(transport_error)?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(transport_error)?
            .to_vec();

        Ok(HttpResponse { status, body })
    }
}

/// Every transport-level failure is worth retrying by the caller
fn transport_error(e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::transient(format!("request timed out: {}", e))
    } else {
        ApiError::transient(format!("request failed: {}", e))
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<HttpResponse> {
        self.send(self.client.get(url), headers).await
    }

    async fn post(&self, url: &str, headers: &[(&str, &str)], body: &[u8]) -> Result<HttpResponse> {
        self.send(self.client.post(url).body(body.to_vec()), headers).await
    }
}

/// System clock using std::time
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs()
    }
}

/// Configuration from process environment variables
///
/// Secrets are expected to be injected as environment variables by the
/// hosting platform (Key Vault references, Kubernetes secrets, etc.).
pub struct ProcessEnv;

impl Environment for ProcessEnv {
    fn get_var(&self, name: &str) -> Result<String> {
        std::env::var(name)
            .map_err(|_| ApiError::misconfigured(format!("environment variable '{}' not set", name)))
    }

    fn get_secret(&self, name: &str) -> Result<String> {
        std::env::var(name)
            .map_err(|_| ApiError::misconfigured(format!("secret '{}' not found in environment", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_after_2024() {
        assert!(SystemClock.now_secs() > 1_704_067_200);
    }

    #[test]
    fn test_missing_variable_is_misconfigured() {
        let err = ProcessEnv
            .get_var("OBO_GATEWAY_TEST_SURELY_UNSET_VARIABLE")
            .unwrap_err();
        assert!(matches!(err, ApiError::Misconfigured { .. }));
    }
}
