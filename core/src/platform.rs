//! Platform abstraction traits
//!
//! These traits define the boundary between the gateway core and the process
//! hosting it (HTTP client, wall clock, configuration source).

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;

use crate::error::Result;

/// HTTP client for outbound requests (OIDC discovery, token endpoint)
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<HttpResponse>;
    async fn post(&self, url: &str, headers: &[(&str, &str)], body: &[u8]) -> Result<HttpResponse>;
}

/// HTTP response from an outbound request
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Parse body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> std::result::Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Clock for current time (enables testing with deterministic timestamps)
pub trait Clock: Send + Sync {
    fn now_secs(&self) -> u64;
}

/// Environment/secrets access
pub trait Environment {
    fn get_var(&self, name: &str) -> Result<String>;
    fn get_secret(&self, name: &str) -> Result<String>;
}

/// Outcome of a network call raced against its deadline
#[derive(Debug, PartialEq, Eq)]
pub struct Elapsed;

/// Bound an outbound call by `limit`
pub async fn with_timeout<F, T>(limit: Duration, call: F) -> std::result::Result<T, Elapsed>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(limit, call).await.map_err(|_| Elapsed)
}
