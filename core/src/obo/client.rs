//! Confidential client performing the OAuth2 On-Behalf-Of grant
//!
//! Trades a verified inbound token for an access token to a downstream API.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{ApiError, Result};
use crate::oidc::VerifiedToken;
use crate::platform::{with_timeout, Clock, HttpClient};

/// Grant type of the OBO request (RFC 7523 assertion grant)
pub const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Lifetime assumed when the provider omits `expires_in`
const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;

/// Provider error codes meaning the user or tenant refused this exchange
const DENIAL_CODES: &[&str] = &["invalid_grant", "interaction_required", "consent_required"];

/// Gateway identity at the identity provider, built once per process
pub struct ConfidentialClient {
    client_id: String,
    client_secret: String,
    token_endpoint: String,
    timeout: Duration,
}

impl fmt::Debug for ConfidentialClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfidentialClient")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("token_endpoint", &self.token_endpoint)
            .finish()
    }
}

/// Access token issued for the downstream resource
#[derive(Clone)]
pub struct ExchangedToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub expires_at: DateTime<Utc>,
    pub scopes: Vec<String>,
}

impl fmt::Debug for ExchangedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangedToken")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Token endpoint success body
#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    /// Some endpoints send this as a string
    #[serde(default)]
    expires_in: Option<serde_json::Value>,
    #[serde(default)]
    scope: Option<String>,
}

/// Token endpoint error body (RFC 6749 section 5.2)
#[derive(Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    suberror: Option<String>,
}

impl ConfidentialClient {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        token_endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_endpoint: token_endpoint.into(),
            timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.client_id.clone(),
            config.client_secret.clone(),
            config.token_endpoint(),
            config.http_timeout,
        )
    }

    /// Exchange `token` for an access token carrying `scopes`
    pub async fn exchange(
        &self,
        token: &VerifiedToken,
        scopes: &[String],
        http: &dyn HttpClient,
        clock: &dyn Clock,
    ) -> Result<ExchangedToken> {
        let body = self.request_body(&token.raw, scopes);
        let headers = [
            ("Content-Type", "application/x-www-form-urlencoded"),
            ("Accept", "application/json"),
            ("User-Agent", "obo-gateway"),
        ];

        let response = with_timeout(self.timeout, http.post(&self.token_endpoint, &headers, body.as_bytes()))
            .await
            .map_err(|_| ApiError::transient("token endpoint timed out"))?
            .map_err(|e| match e {
                ApiError::Transient { .. } => e,
                other => ApiError::transient(format!("failed to call token endpoint: {}", other)),
            })?;

        if !response.is_success() {
            return Err(classify_error(response.status, &response.body));
        }

        let parsed: TokenResponse = response
            .json()
            .map_err(|e| ApiError::exchange_failed("invalid_response", format!("failed to parse token response: {}", e)))?;

        let access_token = match parsed.access_token {
            Some(t) if !t.is_empty() => t,
            _ => {
                return Err(ApiError::exchange_failed(
                    "empty_token",
                    "token endpoint returned no access token",
                ))
            }
        };

        let expires_in = parsed
            .expires_in
            .as_ref()
            .and_then(parse_expires_in)
            .unwrap_or(DEFAULT_EXPIRES_IN_SECS);
        let expires_at = expires_at(clock.now_secs(), expires_in);
        let scopes = match parsed.scope {
            Some(scope) => scope.split_whitespace().map(str::to_string).collect(),
            None => scopes.to_vec(),
        };

        info!(
            subject = token.subject().unwrap_or("-"),
            scopes = ?scopes,
            expires_in,
            "on-behalf-of exchange succeeded"
        );

        Ok(ExchangedToken {
            access_token,
            token_type: parsed.token_type.unwrap_or_else(|| "Bearer".to_string()),
            expires_in,
            expires_at,
            scopes,
        })
    }

    fn request_body(&self, assertion: &str, scopes: &[String]) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .append_pair("grant_type", JWT_BEARER_GRANT)
            .append_pair("client_id", &self.client_id)
            .append_pair("client_secret", &self.client_secret)
            .append_pair("assertion", assertion)
            .append_pair("scope", &scopes.join(" "))
            .append_pair("requested_token_use", "on_behalf_of")
            .finish()
    }
}

/// Map a non-2xx token endpoint response to the failure taxonomy
fn classify_error(status: u16, body: &[u8]) -> ApiError {
    let parsed: Option<TokenErrorResponse> = serde_json::from_slice(body).ok();

    let err = match parsed {
        Some(err) => {
            let description = err.error_description.unwrap_or_default();
            let denied = DENIAL_CODES.contains(&err.error.as_str())
                || err.suberror.as_deref().is_some_and(|s| DENIAL_CODES.contains(&s));

            if denied {
                ApiError::exchange_denied(err.error, description)
            } else if err.error == "temporarily_unavailable" {
                ApiError::transient(format!("{}: {}", err.error, description))
            } else {
                ApiError::exchange_failed(err.error, description)
            }
        }
        None if status >= 500 => ApiError::transient(format!("token endpoint returned HTTP {}", status)),
        None => ApiError::exchange_failed(
            format!("http_{}", status),
            String::from_utf8_lossy(body).chars().take(200).collect::<String>(),
        ),
    };

    warn!(status, error = %err, "on-behalf-of exchange failed");
    err
}

fn parse_expires_in(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn expires_at(now_secs: u64, expires_in: u64) -> DateTime<Utc> {
    let secs = now_secs.saturating_add(expires_in).min(i64::MAX as u64) as i64;
    DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
}
