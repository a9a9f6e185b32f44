//! Configuration and secrets management

use std::fmt;
use std::time::Duration;

use crate::error::{ApiError, Result};
use crate::platform::Environment;

/// Scope requested for the downstream API when none is configured
pub const DEFAULT_DOWNSTREAM_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Identity provider host used to build the token endpoint
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Discovery document freshness window (1 hour)
pub const DISCOVERY_CACHE_TTL_SECS: u64 = 3600;

/// Minimum age of a discovery document before a key-rotation refresh may replace it (5 minutes)
pub const DISCOVERY_MIN_REFRESH_SECS: u64 = 300;

/// Upper bound for any single outbound call
pub const HTTP_TIMEOUT_SECS: u64 = 10;

/// Allowed drift between our clock and the issuer's (2 minutes)
pub const CLOCK_SKEW_SECS: u64 = 120;

/// Application configuration loaded from environment
#[derive(Clone)]
pub struct Config {
    /// Directory tenant the gateway's client is registered in
    pub tenant_id: String,
    /// Client (application) id of the gateway
    pub client_id: String,
    /// Client secret used to authenticate the OBO request
    pub client_secret: String,
    /// Scopes requested for the downstream resource
    pub downstream_scopes: Vec<String>,
    pub authority_host: String,
    /// Expected `iss` of inbound tokens
    pub issuer: String,
    /// Expected `aud` of inbound tokens
    pub audience: String,
    pub discovery_ttl_secs: u64,
    pub discovery_min_refresh_secs: u64,
    pub http_timeout: Duration,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("downstream_scopes", &self.downstream_scopes)
            .field("authority_host", &self.authority_host)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("discovery_ttl_secs", &self.discovery_ttl_secs)
            .field("discovery_min_refresh_secs", &self.discovery_min_refresh_secs)
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}

impl Config {
    /// Load configuration from platform environment
    ///
    /// Tenant id, client id and client secret are each required; every missing
    /// one is named in the resulting `Misconfigured` error. Each also accepts
    /// its Azure Functions app-setting spelling (`TenantId`, `ClientId`,
    /// `ClientSecret`).
    pub fn from_env(env: &dyn Environment) -> Result<Self> {
        let tenant_id = first_set(&["TENANT_ID", "TenantId"], |name| env.get_var(name));
        let client_id = first_set(&["CLIENT_ID", "ClientId"], |name| env.get_var(name));
        let client_secret = first_set(&["CLIENT_SECRET", "ClientSecret"], |name| env.get_secret(name));

        let (tenant_id, client_id, client_secret) = match (tenant_id, client_id, client_secret) {
            (Some(tenant), Some(client), Some(secret)) => (tenant, client, secret),
            (tenant, client, secret) => {
                let missing: Vec<&str> = [
                    ("TENANT_ID", tenant.is_none()),
                    ("CLIENT_ID", client.is_none()),
                    ("CLIENT_SECRET", secret.is_none()),
                ]
                .into_iter()
                .filter_map(|(name, absent)| absent.then_some(name))
                .collect();
                return Err(ApiError::misconfigured(format!(
                    "required configuration missing: {}",
                    missing.join(", ")
                )));
            }
        };

        let downstream_scopes = match non_empty(env.get_var("DOWNSTREAM_SCOPES").ok()) {
            Some(raw) => parse_scopes(&raw),
            None => vec![DEFAULT_DOWNSTREAM_SCOPE.to_string()],
        };
        if downstream_scopes.is_empty() {
            return Err(ApiError::misconfigured("DOWNSTREAM_SCOPES contains no scopes"));
        }

        let authority_host = non_empty(env.get_var("AUTHORITY_HOST").ok())
            .unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_string())
            .trim_end_matches('/')
            .to_string();

        let issuer = non_empty(env.get_var("TOKEN_ISSUER").ok())
            .unwrap_or_else(|| format!("https://sts.windows.net/{}/", tenant_id));
        let audience = non_empty(env.get_var("TOKEN_AUDIENCE").ok())
            .unwrap_or_else(|| format!("api://{}", client_id));

        let discovery_ttl_secs = parse_secs(env, "DISCOVERY_TTL_SECS", DISCOVERY_CACHE_TTL_SECS)?;
        let discovery_min_refresh_secs =
            parse_secs(env, "DISCOVERY_MIN_REFRESH_SECS", DISCOVERY_MIN_REFRESH_SECS)?.min(discovery_ttl_secs);
        let http_timeout = Duration::from_secs(parse_secs(env, "HTTP_TIMEOUT_SECS", HTTP_TIMEOUT_SECS)?);

        Ok(Self {
            tenant_id,
            client_id,
            client_secret,
            downstream_scopes,
            authority_host,
            issuer,
            audience,
            discovery_ttl_secs,
            discovery_min_refresh_secs,
            http_timeout,
        })
    }

    /// OAuth2 v2.0 token endpoint of the configured tenant
    pub fn token_endpoint(&self) -> String {
        format!("{}/{}/oauth2/v2.0/token", self.authority_host, self.tenant_id)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// First non-blank value among `names`
fn first_set(names: &[&str], get: impl Fn(&str) -> Result<String>) -> Option<String> {
    names.iter().find_map(|name| non_empty(get(name).ok()))
}

/// Split a scope list on commas and whitespace
fn parse_scopes(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_secs(env: &dyn Environment, name: &str, default: u64) -> Result<u64> {
    match non_empty(env.get_var(name).ok()) {
        Some(raw) => raw
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .ok_or_else(|| ApiError::misconfigured(format!("{} must be a positive number of seconds", name))),
        None => Ok(default),
    }
}
