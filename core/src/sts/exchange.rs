//! Token exchange pipeline
//!
//! Extract -> verify (against cached discovery keys) -> On-Behalf-Of exchange.
//! Each stage short-circuits on failure; nothing is exchanged unless every
//! check passed.

use std::time::Duration;
use tracing::{debug, error, warn};

use super::extract::extract_bearer;
use super::response::{respond, GatewayResponse};
use crate::config::{Config, DISCOVERY_CACHE_TTL_SECS, DISCOVERY_MIN_REFRESH_SECS, HTTP_TIMEOUT_SECS};
use crate::error::{ApiError, RejectReason, Result};
use crate::obo::{ConfidentialClient, ExchangedToken};
use crate::oidc::{verify, DiscoveryCache, ValidationContext, Verdict, VerifiedToken};
use crate::platform::{Clock, Environment, HttpClient};

/// Process-wide state: configuration, confidential client and discovery cache
pub struct Gateway {
    setup: std::result::Result<Setup, ApiError>,
    discovery: DiscoveryCache,
}

struct Setup {
    config: Config,
    client: ConfidentialClient,
}

impl Gateway {
    /// Build the gateway from loaded configuration
    ///
    /// A configuration error does not prevent construction; every request is
    /// answered with `Misconfigured` instead.
    pub fn new(config: Result<Config>) -> Self {
        let (ttl_secs, min_refresh_secs, timeout) = match &config {
            Ok(c) => (c.discovery_ttl_secs, c.discovery_min_refresh_secs, c.http_timeout),
            Err(_) => (
                DISCOVERY_CACHE_TTL_SECS,
                DISCOVERY_MIN_REFRESH_SECS,
                Duration::from_secs(HTTP_TIMEOUT_SECS),
            ),
        };

        let setup = config.map(|config| Setup {
            client: ConfidentialClient::from_config(&config),
            config,
        });

        if let Err(err) = &setup {
            error!(error = %err, "gateway configuration is incomplete; requests will be refused");
        }

        Self {
            setup,
            discovery: DiscoveryCache::new(ttl_secs, min_refresh_secs, timeout),
        }
    }

    pub fn from_env(env: &dyn Environment) -> Self {
        Self::new(Config::from_env(env))
    }

    /// Loaded configuration, or the reason it could not be loaded
    pub fn config(&self) -> Result<&Config> {
        self.setup.as_ref().map(|s| &s.config).map_err(Clone::clone)
    }

    /// Run the pipeline and format its outcome
    pub async fn respond(
        &self,
        headers: &[(&str, &str)],
        http: &dyn HttpClient,
        clock: &dyn Clock,
    ) -> GatewayResponse {
        respond(self.handle(headers, http, clock).await)
    }

    /// Run the pipeline for one request
    pub async fn handle(
        &self,
        headers: &[(&str, &str)],
        http: &dyn HttpClient,
        clock: &dyn Clock,
    ) -> Result<ExchangedToken> {
        let setup = self.setup.as_ref().map_err(Clone::clone)?;

        let token = extract_bearer(headers)?;

        let verified = self.verify_token(&token, &setup.config, http, clock).await?;
        debug!(subject = verified.subject().unwrap_or("-"), kid = %verified.kid, "inbound token verified");

        setup
            .client
            .exchange(&verified, &setup.config.downstream_scopes, http, clock)
            .await
    }

    /// Verify against the cached key set, re-fetching once on an unknown key id
    ///
    /// The re-fetch is throttled by the discovery cache, so a stream of tokens
    /// with unknown key ids cannot drive one issuer round trip per request.
    async fn verify_token(
        &self,
        token: &str,
        config: &Config,
        http: &dyn HttpClient,
        clock: &dyn Clock,
    ) -> Result<VerifiedToken> {
        let document = self.discovery.get(&config.issuer, http, clock).await?;
        let ctx = ValidationContext::from_config(config, &document);

        match verify(token, &ctx, clock.now_secs())? {
            Verdict::Rejected(RejectReason::UnknownKey) => {
                debug!(issuer = %config.issuer, "unknown signing key, refreshing discovery document");
                let document = self.discovery.refresh(&config.issuer, http, clock).await?;
                let ctx = ValidationContext::from_config(config, &document);

                match verify(token, &ctx, clock.now_secs())? {
                    Verdict::Rejected(RejectReason::UnknownKey) => {
                        warn!(issuer = %config.issuer, "signing key still unknown after refresh");
                        Err(ApiError::Rejected(RejectReason::Signature))
                    }
                    verdict => verdict.into_result(),
                }
            }
            verdict => verdict.into_result(),
        }
    }
}
