//! JWKS (JSON Web Key Set) handling
//!
//! Fetches signing keys from an issuer's `jwks_uri`.

use jsonwebtoken::jwk::JwkSet;
use std::time::Duration;

use crate::error::{ApiError, Result};
use crate::platform::{with_timeout, HttpClient};

/// Fetch JWKS from a URI
pub async fn fetch_jwks(jwks_uri: &str, http: &dyn HttpClient, timeout: Duration) -> Result<JwkSet> {
    let response = with_timeout(
        timeout,
        http.get(
            jwks_uri,
            &[
                ("Accept", "application/json"),
                ("User-Agent", "obo-gateway"),
            ],
        ),
    )
    .await
    .map_err(|_| ApiError::discovery_unavailable("timed out fetching JWKS"))?
    .map_err(|e| ApiError::discovery_unavailable(format!("failed to fetch JWKS: {}", e)))?;

    if response.status != 200 {
        return Err(ApiError::discovery_unavailable(format!(
            "failed to fetch JWKS: HTTP {}",
            response.status
        )));
    }

    let jwks: JwkSet = response
        .json()
        .map_err(|e| ApiError::discovery_unavailable(format!("invalid JWKS: {}", e)))?;

    Ok(jwks)
}
