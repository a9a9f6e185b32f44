//! OIDC token validation
//!
//! Verifies an inbound bearer token against the issuer's published signing
//! keys and checks its claims. Expected failures come back as
//! [`Verdict::Rejected`]; `Err` is reserved for broken key material.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::jwk::{AlgorithmParameters, JwkSet};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use super::discovery::DiscoveryDocument;
use crate::config::{Config, CLOCK_SKEW_SECS};
use crate::error::{ApiError, RejectReason, Result};

/// Audience can be a single string or array of strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    #[default]
    None,
    Single(String),
    Multiple(Vec<String>),
}

impl Audience {
    pub fn contains(&self, aud: &str) -> bool {
        match self {
            Audience::None => false,
            Audience::Single(s) => s == aud,
            Audience::Multiple(v) => v.iter().any(|a| a == aud),
        }
    }
}

/// Claims recovered from an inbound token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(default)]
    pub iss: Option<String>,

    #[serde(default)]
    pub aud: Audience,

    #[serde(default)]
    pub exp: Option<u64>,

    #[serde(default)]
    pub nbf: Option<u64>,

    #[serde(default)]
    pub sub: Option<String>,

    /// Additional claims
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// A credential that passed every check
#[derive(Debug, Clone)]
pub struct VerifiedToken {
    /// The token exactly as presented, forwarded as the OBO assertion
    pub raw: String,
    pub kid: String,
    pub algorithm: Algorithm,
    pub claims: TokenClaims,
}

impl VerifiedToken {
    pub fn subject(&self) -> Option<&str> {
        self.claims.sub.as_deref()
    }
}

/// Result of checking a token
#[derive(Debug, Clone)]
pub enum Verdict {
    Valid(VerifiedToken),
    Rejected(RejectReason),
}

impl Verdict {
    pub fn into_result(self) -> Result<VerifiedToken> {
        match self {
            Verdict::Valid(token) => Ok(token),
            Verdict::Rejected(reason) => Err(ApiError::Rejected(reason)),
        }
    }
}

/// Everything a single verification needs; built per request
#[derive(Debug, Clone)]
pub struct ValidationContext {
    pub issuer: String,
    pub audience: String,
    pub clock_skew_secs: u64,
    pub signing_keys: Arc<JwkSet>,
}

impl ValidationContext {
    pub fn new(issuer: impl Into<String>, audience: impl Into<String>, signing_keys: Arc<JwkSet>) -> Self {
        Self {
            issuer: issuer.into(),
            audience: audience.into(),
            clock_skew_secs: CLOCK_SKEW_SECS,
            signing_keys,
        }
    }

    pub fn from_config(config: &Config, document: &DiscoveryDocument) -> Self {
        Self::new(
            config.issuer.clone(),
            config.audience.clone(),
            document.signing_keys.clone(),
        )
    }
}

#[derive(Deserialize)]
struct RawHeader {
    #[serde(default)]
    alg: Option<String>,
}

/// Verify `token` at time `now_secs`
pub fn verify(token: &str, ctx: &ValidationContext, now_secs: u64) -> Result<Verdict> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 || parts[0].is_empty() || parts[1].is_empty() {
        return Ok(Verdict::Rejected(RejectReason::Malformed));
    }

    // Inspect the algorithm ourselves: the JWT library cannot represent `none`
    let raw_header: RawHeader = match base64_url_decode(parts[0])
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
    {
        Some(header) => header,
        None => return Ok(Verdict::Rejected(RejectReason::Malformed)),
    };
    let alg = raw_header.alg.unwrap_or_default();
    if alg.is_empty() || alg.eq_ignore_ascii_case("none") || parts[2].is_empty() {
        return Ok(Verdict::Rejected(RejectReason::Unsigned));
    }

    let header = match decode_header(token) {
        Ok(header) => header,
        Err(_) => return Ok(Verdict::Rejected(RejectReason::Signature)),
    };

    // Discovery keys are public keys; shared-secret algorithms are never acceptable
    if matches!(header.alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
        return Ok(Verdict::Rejected(RejectReason::Signature));
    }

    let kid = match header.kid {
        Some(kid) => kid,
        None => return Ok(Verdict::Rejected(RejectReason::Signature)),
    };

    let jwk = match ctx.signing_keys.find(&kid) {
        Some(jwk) => jwk,
        None => return Ok(Verdict::Rejected(RejectReason::UnknownKey)),
    };

    if matches!(jwk.algorithm, AlgorithmParameters::OctetKey(_)) {
        return Ok(Verdict::Rejected(RejectReason::Signature));
    }

    let decoding_key = DecodingKey::from_jwk(jwk)
        .map_err(|e| ApiError::internal(format!("invalid JWK '{}': {}", kid, e)))?;

    // Signature only; claims are checked below against the supplied clock
    let mut validation = Validation::new(header.alg);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.set_required_spec_claims::<&str>(&[]);

    let claims = match decode::<TokenClaims>(token, &decoding_key, &validation) {
        Ok(data) => data.claims,
        Err(e) => {
            let reason = match e.kind() {
                ErrorKind::InvalidSignature
                | ErrorKind::InvalidAlgorithm
                | ErrorKind::InvalidAlgorithmName
                | ErrorKind::InvalidKeyFormat => RejectReason::Signature,
                ErrorKind::InvalidRsaKey(_) | ErrorKind::InvalidEcdsaKey | ErrorKind::Crypto(_) => {
                    return Err(ApiError::internal(format!("key '{}' unusable: {}", kid, e)))
                }
                _ => RejectReason::Malformed,
            };
            return Ok(Verdict::Rejected(reason));
        }
    };

    if claims.iss.as_deref() != Some(ctx.issuer.as_str()) {
        return Ok(Verdict::Rejected(RejectReason::Issuer));
    }

    if !claims.aud.contains(&ctx.audience) {
        return Ok(Verdict::Rejected(RejectReason::Audience));
    }

    match claims.exp {
        Some(exp) if now_secs <= exp.saturating_add(ctx.clock_skew_secs) => {}
        _ => return Ok(Verdict::Rejected(RejectReason::Expired)),
    }

    if let Some(nbf) = claims.nbf {
        if nbf > now_secs.saturating_add(ctx.clock_skew_secs) {
            return Ok(Verdict::Rejected(RejectReason::NotYetValid));
        }
    }

    Ok(Verdict::Valid(VerifiedToken {
        raw: token.to_string(),
        kid,
        algorithm: header.alg,
        claims,
    }))
}

/// Base64 URL decode, tolerating padded input
fn base64_url_decode(input: &str) -> Option<Vec<u8>> {
    use base64::engine::general_purpose::URL_SAFE;

    URL_SAFE_NO_PAD
        .decode(input)
        .or_else(|_| URL_SAFE.decode(input))
        .ok()
}
