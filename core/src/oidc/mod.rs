//! OIDC (OpenID Connect) module
//!
//! Handles inbound token validation: discovery, JWKS fetching, key caching and
//! claim verification.

mod cache;
mod discovery;
mod jwks;
mod validate;

pub use cache::DiscoveryCache;
pub use discovery::{discovery_url, fetch_discovery, DiscoveryDocument};
pub use validate::{verify, Audience, TokenClaims, ValidationContext, Verdict, VerifiedToken};
