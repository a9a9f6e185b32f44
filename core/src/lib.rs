//! obo-gateway-core: Platform-agnostic core of the On-Behalf-Of token gateway
//!
//! This crate contains the token-validation and exchange pipeline: bearer
//! extraction, OIDC discovery caching, JWT verification and the OAuth2
//! On-Behalf-Of grant. It depends only on abstract platform traits
//! (HttpClient, Clock, Environment) and never imports host-specific code.

pub mod config;
pub mod error;
pub mod obo;
pub mod oidc;
pub mod platform;
pub mod sts;

#[cfg(test)]
pub mod test_support;
