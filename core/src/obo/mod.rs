//! On-Behalf-Of exchange against the identity provider

mod client;

pub use client::{ConfidentialClient, ExchangedToken, JWT_BEARER_GRANT};
