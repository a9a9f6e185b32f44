//! Bearer credential extraction

use crate::error::{ApiError, Result};

const BEARER_PREFIX: &str = "Bearer ";

/// Pull the bearer credential out of request headers
///
/// The header name is matched case-insensitively; the scheme is not. Whatever
/// follows the prefix is returned as-is, even when empty.
pub fn extract_bearer(headers: &[(&str, &str)]) -> Result<String> {
    let value = headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("Authorization"))
        .map(|(_, value)| *value)
        .ok_or(ApiError::MissingCredential)?;

    value
        .strip_prefix(BEARER_PREFIX)
        .map(str::to_string)
        .ok_or(ApiError::MalformedScheme)
}
