//! Maps the pipeline outcome to a client-facing response

use serde::Serialize;
use tracing::{error, warn};

use crate::error::{ApiError, ErrorResponse, Result};
use crate::obo::ExchangedToken;

/// Token exchange response
#[derive(Serialize)]
pub struct ExchangeResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

impl From<ExchangedToken> for ExchangeResponse {
    fn from(token: ExchangedToken) -> Self {
        Self {
            access_token: token.access_token,
            token_type: token.token_type,
            expires_in: token.expires_in,
        }
    }
}

/// Status code and JSON body ready for the HTTP adapter
#[derive(Debug)]
pub struct GatewayResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

/// Format the terminal state of one pipeline run
///
/// Failures are logged with their full detail here and nowhere else; the
/// caller only sees the coarse class.
pub fn respond(result: Result<ExchangedToken>) -> GatewayResponse {
    match result {
        Ok(token) => GatewayResponse {
            status: 200,
            body: serde_json::to_value(ExchangeResponse::from(token)).unwrap_or_default(),
        },
        Err(err) => {
            log_failure(&err);
            GatewayResponse {
                status: err.status_code(),
                body: serde_json::to_value(ErrorResponse::from(&err)).unwrap_or_default(),
            }
        }
    }
}

fn log_failure(err: &ApiError) {
    match err {
        ApiError::Internal { .. } | ApiError::Misconfigured { .. } => {
            error!(reason = err.reason(), status = err.status_code(), detail = %err, "token exchange request failed")
        }
        _ => warn!(reason = err.reason(), status = err.status_code(), detail = %err, "token exchange request failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RejectReason;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_success_payload() {
        let response = respond(Ok(ExchangedToken {
            access_token: "new-token".to_string(),
            token_type: "Bearer".to_string(),
            expires_in: 3599,
            expires_at: Utc.timestamp_opt(1_706_903_599, 0).unwrap(),
            scopes: vec!["User.Read".to_string()],
        }));

        assert_eq!(response.status, 200);
        assert_eq!(
            response.body,
            serde_json::json!({
                "access_token": "new-token",
                "token_type": "Bearer",
                "expires_in": 3599,
            })
        );
    }

    #[test]
    fn test_rejections_share_one_message() {
        let audience = respond(Err(ApiError::Rejected(RejectReason::Audience)));
        let expired = respond(Err(ApiError::Rejected(RejectReason::Expired)));
        let missing = respond(Err(ApiError::MissingCredential));

        assert_eq!(audience.status, 401);
        assert_eq!(audience.body, expired.body);
        assert_eq!(audience.body, missing.body);
        assert_eq!(audience.body["error"], "unauthorized");
    }

    #[test]
    fn test_exchange_failure_is_generic_bad_request() {
        let response = respond(Err(ApiError::exchange_denied(
            "invalid_grant",
            "AADSTS50013: Assertion failed signature validation.",
        )));

        assert_eq!(response.status, 400);
        assert_eq!(response.body["error"], "bad_request");
        let rendered = response.body.to_string();
        assert!(!rendered.contains("invalid_grant"));
        assert!(!rendered.contains("AADSTS"));
    }

    #[test]
    fn test_misconfiguration_is_bad_request() {
        let response = respond(Err(ApiError::misconfigured("required configuration missing: CLIENT_SECRET")));
        assert_eq!(response.status, 400);
        assert!(!response.body.to_string().contains("CLIENT_SECRET"));
    }
}
