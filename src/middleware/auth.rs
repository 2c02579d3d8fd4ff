use axum::Json;
use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, StatusCode, request::Parts};
use axum::response::{IntoResponse, Response};
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::error::{ApiErrorBody, ApiErrorResponse};
use crate::router::BrokerState;

pub const API_KEY_HEADER: &str = "x-broker-key";

/// Ensure the inbound request carries the configured API key.
/// Accepts either:
/// - Header: `x-broker-key: ...`
/// - Header: `Authorization: Bearer ...`
///
/// No key configured means the API is open.
pub fn ensure_authorized(headers: &HeaderMap, expected: Option<&str>) -> Result<(), Response> {
    let Some(expected) = expected else {
        return Ok(());
    };

    // 1) header: x-broker-key
    if let Some(hv) = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok())
        && key_matches(hv, expected)
    {
        return Ok(());
    }

    // 2) header: Authorization: Bearer <key>
    if let Some(auth) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        let auth = auth.trim();
        if let Some(token) = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            && key_matches(token, expected)
        {
            return Ok(());
        }
    }

    debug!("rejected request without a valid api key");
    Err((
        StatusCode::UNAUTHORIZED,
        Json(ApiErrorResponse {
            error: ApiErrorBody {
                code: "UNAUTHORIZED".to_string(),
                message: "invalid or missing key".to_string(),
            },
        }),
    )
        .into_response())
}

fn key_matches(given: &str, expected: &str) -> bool {
    bool::from(given.as_bytes().ct_eq(expected.as_bytes()))
}

#[derive(Debug, Clone, Copy)]
pub struct RequireKeyAuth;

impl FromRequestParts<BrokerState> for RequireKeyAuth {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &BrokerState,
    ) -> Result<Self, Self::Rejection> {
        ensure_authorized(&parts.headers, state.api_key.as_deref())?;
        Ok(Self)
    }
}
