use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

use crate::middleware::{JsonBody, RequireKeyAuth};
use crate::types::{MessageResponse, RegisterRequest, TokenRequest, TokenResponse, UpdateRequest};
use crate::{BrokerError, router::BrokerState};

/// POST /api/v1/token -> register a credential-set and issue its token.
pub async fn register_token(
    _auth: RequireKeyAuth,
    State(state): State<BrokerState>,
    JsonBody(req): JsonBody<RegisterRequest>,
) -> Result<impl IntoResponse, BrokerError> {
    let token = state.broker.register(req.into()).await?;
    Ok((StatusCode::CREATED, Json(TokenResponse { token })))
}

/// PATCH /api/v1/token -> replace the credential-set behind a token.
pub async fn update_token(
    _auth: RequireKeyAuth,
    State(state): State<BrokerState>,
    JsonBody(req): JsonBody<UpdateRequest>,
) -> Result<Json<MessageResponse>, BrokerError> {
    state
        .broker
        .update(&req.token, req.credentials.into())
        .await?;
    Ok(Json(MessageResponse::new("token updated")))
}

/// DELETE /api/v1/token
pub async fn delete_token(
    _auth: RequireKeyAuth,
    State(state): State<BrokerState>,
    JsonBody(req): JsonBody<TokenRequest>,
) -> Result<Json<MessageResponse>, BrokerError> {
    state.broker.unregister(&req.token).await?;
    Ok(Json(MessageResponse::new("token deleted")))
}
