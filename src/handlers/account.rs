use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use tokio::task::JoinError;

use crate::middleware::{JsonBody, RequireKeyAuth};
use crate::types::{CreateAccountRequest, DropAccountRequest, MessageResponse};
use crate::{BrokerError, router::BrokerState};

// Flows run on their own task: if the client goes away mid-request the
// flow, and any compensation it has started, still runs to the end.

/// POST /api/v1/account -> provision an account with the token's credentials.
pub async fn create_account(
    _auth: RequireKeyAuth,
    State(state): State<BrokerState>,
    JsonBody(req): JsonBody<CreateAccountRequest>,
) -> Result<impl IntoResponse, BrokerError> {
    let broker = state.broker.clone();
    let name = req.name.clone();
    tokio::spawn(async move { broker.create_account(&req.token, &req.name, &req.secret).await })
        .await
        .map_err(task_failed)??;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new(format!("account {name} created"))),
    ))
}

/// DELETE /api/v1/account
pub async fn drop_account(
    _auth: RequireKeyAuth,
    State(state): State<BrokerState>,
    JsonBody(req): JsonBody<DropAccountRequest>,
) -> Result<Json<MessageResponse>, BrokerError> {
    let broker = state.broker.clone();
    let name = req.name.clone();
    let outcome = tokio::spawn(async move { broker.drop_account(&req.token, &req.name).await })
        .await
        .map_err(task_failed)??;

    Ok(Json(MessageResponse {
        message: format!("account {name} removed"),
        warning: outcome.warning,
    }))
}

fn task_failed(e: JoinError) -> BrokerError {
    BrokerError::Internal(format!("account task failed: {e}"))
}
