use axum::{
    Json,
    extract::{FromRequest, Request, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;

use crate::error::{ApiErrorBody, ApiErrorResponse, BrokerError};

/// `Json<T>` whose rejections come back in the broker's error shape.
/// An oversized body keeps its 413; anything else unreadable is a 400.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(body)) => Ok(Self(body)),
            Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                Err(too_large())
            }
            Err(rejection) => Err(reject(rejection)),
        }
    }
}

fn too_large() -> Response {
    (
        StatusCode::PAYLOAD_TOO_LARGE,
        Json(ApiErrorResponse {
            error: ApiErrorBody {
                code: "PAYLOAD_TOO_LARGE".to_string(),
                message: "request body too large".to_string(),
            },
        }),
    )
        .into_response()
}

fn reject(rejection: JsonRejection) -> Response {
    tracing::debug!(reason = %rejection.body_text(), "unreadable request body");
    BrokerError::Validation("malformed request body".to_string()).into_response()
}
