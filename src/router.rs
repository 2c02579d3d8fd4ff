use axum::{Router, extract::DefaultBodyLimit, routing::post};
use std::sync::Arc;

use crate::handlers::{account, token};
use crate::service::Broker;

/// Request bodies are a handful of short strings.
const BODY_LIMIT: usize = 64 * 1024;

#[derive(Clone)]
pub struct BrokerState {
    pub broker: Broker,
    pub api_key: Option<Arc<str>>,
}

impl BrokerState {
    pub fn new(broker: Broker, api_key: Option<Arc<str>>) -> Self {
        Self { broker, api_key }
    }
}

pub fn broker_router(state: BrokerState) -> Router {
    Router::new()
        .route(
            "/api/v1/token",
            post(token::register_token)
                .patch(token::update_token)
                .delete(token::delete_token),
        )
        .route(
            "/api/v1/account",
            post(account::create_account).delete(account::drop_account),
        )
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .with_state(state)
}
