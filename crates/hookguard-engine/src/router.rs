//! HTTP router for serve mode.

use axum::{
    routing::{get, post},
    Router,
};

use crate::app_state::AppState;
use crate::{ops, transport};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/evaluate", post(transport::http::evaluate))
        .route("/admin/reload", post(transport::http::reload))
        .route("/healthz", get(ops::healthz))
        .route("/metrics", get(ops::metrics))
        .with_state(state)
}
