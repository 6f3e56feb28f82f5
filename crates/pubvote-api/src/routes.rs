use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::slack;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/slack/commands", post(slack::command))
        .route("/slack/actions", post(slack::action))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn health() -> &'static str {
    "ok"
}
