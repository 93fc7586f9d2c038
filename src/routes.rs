use axum::{Router, routing::get};

use crate::handler::{self, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handler::healthcheck))
        .route("/history", get(handler::sync_history).post(handler::sync_history))
        .route("/history/rows", get(handler::list_history))
        .route("/state", get(handler::get_state))
}
