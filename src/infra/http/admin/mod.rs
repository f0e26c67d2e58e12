//! Operator-facing JSON endpoints, bound to their own listener.

mod cache;
mod groups;
mod health;
mod state;

pub use state::AdminState;

use axum::{
    Router, middleware,
    routing::{delete, get, post},
};

use super::middleware::{log_responses, set_request_context};

pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/cache/invalidate", post(cache::invalidate_cache))
        .route("/groups", post(groups::create_group))
        .route("/groups/{slug}", delete(groups::delete_group))
        .route("/_health/db", get(health::admin_health))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}
