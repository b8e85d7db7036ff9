//! Resource routes. Every verb on a path goes to the same handler; the engine picks the
//! operation from the verb and the `method` override.

use crate::handlers::resource::{collection, member, member_function};
use crate::state::AppState;
use axum::{routing::any, Router};
use tower_http::limit::RequestBodyLimitLayer;

/// Request bodies above this size are rejected with 413.
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

pub fn resource_routes(state: AppState) -> Router {
    resource_routes_with_limit(state, DEFAULT_BODY_LIMIT)
}

pub fn resource_routes_with_limit(state: AppState, body_limit: usize) -> Router {
    Router::new()
        .route("/:resource", any(collection))
        .route("/:resource/:segment", any(member))
        .route("/:resource/:id/:function", any(member_function))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .with_state(state)
}
