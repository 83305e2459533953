use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::handlers;
use super::AppState;
use crate::middleware::{make_span_with_request_id, request_id_middleware};

/// Creates the application router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", api_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
        .layer(CorsLayer::permissive())
        // outermost, so the trace span can see the id
        .layer(middleware::from_fn(request_id_middleware))
}

/// API routes under /api/v1
fn api_routes() -> Router<AppState> {
    let list = "/users/:user_id/rankings/:content_type";

    Router::new()
        .route(list, get(handlers::list_rankings))
        .route(
            &format!("{}/diagnostics", list),
            get(handlers::diagnostics),
        )
        .route(
            &format!("{}/placements", list),
            post(handlers::begin_placement),
        )
        .route("/placements/advance", post(handlers::advance_placement))
        .route(&format!("{}/items", list), post(handlers::commit_placement))
        .route(
            &format!("{}/items/:content_item_id", list),
            delete(handlers::remove_item),
        )
        .route(&format!("{}/moves", list), post(handlers::move_item))
        .route(&format!("{}/repair", list), post(handlers::repair))
}
