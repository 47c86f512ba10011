pub mod affect;
pub mod health;
pub mod tutoring;
pub mod viva;

use axum::extract::DefaultBodyLimit;
use axum::Router;

use crate::middleware::request_id;
use crate::state::AppState;

/// Maximum request body size: 16 MiB (viva audio answers are the largest
/// payloads).
const MAX_BODY_SIZE: usize = 16 * 1024 * 1024;

pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .nest("/tutoring", tutoring::router())
        .nest("/viva", viva::router())
        .nest("/affect", affect::router())
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE));

    Router::new()
        .nest("/api", api_routes)
        .nest("/health", health::router())
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .with_state(state)
}
