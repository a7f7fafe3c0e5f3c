//! Health API using Axum
//!
//! - `GET /health` - process-wide healer status
//! - `GET /api/v1/status` - healer status plus per-entity state and the
//!   latest validation counts
//!
//! Every other path is a 404.

pub mod handlers;
mod routes;

pub use handlers::ApiState;

use axum::Router;
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_app(state: ApiState) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes(state.clone()))
        .merge(routes::health_routes(state))
        .layer(TraceLayer::new_for_http())
}
