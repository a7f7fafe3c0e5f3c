//! API route definitions

use axum::{routing::get, Router};

use super::handlers::{self, ApiState};

/// Versioned API routes, nested under `/api/v1`
pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/status", get(handlers::get_status))
        .with_state(state)
}

/// Root-level health endpoint
pub fn health_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(handlers::get_health))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::supervisor::SupervisorState;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tokio::sync::RwLock;
    use tower::ServiceExt;

    fn create_test_state() -> (ApiState, ManualClock) {
        let clock = ManualClock::default();
        let state = ApiState {
            supervisor: Arc::new(RwLock::new(SupervisorState::new(
                crate::clock::Clock::now(&clock),
            ))),
            clock: Arc::new(clock.clone()),
        };
        (state, clock)
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), 64 * 1024).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_uptime() {
        let (state, clock) = create_test_state();
        state.supervisor.write().await.healing_actions = 2;
        clock.advance_secs(42);

        let app = crate::api::create_app(state);
        let resp = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let json = body_json(resp).await;
        assert_eq!(json["status"], "running");
        assert_eq!(json["healingActionsCount"], 2);
        assert_eq!(json["uptimeSeconds"], 42);
        assert!(json["lastCheckTimestamp"].is_string());
    }

    #[tokio::test]
    async fn test_status_includes_entities() {
        let (state, _clock) = create_test_state();
        let app = crate::api::create_app(state);
        let resp = app
            .oneshot(Request::get("/api/v1/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let json = body_json(resp).await;
        assert_eq!(json["status"], "running");
        assert!(json["entities"].as_array().unwrap().is_empty());
        assert!(json["validation"].is_null());
    }

    #[tokio::test]
    async fn test_unknown_path_is_404() {
        let (state, _clock) = create_test_state();
        let app = crate::api::create_app(state);
        let resp = app
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
