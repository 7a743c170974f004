//! Health and readiness endpoint.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use kubecast_core::OverflowPolicy;
use kubecast_hub::HubMetricsSnapshot;

use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub pool_size: usize,
    pub uptime_secs: u64,
    pub overflow_policy: OverflowPolicy,
    pub metrics: HubMetricsSnapshot,
}

/// GET /health - Pool size and hub counters. 503 once the hub is shutting down.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let shutting_down = state.hub.is_shut_down();
    let response = HealthResponse {
        status: if shutting_down { "shutting_down" } else { "ok" },
        pool_size: state.hub.pool_size(),
        uptime_secs: state.uptime_secs(),
        overflow_policy: state.hub.overflow_policy(),
        metrics: state.hub.metrics(),
    };
    let status = if shutting_down {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status, Json(response))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use kubecast_core::RelayConfig;
    use kubecast_hub::Hub;
    use tower::ServiceExt;

    use crate::{create_router, state::AppState};

    async fn get_health(app: axum::Router) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_health_reports_pool_size() {
        let config = RelayConfig::default();
        let hub = Hub::new(&config.hub);
        let _a = hub.subscribe();
        let _b = hub.subscribe();
        let app = create_router(AppState::new(hub.clone(), config));

        let (status, body) = get_health(app.clone()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["poolSize"], 2);
        assert_eq!(body["overflowPolicy"], "disconnect");
        assert_eq!(body["metrics"]["totalSubscribers"], 2);

        hub.shutdown();
        let (status, body) = get_health(app).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["poolSize"], 0);
    }
}
