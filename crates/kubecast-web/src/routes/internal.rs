//! Internal notification endpoints.

use axum::{extract::State, http::StatusCode, Json};
use tracing::{debug, info};

use kubecast_core::Message;
use kubecast_hub::SubmitReport;

use crate::state::AppState;

/// Receive a resource-change message and broadcast it to all WebSocket clients.
pub async fn notify(
    State(state): State<AppState>,
    Json(message): Json<Message>,
) -> (StatusCode, Json<SubmitReport>) {
    info!(
        message_type = %message.message_type(),
        "Received internal notification, broadcasting to WebSocket clients"
    );
    let report = state.broadcast(message);
    debug!(
        delivered = report.delivered,
        dropped = report.dropped,
        disconnected = report.disconnected,
        "Notification broadcast"
    );
    (StatusCode::ACCEPTED, Json(report))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use kubecast_core::RelayConfig;
    use kubecast_hub::Hub;
    use tower::ServiceExt;

    use crate::{create_router, state::AppState};

    fn notify_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/internal/notify")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_notify_reaches_subscribers() {
        let config = RelayConfig::default();
        let hub = Hub::new(&config.hub);
        let mut subscription = hub.subscribe();
        let app = create_router(AppState::new(hub.clone(), config));

        let response = app
            .oneshot(notify_request(
                r#"{"messageType":"TaskCreated","payload":{"metadata":{"name":"build"}}}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let report: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(report["delivered"], 1);

        let message = subscription.try_next().unwrap();
        assert_eq!(message.message_type().to_string(), "TaskCreated");
        assert_eq!(message.payload()["metadata"]["name"], "build");
    }

    #[tokio::test]
    async fn test_notify_rejects_invalid_tags() {
        let config = RelayConfig::default();
        let hub = Hub::new(&config.hub);
        let mut subscription = hub.subscribe();
        let app = create_router(AppState::new(hub.clone(), config));

        for body in [
            r#"{"messageType":"NamespaceUpdated","payload":{}}"#,
            r#"{"messageType":"TaskRestarted","payload":{}}"#,
        ] {
            let response = app.clone().oneshot(notify_request(body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        }
        assert!(subscription.try_next().is_none());
        assert_eq!(hub.metrics().messages_submitted, 0);
    }
}
