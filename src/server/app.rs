use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::api::api_routes;
use crate::websocket::ws_handler;

use super::AppState;

pub fn create_app(state: AppState) -> Router {
    let root = state.settings.server.root.clone();

    Router::new()
        // Stream endpoint
        .route(&root, get(ws_handler))
        .merge(api_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use tokio::sync::broadcast;
    use tower::ServiceExt;

    use crate::auth::{Authenticator, NoAuth};
    use crate::config::Settings;
    use crate::hub::{Broker, HubConfig};
    use crate::publisher::MemoryPublisher;

    fn app_with(settings: Settings) -> (Router, broadcast::Sender<()>) {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (broker, hub) = Broker::new(HubConfig::default(), shutdown_rx);
        tokio::spawn(broker.run());

        let state = AppState::from_parts(
            settings,
            Authenticator::None(NoAuth),
            Arc::new(MemoryPublisher::new()),
            hub,
        );
        (create_app(state), shutdown_tx)
    }

    #[tokio::test]
    async fn test_health_reports_hub_state() {
        let (app, _shutdown) = app_with(Settings::default());

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["gateway"]["id"], "g1");
        assert_eq!(json["gateway"]["auth_method"], "none");
        assert_eq!(json["hub"]["connections"], 0);
    }

    #[tokio::test]
    async fn test_metrics_are_exposed() {
        let (app, _shutdown) = app_with(Settings::default());

        let response = app
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers().get(header::CONTENT_TYPE).unwrap();
        assert!(content_type.to_str().unwrap().starts_with("text/plain"));
    }

    #[tokio::test]
    async fn test_stream_route_follows_configured_root() {
        let mut settings = Settings::default();
        settings.server.root = "/stream".to_string();
        let (app, _shutdown) = app_with(settings);

        // Plain GET without upgrade headers reaches the route but is refused
        let response = app
            .clone()
            .oneshot(Request::get("/stream").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_ne!(response.status(), StatusCode::NOT_FOUND);
        assert!(!response.status().is_success());

        let response = app
            .oneshot(Request::get("/ws").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
