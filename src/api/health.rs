//! Health check endpoint.

use std::time::Duration;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::server::AppState;

/// Upper bound on waiting for the hub loop to answer
const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub gateway: GatewayInfo,
    pub hub: HubHealthResponse,
}

#[derive(Debug, Serialize)]
pub struct GatewayInfo {
    pub id: String,
    pub index: i64,
    pub auth_method: String,
    pub publisher: String,
}

#[derive(Debug, Serialize)]
pub struct HubHealthResponse {
    pub running: bool,
    pub connections: usize,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime_seconds = state.start_time.elapsed().as_secs();

    let (status, hub) = match tokio::time::timeout(SNAPSHOT_TIMEOUT, state.hub.snapshot()).await {
        Ok(Ok(snapshot)) => (
            "healthy",
            HubHealthResponse {
                running: true,
                connections: snapshot.size,
            },
        ),
        Ok(Err(_)) => (
            "shutting_down",
            HubHealthResponse {
                running: false,
                connections: state.hub.size(),
            },
        ),
        Err(_) => {
            tracing::warn!("Hub did not answer health snapshot in time");
            (
                "degraded",
                HubHealthResponse {
                    running: true,
                    connections: state.hub.size(),
                },
            )
        }
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        gateway: GatewayInfo {
            id: state.settings.id.clone(),
            index: state.settings.index,
            auth_method: state.authenticator.method().to_string(),
            publisher: state.publisher.name().to_string(),
        },
        hub,
    })
}
