use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::connection::ConnectionState;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Transport close error: {0}")]
    TransportClose(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Hub is not running")]
    HubClosed,

    #[error("Invalid connection state transition: {from} -> {to}")]
    InvalidTransition {
        from: ConnectionState,
        to: ConnectionState,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Short label used for metrics and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Config(_) | GatewayError::Configuration(_) => "configuration",
            GatewayError::Authentication(_) => "authentication",
            GatewayError::TransportClose(_) => "transport_close",
            GatewayError::Protocol(_) => "protocol",
            GatewayError::Upstream(_) => "upstream",
            GatewayError::HubClosed => "hub_closed",
            GatewayError::InvalidTransition { .. } => "invalid_transition",
            GatewayError::Internal(_) => "internal",
        }
    }

    /// Whether this error must prevent the process from serving
    pub fn is_fatal(&self) -> bool {
        matches!(self, GatewayError::Config(_) | GatewayError::Configuration(_))
    }
}

impl From<redis::RedisError> for GatewayError {
    fn from(e: redis::RedisError) -> Self {
        GatewayError::Upstream(e.to_string())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

/// Check if running in production mode (based on RUN_MODE env var)
fn is_production() -> bool {
    std::env::var("RUN_MODE")
        .map(|m| m == "production" || m == "prod")
        .unwrap_or(false)
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            GatewayError::Authentication(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            GatewayError::HubClosed => (StatusCode::SERVICE_UNAVAILABLE, "HUB_CLOSED"),
            GatewayError::Upstream(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            GatewayError::Protocol(_) => (StatusCode::BAD_REQUEST, "PROTOCOL_ERROR"),
            GatewayError::Config(_) | GatewayError::Configuration(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR")
            }
            GatewayError::TransportClose(_)
            | GatewayError::InvalidTransition { .. }
            | GatewayError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let log_message = self.to_string();
        let client_message = if is_production() && status.is_server_error() {
            "Service temporarily unavailable".to_string()
        } else {
            log_message.clone()
        };

        // Always log the detailed error server-side
        tracing::error!(
            code = %code,
            status = %status.as_u16(),
            message = %log_message,
            "API error"
        );

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: client_message,
            },
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
