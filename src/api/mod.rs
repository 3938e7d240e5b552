//! HTTP endpoints served next to the stream route.

mod health;
mod metrics;
mod routes;

pub use health::{health, HealthResponse};
pub use metrics::prometheus_metrics;
pub use routes::api_routes;
