// Shared infrastructure
pub mod config;
pub mod error;
pub mod metrics;
pub mod telemetry;

// Core
pub mod auth;
pub mod connection;
pub mod hub;
pub mod publisher;

// Application layer
pub mod api;
pub mod server;
pub mod websocket;
