//! Downstream publisher abstraction.
//!
//! Connections hand every payload they read to a [`Publisher`]. Delivery
//! guarantees belong to the backend; the gateway only reports failures.

mod factory;
mod memory;
mod redis_backend;

pub use factory::create_publisher;
pub use memory::MemoryPublisher;
pub use redis_backend::RedisPublisher;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::connection::ConnectionId;
use crate::error::GatewayError;

/// One payload read from a connection
#[derive(Debug, Clone)]
pub struct PublishedRecord {
    pub connection_id: ConnectionId,
    pub payload: Bytes,
    pub received_at: DateTime<Utc>,
}

impl PublishedRecord {
    pub fn new(connection_id: ConnectionId, payload: Bytes) -> Self {
        Self {
            connection_id,
            payload,
            received_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Backend name for logs and health output
    fn name(&self) -> &'static str;

    /// Hand one payload downstream.
    async fn publish(&self, connection_id: ConnectionId, payload: Bytes)
        -> Result<(), GatewayError>;

    /// Push out anything buffered.
    async fn flush(&self) -> Result<(), GatewayError>;
}
