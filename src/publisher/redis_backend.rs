//! Redis Streams publisher backend.
//!
//! Every payload becomes one `XADD {topic} * connection <id> gateway <gid> payload <bytes>`
//! entry. Without `ack`, records are buffered and written as a pipeline on
//! every flush tick; with `ack`, each publish waits for the entry id.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use redis::aio::MultiplexedConnection;
use redis::Client;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::config::PublisherConfig;
use crate::connection::ConnectionId;
use crate::error::GatewayError;
use crate::hub::HubHandle;
use crate::metrics::PublishMetrics;

use super::{PublishedRecord, Publisher};

pub struct RedisPublisher {
    client: Client,
    /// Multiplexed connection (shared across tasks)
    connection: RwLock<Option<MultiplexedConnection>>,
    topic: String,
    gateway_id: String,
    ack: bool,
    buffer: Mutex<Vec<PublishedRecord>>,
}

impl RedisPublisher {
    pub fn new(config: &PublisherConfig, gateway_id: &str) -> Result<Self, GatewayError> {
        let address = config
            .uri
            .iter()
            .map(|u| u.trim())
            .find(|u| !u.is_empty())
            .ok_or_else(|| {
                GatewayError::Configuration("Redis publisher requires a broker address".into())
            })?;
        let url = redis_url(address);
        let client = Client::open(url.as_str())
            .map_err(|e| GatewayError::Configuration(format!("Invalid broker address {}: {}", url, e)))?;

        if config.compress {
            tracing::info!("Payload compression is not applied by the redis publisher");
        }

        Ok(Self {
            client,
            connection: RwLock::new(None),
            topic: config.topic.clone(),
            gateway_id: gateway_id.to_string(),
            ack: config.ack,
            buffer: Mutex::new(Vec::new()),
        })
    }

    /// Periodically flush buffered records. Stops once the publisher is dropped.
    pub fn spawn_flusher(self: &Arc<Self>, every: Duration, hub: HubHandle) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(every);
            // Skip immediate first tick
            timer.tick().await;

            loop {
                timer.tick().await;
                let Some(publisher) = weak.upgrade() else {
                    break;
                };
                if let Err(e) = publisher.flush().await {
                    if hub.err(e).await.is_err() {
                        tracing::debug!("Hub closed, dropping publisher flush error");
                    }
                }
            }
        })
    }

    pub fn buffered(&self) -> usize {
        self.buffer.lock().map(|b| b.len()).unwrap_or(0)
    }

    async fn get_connection(&self) -> Result<MultiplexedConnection, GatewayError> {
        {
            let conn = self.connection.read().await;
            if let Some(ref c) = *conn {
                return Ok(c.clone());
            }
        }

        let mut conn_guard = self.connection.write().await;
        // Another task may have connected while we waited
        if let Some(ref c) = *conn_guard {
            return Ok(c.clone());
        }

        let conn = self.client.get_multiplexed_tokio_connection().await?;
        *conn_guard = Some(conn.clone());
        tracing::info!(topic = %self.topic, "Redis publisher connection established");
        Ok(conn)
    }

    async fn reset_connection(&self) {
        *self.connection.write().await = None;
    }

    fn take_buffer(&self) -> Result<Vec<PublishedRecord>, GatewayError> {
        let mut buffer = self
            .buffer
            .lock()
            .map_err(|_| GatewayError::Internal("redis publisher buffer lock poisoned".into()))?;
        Ok(std::mem::take(&mut *buffer))
    }

    fn xadd(&self, record: &PublishedRecord) -> redis::Cmd {
        let mut cmd = redis::cmd("XADD");
        cmd.arg(&self.topic)
            .arg("*")
            .arg("connection")
            .arg(record.connection_id.get())
            .arg("gateway")
            .arg(&self.gateway_id)
            .arg("payload")
            .arg(record.payload.to_vec());
        cmd
    }
}

/// Accept bare `host:port` broker addresses.
fn redis_url(address: &str) -> String {
    if address.contains("://") {
        address.to_string()
    } else {
        format!("redis://{}", address)
    }
}

#[async_trait]
impl Publisher for RedisPublisher {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn publish(
        &self,
        connection_id: ConnectionId,
        payload: Bytes,
    ) -> Result<(), GatewayError> {
        let record = PublishedRecord::new(connection_id, payload);

        if !self.ack {
            self.buffer
                .lock()
                .map_err(|_| GatewayError::Internal("redis publisher buffer lock poisoned".into()))?
                .push(record);
            return Ok(());
        }

        let mut conn = self.get_connection().await?;
        let result: redis::RedisResult<String> = self.xadd(&record).query_async(&mut conn).await;
        match result {
            Ok(_) => {
                PublishMetrics::record_published();
                Ok(())
            }
            Err(e) => {
                PublishMetrics::record_failed();
                self.reset_connection().await;
                Err(GatewayError::Upstream(format!(
                    "XADD to {} failed for connection {}: {}",
                    self.topic, connection_id, e
                )))
            }
        }
    }

    async fn flush(&self) -> Result<(), GatewayError> {
        let records = self.take_buffer()?;
        if records.is_empty() {
            return Ok(());
        }

        let count = records.len();
        let mut pipe = redis::pipe();
        for record in &records {
            pipe.add_command(self.xadd(record)).ignore();
        }

        let mut conn = match self.get_connection().await {
            Ok(conn) => conn,
            Err(e) => {
                PublishMetrics::record_failed_batch(count);
                return Err(e);
            }
        };

        let result: redis::RedisResult<()> = pipe.query_async(&mut conn).await;
        match result {
            Ok(()) => {
                PublishMetrics::record_published_batch(count);
                tracing::debug!(topic = %self.topic, records = count, "Flushed records to redis");
                Ok(())
            }
            Err(e) => {
                PublishMetrics::record_failed_batch(count);
                self.reset_connection().await;
                Err(GatewayError::Upstream(format!(
                    "Flushing {} records to {} failed: {}",
                    count, self.topic, e
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_url_normalization() {
        assert_eq!(redis_url("docker:9091"), "redis://docker:9091");
        assert_eq!(redis_url("redis://cache:6379/0"), "redis://cache:6379/0");
    }

    #[tokio::test]
    async fn test_unacked_publish_buffers_without_connecting() {
        let config = PublisherConfig {
            backend: "redis".to_string(),
            uri: vec!["127.0.0.1:1".to_string()],
            ack: false,
            ..Default::default()
        };
        let publisher = RedisPublisher::new(&config, "g1").unwrap();

        publisher
            .publish(ConnectionId::new(3), Bytes::from_static(b"reading"))
            .await
            .unwrap();
        publisher
            .publish(ConnectionId::new(3), Bytes::from_static(b"reading"))
            .await
            .unwrap();

        assert_eq!(publisher.buffered(), 2);
    }

    #[test]
    fn test_requires_address() {
        let config = PublisherConfig {
            backend: "redis".to_string(),
            uri: vec!["  ".to_string()],
            ..Default::default()
        };
        assert!(RedisPublisher::new(&config, "g1").is_err());
    }
}
