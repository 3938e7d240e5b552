//! Publisher backend factory

use std::sync::Arc;

use crate::config::PublisherConfig;
use crate::error::GatewayError;
use crate::hub::HubHandle;

use super::memory::MemoryPublisher;
use super::redis_backend::RedisPublisher;
use super::Publisher;

/// Create a publisher based on configuration.
///
/// - `"redis"`: a `RedisPublisher` writing to the `topic` stream. Without
///   `ack`, a flush task is spawned and reports failures to `hub`.
/// - `"memory"` (default): a `MemoryPublisher`
///
/// The redis backend spawns its flush task, so it must be called inside a
/// tokio runtime.
pub fn create_publisher(
    config: &PublisherConfig,
    gateway_id: &str,
    hub: &HubHandle,
) -> Result<Arc<dyn Publisher>, GatewayError> {
    config.validate()?;

    match config.backend.as_str() {
        "redis" => {
            let publisher = Arc::new(RedisPublisher::new(config, gateway_id)?);
            tracing::info!(
                backend = "redis",
                uri = ?config.uri,
                topic = %config.topic,
                ack = config.ack,
                flush_interval_secs = config.flush_interval().as_secs(),
                "Creating redis stream publisher"
            );
            if !config.ack {
                publisher.spawn_flusher(config.flush_interval(), hub.clone());
            }
            Ok(publisher)
        }
        _ => {
            tracing::info!(backend = "memory", "Creating memory publisher");
            Ok(Arc::new(MemoryPublisher::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::{Broker, HubConfig};
    use tokio::sync::broadcast;

    #[test]
    fn test_default_backend_is_memory() {
        let (_tx, shutdown) = broadcast::channel(1);
        let (_broker, hub) = Broker::new(HubConfig::default(), shutdown);

        let publisher = create_publisher(&PublisherConfig::default(), "g1", &hub).unwrap();
        assert_eq!(publisher.name(), "memory");
    }

    #[test]
    fn test_unknown_backend_fails() {
        let (_tx, shutdown) = broadcast::channel(1);
        let (_broker, hub) = Broker::new(HubConfig::default(), shutdown);

        let config = PublisherConfig {
            backend: "kafka".to_string(),
            ..Default::default()
        };
        assert!(create_publisher(&config, "g1", &hub).is_err());
    }

    #[tokio::test]
    async fn test_redis_backend_is_selected() {
        let (_tx, shutdown) = broadcast::channel(1);
        let (_broker, hub) = Broker::new(HubConfig::default(), shutdown);

        let config = PublisherConfig {
            backend: "redis".to_string(),
            uri: vec!["127.0.0.1:6379".to_string()],
            ..Default::default()
        };
        let publisher = create_publisher(&config, "g1", &hub).unwrap();
        assert_eq!(publisher.name(), "redis");
    }
}
