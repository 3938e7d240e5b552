//! Hub registry integration tests
//!
//! Drive the broker loop from many tasks through `HubHandle` only, the way
//! the listener does, and check what the registry ends up holding.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use stream_gateway::config::Settings;
use stream_gateway::connection::{Connection, ConnectionId};
use stream_gateway::error::GatewayError;
use stream_gateway::hub::{Broker, HubConfig, HubHandle};
use stream_gateway::server::AppState;

fn start_hub(config: HubConfig) -> (HubHandle, broadcast::Sender<()>) {
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let (broker, hub) = Broker::new(config, shutdown_rx);
    tokio::spawn(broker.run());
    (hub, shutdown_tx)
}

fn connection(hub: &HubHandle, id: u64) -> Arc<Connection> {
    Arc::new(Connection::accepted(ConnectionId::new(id), None, hub.clone()))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_adds_and_removes_serialize() {
    let (hub, _shutdown) = start_hub(HubConfig::default());

    let mut tasks = Vec::new();
    for id in 0..200u64 {
        let hub = hub.clone();
        tasks.push(tokio::spawn(async move {
            let c = connection(&hub, id);
            hub.add(c.clone()).await.unwrap();
            tokio::task::yield_now().await;
            if id % 3 == 0 {
                hub.remove(c).await.unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let expected: BTreeSet<u64> = (0..200).filter(|id| id % 3 != 0).collect();
    let snapshot = hub.snapshot().await.unwrap();
    let actual: BTreeSet<u64> = snapshot.connection_ids.iter().copied().collect();

    assert_eq!(actual, expected);
    assert_eq!(snapshot.size, expected.len());
    assert_eq!(hub.size(), expected.len());
}

#[tokio::test]
async fn test_re_add_counts_once() {
    let (hub, _shutdown) = start_hub(HubConfig::default());

    hub.add(connection(&hub, 7)).await.unwrap();
    hub.add(connection(&hub, 7)).await.unwrap();
    hub.add(connection(&hub, 8)).await.unwrap();

    let snapshot = hub.snapshot().await.unwrap();
    assert_eq!(snapshot.size, 2);
    assert_eq!(snapshot.connection_ids, vec![7, 8]);
}

#[tokio::test]
async fn test_remove_of_absent_id_is_noop() {
    let (hub, _shutdown) = start_hub(HubConfig::default());

    hub.add(connection(&hub, 1)).await.unwrap();
    hub.remove(connection(&hub, 99)).await.unwrap();

    let snapshot = hub.snapshot().await.unwrap();
    assert_eq!(snapshot.connection_ids, vec![1]);

    // Loop is still serving
    hub.err(GatewayError::Protocol("bad frame".into()))
        .await
        .unwrap();
    assert_eq!(hub.snapshot().await.unwrap().size, 1);
}

#[tokio::test]
async fn test_add_capacity_holds_senders_until_loop_runs() {
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let config = HubConfig {
        add_capacity: 5,
        ..Default::default()
    };
    let (broker, hub) = Broker::new(config, shutdown_rx);

    // Broker not running yet: the buffer takes exactly five
    for id in 0..5u64 {
        tokio::time::timeout(Duration::from_millis(100), hub.add(connection(&hub, id)))
            .await
            .expect("add within capacity should not block")
            .unwrap();
    }

    let sixth = {
        let hub = hub.clone();
        tokio::spawn(async move { hub.add(connection(&hub, 5)).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!sixth.is_finished(), "sixth add should wait for the loop");

    tokio::spawn(broker.run());

    tokio::time::timeout(Duration::from_secs(2), sixth)
        .await
        .expect("sixth add should complete once the loop runs")
        .unwrap()
        .unwrap();

    assert_eq!(hub.snapshot().await.unwrap().size, 6);
    drop(shutdown_tx);
}

#[tokio::test]
async fn test_handles_fail_after_shutdown() {
    let (hub, shutdown) = start_hub(HubConfig {
        drain_timeout: Duration::from_millis(50),
        ..Default::default()
    });
    hub.snapshot().await.unwrap();

    shutdown.send(()).unwrap();

    tokio::time::timeout(Duration::from_secs(2), async {
        while !hub.is_closed() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("hub should stop");

    assert!(matches!(hub.add(connection(&hub, 1)).await, Err(GatewayError::HubClosed)));
    assert!(matches!(hub.remove(connection(&hub, 1)).await, Err(GatewayError::HubClosed)));
    assert!(matches!(
        hub.err(GatewayError::Internal("late".into())).await,
        Err(GatewayError::HubClosed)
    ));
    assert!(matches!(hub.snapshot().await, Err(GatewayError::HubClosed)));
}

#[tokio::test]
async fn test_simple_auth_without_secret_fails_startup() {
    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let (_broker, hub) = Broker::new(HubConfig::default(), shutdown_rx);

    let mut settings = Settings::default();
    settings.server.auth_method = "simple".to_string();
    settings.server.token = String::new();

    let result = AppState::new(settings, hub);
    assert!(matches!(result, Err(GatewayError::Configuration(_))));
}

#[tokio::test]
async fn test_unknown_auth_method_fails_startup() {
    let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let (_broker, hub) = Broker::new(HubConfig::default(), shutdown_rx);

    let mut settings = Settings::default();
    settings.server.auth_method = "kerberos".to_string();

    let err = AppState::new(settings, hub).err().expect("startup should fail");
    assert!(err.is_fatal());
}
