use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, oneshot};

use crate::config::Settings;
use crate::connection::Connection;
use crate::error::GatewayError;

use super::registry::{HubEvent, HubSnapshot, Registry};

/// Remove and error submissions rendezvous with the loop one at a time.
const SINGLE_SLOT: usize = 1;

#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Bounded capacity of the add channel
    pub add_capacity: usize,
    /// How long shutdown waits for connections to unregister
    pub drain_timeout: Duration,
    pub trace: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            add_capacity: 5,
            drain_timeout: Duration::from_secs(10),
            trace: false,
        }
    }
}

impl From<&Settings> for HubConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            add_capacity: settings.hub.add_capacity.max(1),
            drain_timeout: settings.hub.drain_timeout(),
            trace: settings.trace,
        }
    }
}

/// Producer side of the hub. Cheap to clone; every connection holds one.
#[derive(Clone)]
pub struct HubHandle {
    add_tx: mpsc::Sender<Arc<Connection>>,
    remove_tx: mpsc::Sender<Arc<Connection>>,
    error_tx: mpsc::Sender<GatewayError>,
    query_tx: mpsc::Sender<oneshot::Sender<HubSnapshot>>,
    size: Arc<AtomicUsize>,
}

impl HubHandle {
    /// Submit an Add event. Waits while the add channel is full.
    pub async fn add(&self, connection: Arc<Connection>) -> Result<(), GatewayError> {
        self.add_tx
            .send(connection)
            .await
            .map_err(|_| GatewayError::HubClosed)
    }

    /// Submit a Remove event.
    pub async fn remove(&self, connection: Arc<Connection>) -> Result<(), GatewayError> {
        self.remove_tx
            .send(connection)
            .await
            .map_err(|_| GatewayError::HubClosed)
    }

    /// Submit an Error event.
    pub async fn err(&self, error: GatewayError) -> Result<(), GatewayError> {
        self.error_tx
            .send(error)
            .await
            .map_err(|_| GatewayError::HubClosed)
    }

    /// Ask the loop for a view of the registry.
    pub async fn snapshot(&self) -> Result<HubSnapshot, GatewayError> {
        let (tx, rx) = oneshot::channel();
        self.query_tx
            .send(tx)
            .await
            .map_err(|_| GatewayError::HubClosed)?;
        rx.await.map_err(|_| GatewayError::HubClosed)
    }

    /// Registry size as of the last event the loop applied.
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.add_tx.is_closed()
    }
}

/// Summary of a broker run, returned when the loop exits
#[derive(Debug, Default, Clone)]
pub struct DrainReport {
    /// Connections registered when shutdown started
    pub registered_at_shutdown: usize,
    /// Connections still registered when the loop exited
    pub remaining: usize,
    pub duration: Duration,
    pub timed_out: bool,
}

/// Consumer side of the hub: the only owner of the registry.
pub struct Broker {
    registry: Registry,
    add_rx: mpsc::Receiver<Arc<Connection>>,
    remove_rx: mpsc::Receiver<Arc<Connection>>,
    error_rx: mpsc::Receiver<GatewayError>,
    query_rx: mpsc::Receiver<oneshot::Sender<HubSnapshot>>,
    shutdown: broadcast::Receiver<()>,
    size: Arc<AtomicUsize>,
    config: HubConfig,
}

impl Broker {
    pub fn new(config: HubConfig, shutdown: broadcast::Receiver<()>) -> (Self, HubHandle) {
        let (add_tx, add_rx) = mpsc::channel(config.add_capacity.max(1));
        let (remove_tx, remove_rx) = mpsc::channel(SINGLE_SLOT);
        let (error_tx, error_rx) = mpsc::channel(SINGLE_SLOT);
        let (query_tx, query_rx) = mpsc::channel(SINGLE_SLOT);
        let size = Arc::new(AtomicUsize::new(0));

        let handle = HubHandle {
            add_tx,
            remove_tx,
            error_tx,
            query_tx,
            size: size.clone(),
        };

        let broker = Self {
            registry: Registry::new(config.trace),
            add_rx,
            remove_rx,
            error_rx,
            query_rx,
            shutdown,
            size,
            config,
        };

        (broker, handle)
    }

    /// Run the event loop until shutdown is signalled or every handle is gone.
    pub async fn run(mut self) -> DrainReport {
        tracing::info!(
            add_capacity = self.config.add_capacity,
            drain_timeout_secs = self.config.drain_timeout.as_secs(),
            "Hub event loop started"
        );

        loop {
            tokio::select! {
                // Polled in order: a connection's Add is always enqueued before
                // its Remove, so it is also applied first. Queries see every
                // event submitted before them.
                biased;

                _ = self.shutdown.recv() => {
                    tracing::info!(
                        clients = self.registry.len(),
                        "Hub received shutdown signal"
                    );
                    let report = self.drain().await;
                    tracing::info!(
                        registered_at_shutdown = report.registered_at_shutdown,
                        remaining = report.remaining,
                        timed_out = report.timed_out,
                        duration_ms = report.duration.as_millis() as u64,
                        "Hub event loop stopped"
                    );
                    return report;
                }
                Some(connection) = self.add_rx.recv() => {
                    self.apply(HubEvent::Add(connection));
                }
                Some(connection) = self.remove_rx.recv() => {
                    self.apply(HubEvent::Remove(connection));
                }
                Some(error) = self.error_rx.recv() => {
                    self.apply(HubEvent::Error(error));
                }
                Some(reply) = self.query_rx.recv() => {
                    self.apply(HubEvent::Snapshot(reply));
                }
                else => {
                    tracing::info!("All hub handles dropped, stopping event loop");
                    break;
                }
            }
        }

        DrainReport {
            remaining: self.registry.len(),
            ..Default::default()
        }
    }

    fn apply(&mut self, event: HubEvent) {
        self.registry.apply(event);
        self.size.store(self.registry.len(), Ordering::Relaxed);
    }

    /// Close every registered connection and keep serving events until the
    /// registry is empty or the drain timeout elapses.
    async fn drain(&mut self) -> DrainReport {
        let start = Instant::now();

        // Adds already accepted by the channel count as registered
        self.add_rx.close();
        while let Ok(connection) = self.add_rx.try_recv() {
            self.apply(HubEvent::Add(connection));
        }
        let registered_at_shutdown = self.registry.len();

        for connection in self.registry.connections() {
            connection.close();
        }

        let deadline = tokio::time::sleep(self.config.drain_timeout);
        tokio::pin!(deadline);
        let mut timed_out = false;

        while !self.registry.is_empty() {
            tokio::select! {
                biased;

                _ = &mut deadline => {
                    timed_out = true;
                    tracing::warn!(
                        remaining = self.registry.len(),
                        "Hub drain timeout, some connections did not unregister"
                    );
                    break;
                }
                Some(connection) = self.remove_rx.recv() => {
                    self.apply(HubEvent::Remove(connection));
                }
                Some(error) = self.error_rx.recv() => {
                    self.apply(HubEvent::Error(error));
                }
                Some(reply) = self.query_rx.recv() => {
                    self.apply(HubEvent::Snapshot(reply));
                }
                else => break,
            }
        }

        DrainReport {
            registered_at_shutdown,
            remaining: self.registry.len(),
            duration: start.elapsed(),
            timed_out,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionId;

    fn connection(handle: &HubHandle, id: u64) -> Arc<Connection> {
        Arc::new(Connection::accepted(ConnectionId::new(id), None, handle.clone()))
    }

    #[tokio::test]
    async fn test_add_remove_through_loop() {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (broker, hub) = Broker::new(HubConfig::default(), shutdown_rx);
        let task = tokio::spawn(broker.run());

        let c = connection(&hub, 1);
        hub.add(c.clone()).await.unwrap();
        assert_eq!(hub.snapshot().await.unwrap().connection_ids, vec![1]);
        assert_eq!(hub.size(), 1);

        hub.remove(c).await.unwrap();
        assert_eq!(hub.snapshot().await.unwrap().size, 0);

        shutdown_tx.send(()).unwrap();
        let report = task.await.unwrap();
        assert_eq!(report.remaining, 0);
        assert!(!report.timed_out);
    }

    #[tokio::test]
    async fn test_full_add_channel_holds_sender() {
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let config = HubConfig {
            add_capacity: 1,
            ..Default::default()
        };
        let (mut broker, hub) = Broker::new(config, shutdown_rx);

        hub.add(connection(&hub, 1)).await.unwrap();

        let second = connection(&hub, 2);
        let mut pending_add = tokio_test::task::spawn(hub.add(second));
        tokio_test::assert_pending!(pending_add.poll());

        // Taking one event frees the slot
        let first = broker.add_rx.recv().await.unwrap();
        assert_eq!(first.id, ConnectionId::new(1));
        assert!(pending_add.is_woken());
        tokio_test::assert_ready_ok!(pending_add.poll());
    }

    #[tokio::test]
    async fn test_error_event_keeps_loop_running() {
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (broker, hub) = Broker::new(HubConfig::default(), shutdown_rx);
        tokio::spawn(broker.run());

        hub.err(GatewayError::TransportClose("reset by peer".to_string()))
            .await
            .unwrap();
        hub.add(connection(&hub, 9)).await.unwrap();

        assert_eq!(hub.snapshot().await.unwrap().size, 1);
    }

    #[tokio::test]
    async fn test_shutdown_closes_registered_connections() {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let config = HubConfig {
            drain_timeout: Duration::from_secs(2),
            ..Default::default()
        };
        let (broker, hub) = Broker::new(config, shutdown_rx);
        let task = tokio::spawn(broker.run());

        let c = connection(&hub, 42);
        hub.add(c.clone()).await.unwrap();
        hub.snapshot().await.unwrap();

        // Stand-in for the connection's read loop
        let mut signal = c.close_signal();
        let worker = tokio::spawn(async move {
            signal.wait_for(|closed| *closed).await.unwrap();
            c.unregister().await.unwrap();
        });

        shutdown_tx.send(()).unwrap();
        let report = task.await.unwrap();
        worker.await.unwrap();

        assert_eq!(report.registered_at_shutdown, 1);
        assert_eq!(report.remaining, 0);
        assert!(!report.timed_out);
        assert!(hub.is_closed());
    }

    #[tokio::test]
    async fn test_shutdown_tracks_adds_still_queued() {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let config = HubConfig {
            drain_timeout: Duration::from_secs(2),
            ..Default::default()
        };
        let (broker, hub) = Broker::new(config, shutdown_rx);

        // Add and shutdown are both ready before the loop first polls
        let c = connection(&hub, 7);
        c.register().await.unwrap();
        shutdown_tx.send(()).unwrap();

        let mut signal = c.close_signal();
        let worker = tokio::spawn(async move {
            signal.wait_for(|closed| *closed).await.unwrap();
            c.unregister().await.unwrap();
        });

        let report = broker.run().await;
        worker.await.unwrap();

        assert_eq!(report.registered_at_shutdown, 1);
        assert_eq!(report.remaining, 0);
        assert!(!report.timed_out);
        assert!(matches!(
            hub.add(connection(&hub, 8)).await,
            Err(GatewayError::HubClosed)
        ));
    }

    #[tokio::test]
    async fn test_drain_times_out_when_connections_linger() {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let config = HubConfig {
            drain_timeout: Duration::from_millis(50),
            ..Default::default()
        };
        let (broker, hub) = Broker::new(config, shutdown_rx);
        let task = tokio::spawn(broker.run());

        let c = connection(&hub, 5);
        hub.add(c.clone()).await.unwrap();
        hub.snapshot().await.unwrap();

        shutdown_tx.send(()).unwrap();
        let report = task.await.unwrap();

        assert!(report.timed_out);
        assert_eq!(report.remaining, 1);
        assert!(c.is_close_requested());
        assert!(matches!(c.unregister().await, Err(GatewayError::HubClosed)));
    }
}
