//! The connection registry and the events that mutate it

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::connection::{Connection, ConnectionId};
use crate::error::GatewayError;
use crate::metrics::HubMetrics;

/// Log target for lines gated by the `trace` setting
pub const TRACE_TARGET: &str = "gateway::trace";

/// Everything the hub loop can be asked to do
#[derive(Debug)]
pub enum HubEvent {
    Add(Arc<Connection>),
    Remove(Arc<Connection>),
    Error(GatewayError),
    Snapshot(oneshot::Sender<HubSnapshot>),
}

/// Point-in-time view of the registry, answered by the hub loop
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct HubSnapshot {
    pub size: usize,
    pub connection_ids: Vec<u64>,
}

/// `ConnectionId -> Connection` map. Only the broker holds one.
#[derive(Debug, Default)]
pub struct Registry {
    connections: HashMap<ConnectionId, Arc<Connection>>,
    trace: bool,
}

impl Registry {
    pub fn new(trace: bool) -> Self {
        Self {
            connections: HashMap::new(),
            trace,
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn connections(&self) -> impl Iterator<Item = &Arc<Connection>> {
        self.connections.values()
    }

    pub fn snapshot(&self) -> HubSnapshot {
        let mut connection_ids: Vec<u64> = self.connections.keys().map(|id| id.get()).collect();
        connection_ids.sort_unstable();
        HubSnapshot {
            size: self.connections.len(),
            connection_ids,
        }
    }

    /// Apply one event. Never fails and never panics.
    pub fn apply(&mut self, event: HubEvent) {
        match event {
            HubEvent::Add(connection) => {
                let id = connection.id;
                // Last write wins on duplicate ids
                if self.connections.insert(id, connection).is_some() {
                    tracing::debug!(connection_id = %id, "Replaced registry entry with same id");
                }
                HubMetrics::record_registered(self.connections.len());
                if self.trace {
                    tracing::info!(
                        target: TRACE_TARGET,
                        connection_id = %id,
                        clients = self.connections.len(),
                        "Connection registered"
                    );
                }
            }
            HubEvent::Remove(connection) => {
                let id = connection.id;
                if self.connections.remove(&id).is_some() {
                    HubMetrics::record_removed(self.connections.len());
                    HubMetrics::record_connection_duration(
                        (chrono::Utc::now() - connection.connected_at).num_milliseconds() as f64
                            / 1000.0,
                    );
                    if self.trace {
                        tracing::info!(
                            target: TRACE_TARGET,
                            connection_id = %id,
                            clients = self.connections.len(),
                            "Connection removed"
                        );
                    }
                }
            }
            HubEvent::Error(error) => {
                HubMetrics::record_error(error.kind());
                tracing::warn!(kind = error.kind(), error = %error, "Connection error");
            }
            HubEvent::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
        }
    }
}
