//! In-memory publisher backend.
//!
//! Records are kept in memory and lost on restart. Used for local runs and
//! tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use crate::connection::ConnectionId;
use crate::error::GatewayError;
use crate::metrics::PublishMetrics;

use super::{PublishedRecord, Publisher};

const DEFAULT_MAX_RECORDS: usize = 10_000;

/// Keeps the most recent records; the oldest are dropped when full.
pub struct MemoryPublisher {
    records: Mutex<VecDeque<PublishedRecord>>,
    max_records: usize,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_RECORDS)
    }

    pub fn with_capacity(max_records: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::new()),
            max_records: max_records.max(1),
        }
    }

    pub fn records(&self) -> Vec<PublishedRecord> {
        match self.records.lock() {
            Ok(records) => records.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Publisher for MemoryPublisher {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn publish(
        &self,
        connection_id: ConnectionId,
        payload: Bytes,
    ) -> Result<(), GatewayError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| GatewayError::Internal("memory publisher lock poisoned".to_string()))?;

        if records.len() >= self.max_records {
            records.pop_front();
        }
        records.push_back(PublishedRecord::new(connection_id, payload));
        PublishMetrics::record_published();

        tracing::trace!(
            connection_id = %connection_id,
            buffered = records.len(),
            "Payload recorded by memory publisher"
        );
        Ok(())
    }

    async fn flush(&self) -> Result<(), GatewayError> {
        Ok(())
    }
}
