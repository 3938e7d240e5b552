use std::fmt;
use std::sync::Arc;

use axum::extract::ws::Message;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::sync::watch;

use crate::error::GatewayError;
use crate::publisher::Publisher;

use super::lifecycle::ConnectionState;
use super::types::{CloseReason, Connection};

/// Read loop for one registered connection.
pub struct Session {
    connection: Arc<Connection>,
    publisher: Arc<dyn Publisher>,
}

impl Session {
    pub fn new(connection: Arc<Connection>, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            connection,
            publisher,
        }
    }

    /// Pump `stream` until the peer closes, a read fails, or the connection
    /// is asked to close. Always submits Remove before returning.
    #[tracing::instrument(
        name = "gateway.session",
        skip(self, stream),
        fields(connection_id = %self.connection.id)
    )]
    pub async fn run<S, E>(self, mut stream: S) -> CloseReason
    where
        S: Stream<Item = Result<Message, E>> + Unpin,
        E: fmt::Display,
    {
        if let Err(e) = self.connection.advance(ConnectionState::Streaming) {
            self.connection.report(e).await;
        }

        let mut close_signal = self.connection.close_signal();

        let reason = loop {
            tokio::select! {
                _ = close_requested(&mut close_signal) => {
                    tracing::debug!(connection_id = %self.connection.id, "Close requested");
                    break CloseReason::Shutdown;
                }
                item = stream.next() => match item {
                    None => break CloseReason::PeerClosed,
                    Some(Ok(message)) => {
                        if !self.process_message(message).await {
                            break CloseReason::PeerClosed;
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!(
                            connection_id = %self.connection.id,
                            error = %e,
                            "WebSocket receive error"
                        );
                        self.connection
                            .report(GatewayError::Protocol(format!(
                                "connection {}: {}",
                                self.connection.id, e
                            )))
                            .await;
                        break CloseReason::ProtocolError;
                    }
                },
            }
        };

        self.finish(reason).await
    }

    /// Returns false if the connection should be closed
    async fn process_message(&self, message: Message) -> bool {
        match message {
            Message::Text(text) => {
                self.connection.update_activity();
                self.forward(Bytes::copy_from_slice(text.as_str().as_bytes()))
                    .await;
                true
            }
            Message::Binary(payload) => {
                self.connection.update_activity();
                self.forward(payload).await;
                true
            }
            Message::Ping(_) | Message::Pong(_) => {
                // Axum answers pings itself
                self.connection.update_activity();
                true
            }
            Message::Close(_) => {
                tracing::debug!(connection_id = %self.connection.id, "Received close frame");
                false
            }
        }
    }

    async fn forward(&self, payload: Bytes) {
        if let Err(e) = self.publisher.publish(self.connection.id, payload).await {
            let error = match e {
                GatewayError::Upstream(_) => e,
                other => GatewayError::Upstream(other.to_string()),
            };
            self.connection.report(error).await;
        }
    }

    async fn finish(self, reason: CloseReason) -> CloseReason {
        if let Err(e) = self.connection.advance(ConnectionState::Closing) {
            tracing::debug!(connection_id = %self.connection.id, error = %e, "Unexpected state on close");
        }

        if let Err(e) = self.connection.unregister().await {
            tracing::debug!(
                connection_id = %self.connection.id,
                error = %e,
                "Could not submit removal"
            );
        }

        let duration = chrono::Utc::now() - self.connection.connected_at;
        tracing::info!(
            connection_id = %self.connection.id,
            reason = %reason,
            duration_secs = duration.num_seconds(),
            "Connection session ended"
        );

        reason
    }
}

/// Resolves once the close flag is set, or when its sender is gone.
async fn close_requested(signal: &mut watch::Receiver<bool>) {
    let _ = signal.wait_for(|closed| *closed).await;
}
