//! Per-stream protocol run by the upgraded task.
//!
//! One accepted stream goes through the auth gate, is registered with the
//! hub, runs its session, and has its sink closed exactly once.

use std::fmt;
use std::sync::Arc;

use axum::extract::ws::Message;
use futures::{Sink, SinkExt, Stream};

use crate::auth::RequestContext;
use crate::connection::{CloseReason, Connection, ConnectionState, Session};
use crate::error::GatewayError;
use crate::hub::TRACE_TARGET;
use crate::metrics::HubMetrics;
use crate::server::AppState;

/// How a served stream ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerOutcome {
    /// The auth gate refused the request; nothing was registered
    Rejected,
    /// The hub stopped before the connection could be registered
    HubUnavailable,
    /// The session ran and ended for this reason
    Closed(CloseReason),
}

pub async fn serve_connection<Tx, Rx, E>(
    state: AppState,
    request: RequestContext,
    mut sink: Tx,
    stream: Rx,
) -> ListenerOutcome
where
    Tx: Sink<Message> + Unpin,
    Tx::Error: fmt::Display,
    Rx: Stream<Item = Result<Message, E>> + Unpin,
    E: fmt::Display,
{
    let connection = Arc::new(Connection::accepted(
        state.ids.next_id(),
        request.remote_addr,
        state.hub.clone(),
    ));

    let outcome = if state.authenticator.validate(&request).await {
        admit(&state, &connection, stream).await
    } else {
        reject(&state, &connection, &request).await;
        ListenerOutcome::Rejected
    };

    close_sink(&mut sink, &connection).await;
    if let Err(e) = connection.advance(ConnectionState::Closed) {
        tracing::debug!(connection_id = %connection.id, error = %e, "Unexpected state after close");
    }

    outcome
}

async fn admit<Rx, E>(state: &AppState, connection: &Arc<Connection>, stream: Rx) -> ListenerOutcome
where
    Rx: Stream<Item = Result<Message, E>> + Unpin,
    E: fmt::Display,
{
    // Waits here while the add channel is full
    if let Err(e) = connection.register().await {
        tracing::debug!(connection_id = %connection.id, error = %e, "Hub unavailable, dropping connection");
        let _ = connection.advance(ConnectionState::Closing);
        return ListenerOutcome::HubUnavailable;
    }
    if let Err(e) = connection.advance(ConnectionState::Registered) {
        connection.report(e).await;
    }

    tracing::info!(
        connection_id = %connection.id,
        remote_addr = ?connection.remote_addr,
        "Stream connection established"
    );

    let reason = Session::new(connection.clone(), state.publisher.clone())
        .run(stream)
        .await;
    ListenerOutcome::Closed(reason)
}

async fn reject(state: &AppState, connection: &Arc<Connection>, request: &RequestContext) {
    HubMetrics::record_auth_rejection();

    if state.settings.trace {
        tracing::info!(
            target: TRACE_TARGET,
            connection_id = %connection.id,
            remote_addr = ?request.remote_addr,
            path = %request.path,
            clients = state.hub.size(),
            "unauthorized connection rejected"
        );
    } else {
        tracing::warn!(
            connection_id = %connection.id,
            remote_addr = ?request.remote_addr,
            "Rejected unauthorized connection"
        );
    }

    let _ = connection.advance(ConnectionState::Closing);
    connection
        .report(GatewayError::Authentication(format!(
            "{} rejected for {}",
            state.authenticator.method(),
            request
                .remote_addr
                .map(|a| a.to_string())
                .unwrap_or_else(|| "unknown peer".to_string())
        )))
        .await;
}

async fn close_sink<Tx>(sink: &mut Tx, connection: &Connection)
where
    Tx: Sink<Message> + Unpin,
    Tx::Error: fmt::Display,
{
    if let Err(e) = sink.close().await {
        connection
            .report(GatewayError::TransportClose(e.to_string()))
            .await;
    }
}
