use std::net::SocketAddr;

use axum::{
    extract::{ws::WebSocket, ConnectInfo, State, WebSocketUpgrade},
    http::{Extensions, HeaderMap, Uri},
    response::{IntoResponse, Response},
};
use futures::StreamExt;

use crate::auth::RequestContext;
use crate::error::GatewayError;
use crate::server::AppState;

use super::listener::serve_connection;

/// WebSocket upgrade handler mounted at `server.root`
#[tracing::instrument(
    name = "ws.upgrade",
    skip_all,
    fields(path = %uri.path())
)]
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    extensions: Extensions,
) -> Response {
    if state.hub.is_closed() {
        tracing::debug!("Hub closed, refusing upgrade");
        return GatewayError::HubClosed.into_response();
    }

    // Only present when served with connect info
    let remote_addr = extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let request = RequestContext::from_request(&uri, &headers, remote_addr);

    tracing::debug!(
        remote_addr = ?remote_addr,
        has_token = request.token.is_some(),
        "WebSocket upgrade requested"
    );

    ws.on_upgrade(move |socket| handle_socket(socket, state, request))
}

#[tracing::instrument(
    name = "ws.connection",
    skip_all,
    fields(otel.kind = "server")
)]
async fn handle_socket(socket: WebSocket, state: AppState, request: RequestContext) {
    let (sink, stream) = socket.split();
    let outcome = serve_connection(state, request, sink, stream).await;
    tracing::debug!(outcome = ?outcome, "WebSocket task finished");
}
