use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;

use stream_gateway::config::Settings;
use stream_gateway::hub::{Broker, HubConfig};
use stream_gateway::server::{create_app, AppState};
use stream_gateway::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::new().context("Failed to load configuration")?;
    let _telemetry = init_telemetry(&settings.otel, &settings.log)?;
    tracing::info!(
        gateway_id = %settings.id,
        index = settings.index,
        trace = settings.trace,
        "Configuration loaded"
    );

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let (broker, hub) = Broker::new(HubConfig::from(&settings), shutdown_rx);

    // Fatal configuration errors stop here, before anything is bound
    let state = match AppState::new(settings.clone(), hub) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "Invalid gateway configuration");
            return Err(e.into());
        }
    };
    let publisher = state.publisher.clone();

    let broker_handle = tokio::spawn(broker.run());
    tracing::info!("Hub started");

    let app = create_app(state);

    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(root = %settings.server.root, "Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal_handler(shutdown_tx))
    .await?;

    tracing::info!("Waiting for hub to drain...");
    match broker_handle.await {
        Ok(report) => tracing::info!(
            registered_at_shutdown = report.registered_at_shutdown,
            remaining = report.remaining,
            timed_out = report.timed_out,
            duration_ms = report.duration.as_millis() as u64,
            "Hub drained"
        ),
        Err(e) => tracing::error!(error = %e, "Hub task failed"),
    }

    if let Err(e) = publisher.flush().await {
        tracing::warn!(error = %e, "Final publisher flush failed");
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal_handler(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }

    // Close registered connections so their upgrade tasks can finish
    let _ = shutdown_tx.send(());
}
