use crowd_sentinel::alert::{AlertEngine, AlertEvent};
use crowd_sentinel::api::{self, ApiContext};
use crowd_sentinel::config;
use crowd_sentinel::ingest::IngestionGateway;
use crowd_sentinel::state::ZoneStore;
use crowd_sentinel::status::StatusAggregator;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| config::DEFAULT_CONFIG_PATH.to_string());
    let config = config::load_from_path(&config_path)?;
    init_tracing(&config.logging.level);
    tracing::info!(
        config_path = %config_path,
        app = %config.app.name,
        "crowd-sentinel starting"
    );

    let registry = Arc::new(config.zone_registry()?);
    tracing::info!(zones = registry.zones().len(), "Zone registry loaded");

    let store = Arc::new(ZoneStore::new(
        Arc::clone(&registry),
        config.history_capacity(),
    ));
    let gateway = Arc::new(
        IngestionGateway::new(Arc::clone(&store), AlertEngine::new(config.alert_policy()))
            .with_max_future_skew(config.max_future_skew()),
    );
    let aggregator = StatusAggregator::new(store, config.status_settings());

    let alert_feed = tokio::spawn(log_alert_events(gateway.subscribe_alerts()));

    let app = api::router(ApiContext::new(Arc::clone(&gateway), aggregator));
    let port = config.server_port();
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Dropping the last gateway handle closes the alert channel.
    drop(gateway);
    let _ = alert_feed.await;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn log_alert_events(mut events: broadcast::Receiver<AlertEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => {
                let alert = event.alert();
                let kind = match &event {
                    AlertEvent::Raised(_) => "raised",
                    AlertEvent::Escalated(_) => "escalated",
                    AlertEvent::Downgraded(_) => "downgraded",
                    AlertEvent::Cleared { .. } => "cleared",
                };
                tracing::info!(
                    alert_id = %alert.id,
                    zone_id = %alert.zone_id,
                    severity = ?alert.severity,
                    kind,
                    "Alert feed"
                );
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Alert feed lagging, events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
