use crate::cli::ServeArgs;
use crate::infra::{build_messaging, AppState};
use crate::routes::with_messaging_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use campus_messaging::config::{AppConfig, StoreBackend};
use campus_messaging::error::AppError;
use campus_messaging::messaging::DispatcherSupervisor;
use campus_messaging::telemetry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }
    if let Some(database) = args.database.take() {
        config.messaging.store = StoreBackend::parse(&database);
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let messaging = build_messaging(&config.messaging)?;
    let dispatchers = messaging.dispatchers.clone();

    let app = with_messaging_routes(messaging)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(environment = ?config.environment, %addr, "campus messaging service ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(dispatchers.clone(), readiness_flag))
        .await?;

    let report = dispatchers.join().await;
    info!(
        completed = report.completed,
        failed = report.failed,
        "notification streams drained"
    );
    Ok(())
}

/// Resolves on Ctrl-C after closing the notification streams, so open SSE
/// responses end and the server can finish draining.
async fn shutdown_signal(dispatchers: Arc<DispatcherSupervisor>, readiness: Arc<AtomicBool>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }

    info!("shutdown signal received");
    readiness.store(false, Ordering::Release);
    dispatchers.close();
}
