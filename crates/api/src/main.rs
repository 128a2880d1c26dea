//! Fulfillment server entry point.

use std::time::Duration;

use api::{AppRuntime, Config};
use common::Clock as _;
use store::{IdempotencyStore, SessionStore};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    if config.payment_webhook_secret.is_none() {
        if config.webhook_allow_unverified {
            tracing::warn!("webhook signature verification DISABLED (development mode)");
        } else {
            tracing::warn!(
                "no PAYMENT_WEBHOOK_SECRET configured; webhook requests will be rejected"
            );
        }
    }

    // 3. Wire stores, saga machinery and HTTP surface
    let runtime = AppRuntime::from_config(&config);

    // 4. Background work: abandoned-cart reaper and TTL sweeps
    let reaper_interval = Duration::from_secs(config.reaper_interval_seconds);
    tokio::spawn(runtime.reaper.clone().run(reaper_interval));

    let idempotency = runtime.idempotency.clone();
    let sessions = runtime.sessions.clone();
    let clock = runtime.context.clock.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(3600));
        loop {
            ticker.tick().await;
            let now = clock.now_epoch();
            if let Err(err) = idempotency.purge_expired(now).await {
                tracing::error!(error = %err, "idempotency TTL sweep failed");
            }
            if let Err(err) = sessions.purge_expired(now).await {
                tracing::error!(error = %err, "session TTL sweep failed");
            }
        }
    });

    // 5. Build and start the server
    let app = api::create_app(runtime.context.clone(), metrics_handle);
    let addr = config.addr();
    tracing::info!(%addr, "starting fulfillment server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("server shut down gracefully");
}
