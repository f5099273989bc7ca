use anyhow::{Context, Result};
use gallery_service::auth::audit_session_changes;
use gallery_service::repository::{PgStore, S3Storage};
use gallery_service::{start_api_server, AppState, Authenticator, Catalog, Config, CookieSettings};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        "Starting Gallery Service"
    );

    // Initialize metrics
    init_metrics(config.service.metrics_port)?;

    // Initialize backends
    let store = Arc::new(
        PgStore::new(&config.database)
            .await
            .context("Failed to initialize database store")?,
    );

    if config.database.run_migrations {
        store
            .run_migrations()
            .await
            .context("Failed to run database migrations")?;
    }

    let storage = Arc::new(
        S3Storage::new(&config.s3)
            .await
            .context("Failed to initialize S3 storage")?,
    );

    let catalog = Arc::new(Catalog::new(
        store.clone(),
        store.clone(),
        storage,
        config.gallery.base_url.clone(),
    ));

    let ttl = chrono::Duration::from_std(config.session_ttl())
        .context("Session TTL out of range")?;
    let auth = Arc::new(Authenticator::new(store.clone(), ttl));

    match (&config.auth.bootstrap_email, &config.auth.bootstrap_password) {
        (Some(email), Some(password)) => {
            auth.ensure_admin(email, password)
                .await
                .context("Failed to bootstrap admin account")?;
        }
        (Some(_), None) | (None, Some(_)) => {
            warn!("Both bootstrap_email and bootstrap_password are needed to bootstrap an admin");
        }
        (None, None) => {}
    }

    let shutdown = CancellationToken::new();

    // Spawn session audit task
    let audit_handle = tokio::spawn(audit_session_changes(
        auth.clone(),
        config.session_sweep_interval(),
        shutdown.clone(),
    ));

    let api_state = AppState {
        catalog,
        auth,
        cookies: CookieSettings {
            name: config.auth.cookie_name.clone(),
            secure: config.auth.secure_cookie,
        },
    };

    // Spawn API server task
    let api_config = config.api.clone();
    let max_upload_bytes = config.gallery.max_upload_bytes;
    let api_shutdown = shutdown.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = start_api_server(api_state, &api_config, max_upload_bytes, api_shutdown).await {
            error!(error = %e, "API server error");
        }
    });

    info!("Gallery service started successfully");

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutting down gallery service");
    shutdown.cancel();

    if let Err(e) = api_handle.await {
        error!(error = %e, "API server task failed");
    }
    if let Err(e) = audit_handle.await {
        error!(error = %e, "Session audit task failed");
    }

    info!("Gallery service stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

    builder
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
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
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
