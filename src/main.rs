use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use axum::extract::Request;
use axum::ServiceExt;
use pkm_hub::{
    api,
    config::Config,
    dispatcher::TaskDispatcher,
    github::GitHubClient,
    notify::{HttpNotifier, Notifier},
    object_store as obj,
    storage::Database,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    match log_format.to_lowercase().as_str() {
        "gcp" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_stackdriver::layer())
                .init();
        }
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_span_list(false),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    info!(version = env!("CARGO_PKG_VERSION"), "pkm-hub starting");

    // Load configuration
    let config = Config::load()?;

    // Initialize database
    let db = Database::open(&config.node.data_dir)?
        .with_event_capacity(config.limits.event_log_capacity);
    info!("Database opened at: {}", config.node.data_dir);

    // Blob storage for uploads
    let object_store: Arc<dyn obj::ObjectStore> =
        Arc::new(obj::LocalStore::new(&config.storage.upload_dir)?);
    info!("Storing uploads in: {}", config.storage.upload_dir);

    // Outbound integrations
    let github = config
        .github
        .token
        .as_deref()
        .map(|token| GitHubClient::new(&config.github.api_url, token))
        .transpose()?;
    let notifier: Arc<dyn Notifier> = Arc::new(HttpNotifier::new(
        config.notify.clone(),
        &config.github,
        github.clone(),
    )?);

    let dispatcher = TaskDispatcher::new(db.clone(), &config, Arc::clone(&notifier));

    // Create shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        dispatcher,
        github,
        notifier,
        object_store,
    });

    // Build and start the HTTP server
    let app = api::create_app(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(&config.node.bind_address).await?;
    info!("Listening on: {}", config.node.bind_address);

    axum::serve(listener, ServiceExt::<Request>::into_make_service(app))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
