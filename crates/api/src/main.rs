//! API server entry point.

use std::sync::Arc;

use api::config::{Config, LogFormat, secrets_from_env};
use fanout::{InMemorySecretStore, TracingNotifier};
use order_store::{InMemoryOrderStore, OrderStore, PostgresOrderStore};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

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

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn order_store(config: &Config) -> Result<Arc<dyn OrderStore>, BoxError> {
    let Some(url) = &config.database_url else {
        tracing::info!("DATABASE_URL not set, using in-memory order store");
        return Ok(Arc::new(InMemoryOrderStore::new()));
    };

    let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
    let store = PostgresOrderStore::new(pool);
    store.run_migrations().await?;
    tracing::info!("using PostgreSQL order store");
    Ok(Arc::new(store))
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config = Config::from_env();
    init_tracing(&config);

    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    let orders = order_store(&config).await?;
    let secrets = InMemorySecretStore::new();
    secrets.insert(secrets_from_env(&config.secrets_name)).await;

    let pipeline = api::create_pipeline(
        &config,
        orders,
        Arc::new(secrets),
        Arc::new(TracingNotifier),
    )
    .await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workers: Vec<_> = pipeline
        .workers
        .into_iter()
        .map(|worker| tokio::spawn(worker.run(shutdown_rx.clone())))
        .collect();

    let app = api::create_app(pipeline.state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    for worker in workers {
        if let Err(e) = worker.await {
            tracing::error!(error = %e, "queue worker panicked");
        }
    }

    tracing::info!("server shut down gracefully");
    Ok(())
}
