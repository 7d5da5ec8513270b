//! API server entry point.

use std::sync::Arc;

use api::config::{Config, LogFormat};
use api::{AppState, Backends};
use keyspace::{InMemoryKeyValueStore, KeyValueStore, RedisKeyValueStore};
use ledger::{InMemoryStockLedger, InventoryStore, PostgresStockLedger};
use reservation::CoordinatorConfig;
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

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn open_ledger(config: &Config) -> (Arc<dyn InventoryStore>, &'static str) {
    match &config.database_url {
        Some(url) => {
            let ledger = PostgresStockLedger::connect(url, config.db_max_connections)
                .await
                .expect("failed to connect to PostgreSQL");
            ledger
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("using PostgreSQL ledger");
            (Arc::new(ledger), "postgres")
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory ledger");
            (Arc::new(InMemoryStockLedger::new()), "memory")
        }
    }
}

async fn open_keyspace(config: &Config) -> (Arc<dyn KeyValueStore>, &'static str) {
    match &config.redis_url {
        Some(url) => {
            let store = RedisKeyValueStore::connect(url)
                .await
                .expect("failed to connect to Redis");
            tracing::info!("using Redis keyspace");
            (Arc::new(store), "redis")
        }
        None => {
            tracing::warn!("REDIS_URL not set, using in-memory keyspace (single replica only)");
            (Arc::new(InMemoryKeyValueStore::new()), "memory")
        }
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Open backends and build application state
    let (store, ledger_backend) = open_ledger(&config).await;
    let (keyspace, keyspace_backend) = open_keyspace(&config).await;
    let state = Arc::new(AppState::new(
        store,
        keyspace,
        CoordinatorConfig::default(),
        Backends {
            ledger: ledger_backend,
            keyspace: keyspace_backend,
        },
    ));

    // 4. Release expired reservations in the background
    let sweeper = config.expiry_sweep_interval().map(|period| {
        tracing::info!(period_secs = period.as_secs(), "starting expiry sweeper");
        tokio::spawn(reservation::run_expiry_sweeper(
            Arc::clone(&state.coordinator),
            period,
        ))
    });

    // 5. Build the application
    let app = api::create_app(state, metrics_handle);

    // 6. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }

    tracing::info!("server shut down gracefully");
}
