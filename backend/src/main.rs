//! Pharmacy Inventory Ledger - Backend Server

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ledger_backend::config::StoreBackend;
use ledger_backend::models::CatalogSeed;
use ledger_backend::{create_app, AppState, Config, LedgerStore, MemoryLedgerStore, PgLedgerStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "ledger_server=debug,ledger_backend=debug,tower_http=debug,sqlx=warn".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::load()?;

    tracing::info!("Starting Pharmacy Ledger Server");
    tracing::info!("Environment: {}", config.environment);

    let store = build_store(&config).await?;
    tracing::info!("Ledger store ready: {}", store.backend_name());

    // Create application state
    let state = AppState {
        store,
        config: Arc::new(config.clone()),
    };

    // Build application
    let app = create_app(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid server.host / server.port")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn build_store(config: &Config) -> anyhow::Result<Arc<dyn LedgerStore>> {
    match config.store.backend {
        StoreBackend::Postgres => {
            tracing::info!("Connecting to database...");
            let db_pool = PgPoolOptions::new()
                .max_connections(config.database.max_connections)
                .min_connections(config.database.min_connections)
                .acquire_timeout(Duration::from_secs(30))
                .connect(&config.database.url)
                .await?;
            tracing::info!("Database connection established");

            // Run migrations in development
            if config.environment == "development" {
                tracing::info!("Running database migrations...");
                sqlx::migrate!("./migrations").run(&db_pool).await?;
                tracing::info!("Migrations completed");
            }

            Ok(Arc::new(PgLedgerStore::new(db_pool)))
        }
        StoreBackend::Memory => {
            let store = MemoryLedgerStore::new();
            if let Some(path) = &config.store.seed_path {
                let raw = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("reading catalog seed {}", path))?;
                let catalog = CatalogSeed::from_json(&raw)?;
                tracing::info!(
                    products = catalog.products.len(),
                    locations = catalog.locations.len(),
                    parties = catalog.parties.len(),
                    "Seeding memory store"
                );
                store.seed(catalog).await;
            } else {
                tracing::warn!("Memory store started without a catalog seed");
            }
            Ok(Arc::new(store))
        }
    }
}
