use anyhow::Result;
use std::sync::Arc;

use homebid_backend::store::{DocumentStore, MemoryStore, PgDocumentStore};
use homebid_backend::{app, config, db, logging, services::Services};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = config::Settings::from_env()?;

    // Initialize logging
    logging::init_logging(&settings.env);

    tracing::info!(
        env = ?settings.env,
        server_addr = %settings.server_addr,
        "Starting HomeBid backend"
    );

    // Document store: Postgres when configured, in-memory otherwise
    let store: Arc<dyn DocumentStore> = match &settings.database_url {
        Some(url) => {
            let pool = db::create_pool(url, settings.database_max_connections).await?;
            Arc::new(PgDocumentStore::connect(pool).await?)
        }
        None => {
            tracing::warn!("DATABASE_URL not set - using in-memory document store");
            Arc::new(MemoryStore::new())
        }
    };

    let services = Services::new(store, settings.retry_policy());

    // Create application state
    let state = app::AppState::new(services, settings.clone());

    // Build application
    let app = app::create_app(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&settings.server_addr).await?;
    tracing::info!("Listening on {}", settings.server_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
