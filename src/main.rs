use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use usuarios_api::config::Config;
use usuarios_api::db::Database;
use usuarios_api::handlers::AppState;
use usuarios_api::metrics::Metrics;
use usuarios_api::routes;
use usuarios_api::services::{ViaCepService, VIACEP_BASE_URL};

/// Main entry point for the application.
///
/// This function initializes the application, including:
/// - Logging and tracing.
/// - Configuration loading.
/// - Database connection (with startup retry) and schema bootstrap.
/// - Metrics registry and the ViaCEP client.
/// - HTTP routes and middleware.
///
/// It then starts the Axum server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "usuarios_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize database connection pool
    let db = Database::new(config.connect_options()).await?;
    tracing::info!("Database connection pool established");

    let metrics = Arc::new(Metrics::new());
    let cep_service = ViaCepService::new(VIACEP_BASE_URL)?;
    tracing::info!("ViaCEP client initialized: {}", VIACEP_BASE_URL);

    // Build application state
    let app_state = Arc::new(AppState {
        db: db.pool.clone(),
        config: config.clone(),
        metrics,
        cep_service,
    });

    let app = routes::app(app_state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
