mod config;
mod db;
mod error;
mod executor;
mod extract;
mod handlers;
mod models;
mod openai;
mod orchestrator;
mod registry;
mod schema;
mod schema_format;
mod store;
mod visualization;

#[cfg(test)]
mod test_support;

use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::executor::AnalyticsDb;
use crate::openai::OpenAiClient;
use crate::orchestrator::Orchestrator;
use crate::registry::AssistantRegistry;
use crate::store::{ChatStore, PgStore};

#[derive(Parser, Debug, Clone)]
#[command(name = "sql-agent-backend")]
#[command(about = "SQL agent backend server")]
struct Args {
    /// Path to frontend dist directory to serve
    #[arg(long, default_value = "frontend/dist")]
    frontend_dist: String,

    /// Do not apply pending migrations on start-up
    #[arg(long)]
    skip_migrations: bool,
}

pub struct AppState {
    pub registry: AssistantRegistry,
    pub chats: Arc<dyn ChatStore>,
    pub orchestrator: Orchestrator,
    /// Fired on shutdown; in-flight turns stop polling
    pub shutdown: CancellationToken,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sql_agent_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    // Record store and analytics database
    let pool = db::create_pool(&config.database_url)?;
    let analytics_pool = db::create_pool(&config.analytics_database_url)?;

    if args.skip_migrations {
        tracing::warn!("Skipping database migrations");
    } else {
        for migration in db::run_migrations(&pool)? {
            tracing::info!("Applied migration {}", migration);
        }
    }

    let api = Arc::new(OpenAiClient::new(
        &config.openai_base_url,
        &config.openai_api_key,
    )?);
    let store = Arc::new(PgStore::new(pool));
    let executor = Arc::new(AnalyticsDb::new(analytics_pool));
    let shutdown = CancellationToken::new();

    let app_state = Arc::new(AppState {
        registry: AssistantRegistry::new(store.clone(), api.clone(), config.default_model.clone()),
        chats: store,
        orchestrator: Orchestrator::new(api, executor, config.poll_policy),
        shutdown: shutdown.clone(),
    });

    // Setup CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = handlers::router(app_state);

    // Serve frontend static files if path exists
    if std::path::Path::new(&args.frontend_dist).exists() {
        tracing::info!("Serving frontend from: {}", args.frontend_dist);
        app = app.nest_service("/app", ServeDir::new(&args.frontend_dist));
    } else {
        tracing::warn!("Frontend dist not found at: {}", args.frontend_dist);
    }

    let app = app.layer(TraceLayer::new_for_http()).layer(cors);

    // Run the server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
    shutdown.cancel();
}
