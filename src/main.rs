//! Timeclock - Employee time tracking service

use anyhow::Result;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use timeclock::{
    api::{self, AppState},
    config::Config,
    db,
    models::CreateUserInput,
    services::{Clock, SystemClock},
};

/// How often in-memory limiter state and expired tokens are pruned
const CLEANUP_INTERVAL_SECS: u64 = 300;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "timeclock=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting timeclock...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    // Run migrations
    let applied = db::migrations::run_migrations(&pool).await?;
    tracing::info!(applied, "Database migrations completed");

    let state = AppState::new(pool, Arc::new(SystemClock), &config);

    if let Some(admin) = &config.auth.bootstrap_admin {
        state
            .user_service
            .ensure_admin(CreateUserInput {
                username: admin.username.clone(),
                email: admin.email.clone(),
                password: admin.password.clone(),
            })
            .await?;
    }

    // Prune limiter state and expired tokens every few minutes
    {
        let limiter = state.rate_limiter.clone();
        let user_service = state.user_service.clone();
        let clock = state.clock.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(tokio::time::Duration::from_secs(CLEANUP_INTERVAL_SECS));
            loop {
                interval.tick().await;
                limiter.cleanup(clock.now()).await;
                match user_service.cleanup_expired_tokens().await {
                    Ok(0) => {}
                    Ok(removed) => tracing::debug!(removed, "Expired tokens removed"),
                    Err(e) => tracing::warn!("Token cleanup failed: {}", e),
                }
            }
        });
    }

    let app = api::build_router(state, &config.server.cors_origin)?;

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
