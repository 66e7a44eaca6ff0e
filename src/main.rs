mod api;
mod app;
mod config;
mod db;
mod domain;
mod error;
mod logging;
mod middleware;
mod routes;
mod services;

use anyhow::Result;

use services::{BioClient, RosterClient};

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
        "Starting Rollcall backend"
    );

    // Create database pool and apply migrations
    let pool = db::create_pool(&settings).await?;
    db::run_migrations(&pool).await?;

    // Create bio generator client
    let bio = BioClient::new(
        &settings.bio_service_url,
        &settings.bio_service_token,
        settings.bio_service_timeout_seconds,
    )?;

    // Create roster lookup client
    let roster = RosterClient::new(
        &settings.roster_service_url,
        &settings.roster_service_token,
        settings.roster_service_timeout_seconds,
    )?;

    // Optionally check collaborator health (non-blocking); imports fall back
    // to synthesized values when either service is down.
    tokio::spawn({
        let bio = bio.clone();
        let roster = roster.clone();
        async move {
            match bio.health_check().await {
                Ok(()) => tracing::info!("Bio service is healthy"),
                Err(e) => tracing::warn!(error = %e, "Bio service health check failed - imports will use the fallback bio"),
            }
            match roster.health_check().await {
                Ok(()) => tracing::info!("Roster service is healthy"),
                Err(e) => tracing::warn!(error = %e, "Roster service health check failed - imports will synthesize roster ids"),
            }
        }
    });

    // Create application state
    let state = app::AppState::new(pool, settings.clone(), bio, roster);

    // Build application
    let app = app::create_app(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&settings.server_addr).await?;
    tracing::info!("Listening on {}", settings.server_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
