mod app;
mod bot;
mod config;
mod domain;
mod error;
mod logging;
mod middleware;
mod routes;
mod services;
mod telegram;

use anyhow::{Context, Result};

// A single-threaded runtime: user sessions interleave at await points.
#[tokio::main(flavor = "current_thread")]
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
        "Starting invoice bot"
    );

    for dir in [&settings.temp_dir, &settings.excel_dir, &settings.json_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }

    let bot = app::build_bot(&settings)?;
    let state = app::AppState::new(settings.clone(), bot);
    let app = app::create_app(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&settings.server_addr).await?;
    tracing::info!("Listening on {}", settings.server_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
