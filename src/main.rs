mod config;
mod handlers;
mod models;
mod services;
mod web; // Upload form + JSON API

use anyhow::{Context, Result};
use dotenv::dotenv;
use std::sync::Arc;

use config::Config;
use handlers::{sweeper::DEFAULT_SWEEP_SCHEDULE, SessionRegistry, SessionSweeper};
use services::{GeminiClient, GenerativeModel};
use web::server::create_router;

#[tokio::main]
async fn main() -> Result<()> {
    // .env first so RUST_LOG from it applies
    dotenv().ok();
    env_logger::init();

    log::info!("🚀 Starting Cardiology Scan Analyst...");

    let config = Config::from_env()?;

    let gemini = GeminiClient::new(config.api_url.clone(), config.api_key.clone(), config.request_timeout)
        .context("Failed to build the Gemini HTTP client")?;
    log::info!("✅ Gemini client initialized: {}", gemini.api_url());

    let model: Arc<dyn GenerativeModel> = Arc::new(gemini);
    let registry = Arc::new(SessionRegistry::new(model));

    let mut sweeper = SessionSweeper::new(registry.clone(), config.session_idle).await?;
    sweeper.start(DEFAULT_SWEEP_SCHEDULE).await?;

    let app = create_router(registry.clone(), config.max_upload_bytes);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;

    log::info!("🌐 Web server listening on http://{}", config.bind_addr);
    println!("\n🫀 Cardiology Scan Analyst is running: http://{}", config.bind_addr);
    println!("🛑 Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("Web server failed")?;

    log::info!("🛑 Shutting down ({} open session(s))...", registry.len());
    sweeper.stop().await?;

    Ok(())
}
