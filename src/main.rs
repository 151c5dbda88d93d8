use clap::Parser;
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

use bucket_buddies::config::{Cli, Config};
use bucket_buddies::db;
use bucket_buddies::routes;
use bucket_buddies::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli)?;
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;
    tracing::info!(
        "Matching: threshold {}, reset status {}, fail open {}, tie break {:?}",
        config.matching.similarity_threshold,
        config.matching.reset_status_on_refresh,
        config.matching.fail_open,
        config.matching.tie_break
    );

    // Initialize database
    let pool = db::create_pool(&config.db_path())?;
    db::run_migrations(&pool)?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let app = routes::app(AppState::from_pool(pool, config));

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
