use clap::Parser;
use log::{error, info};
use std::sync::Arc;

use playstore_dashboard::{Dashboard, Dataset, ServerConfig, app};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::parse();

    // RUST_LOG takes precedence over the verbosity flag
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.default_log_level()),
    )
    .init();

    info!("Loading dataset from {}", config.dataset.display());
    let dataset = match Dataset::load(&config.dataset) {
        Ok(dataset) => dataset,
        Err(e) => {
            error!("{}", e);
            return Err(e.into());
        }
    };

    let dashboard = Dashboard::build(Arc::new(dataset))?;

    // Start the web application
    app::run(&config, dashboard).await?;

    Ok(())
}
