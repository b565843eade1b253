//! CLI entry point running one capture session against the assembly service.

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = framerelay::config::CliArgs::parse();
    let config = framerelay::config::AppConfig::load(cli).await?;

    let receipt = match framerelay::run(config).await {
        Ok(receipt) => receipt,
        Err(error) => {
            tracing::error!(error = %error, "capture session failed");
            return Err(error.into());
        }
    };
    tracing::info!(
        session = %receipt.session_id,
        content_id = %receipt.content_id,
        bytes = receipt.size,
        "{}",
        receipt.public_reference
    );
    Ok(())
}
