use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use meshwatch_server::{Args, Settings};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("meshwatch=info,meshwatch_server=info,meshwatch_core=info,meshwatch_adapters=info")
        }))
        .init();

    let args = Args::parse();
    let mut settings = Settings::load(args.config.as_deref())?;
    settings.apply(&args);

    meshwatch_server::run(settings).await
}
