use anyhow::Result;
use clap::Parser;
use tracing::info;

mod app;

#[derive(Parser, Debug)]
#[command(author, version, about = "rmstore - music library store", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Store file, overriding the configured one
    #[arg(short, long)]
    db: Option<String>,

    /// Empty the store before starting
    #[arg(long)]
    reset: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        rmstore_core::config::Config::load_from_path(config_path)?
    } else {
        rmstore_core::config::Config::load_or_default()
    };

    // Initialize logging
    let log_level = if args.verbose {
        "debug".to_owned()
    } else {
        config.general.log_level.clone()
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .init();

    info!("Starting rmstore v{}", env!("CARGO_PKG_VERSION"));

    // Override with CLI arguments
    if let Some(db) = args.db {
        config.general.db_file = db.into();
    }

    info!("Configuration loaded");
    info!("Database: {}", config.general.db_file);

    app::run(config, args.reset).await?;

    Ok(())
}
