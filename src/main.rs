use clap::Parser;
use profile_rpc::domain::ports::{ConfigProvider, Store};
use profile_rpc::utils::{logger, validation::Validate};
use profile_rpc::{CliConfig, Component, RegisterProfileEndpoint, SqliteStore};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    let config = match cli.load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    logger::init_logger(config.logging.format, cli.verbose);

    tracing::info!("Starting profile-rpc");
    if cli.verbose {
        tracing::debug!("Config: {:?}", config);
    }

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        eprintln!("❌ {}", e);
        std::process::exit(1);
    }

    let store: Arc<dyn Store> = Arc::new(SqliteStore::connect(config.database_url())?);
    let endpoint = Arc::new(RegisterProfileEndpoint::new(config.procedure(), store)?);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
        }
    };

    Component::new(&config)
        .on_join(endpoint.clone())
        .register(endpoint)
        .run(shutdown)
        .await?;

    tracing::info!("✅ Session closed");
    Ok(())
}
