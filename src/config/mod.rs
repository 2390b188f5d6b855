pub mod toml_config;

pub use toml_config::{AppConfig, DatabaseConfig, LogFormat, LoggingConfig, RouterConfig, RpcConfig};

#[cfg(feature = "cli")]
use crate::utils::error::Result;
#[cfg(feature = "cli")]
use clap::Parser;
#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "profile-rpc")]
#[command(about = "Registers profiles over a WAMP router")]
pub struct CliConfig {
    #[arg(long, help = "Path to a TOML configuration file")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Router WebSocket URL, e.g. ws://localhost:8080/ws")]
    pub router_url: Option<String>,

    #[arg(long, help = "Realm to join")]
    pub realm: Option<String>,

    #[arg(long, help = "Store connection string, e.g. sqlite://db.sqlite3")]
    pub database_url: Option<String>,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,
}

#[cfg(feature = "cli")]
impl CliConfig {
    /// File values (or defaults) with command line overrides applied.
    pub fn load(&self) -> Result<AppConfig> {
        let base = match &self.config {
            Some(path) => AppConfig::from_file(path)?,
            None => AppConfig::default(),
        };
        Ok(base.with_overrides(
            self.router_url.clone(),
            self.realm.clone(),
            self.database_url.clone(),
        ))
    }
}

#[cfg(all(test, feature = "cli"))]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_defaults() {
        let cli = CliConfig::parse_from([
            "profile-rpc",
            "--realm",
            "cli-realm",
            "--database-url",
            "sqlite://:memory:",
        ]);
        let config = cli.load().unwrap();
        assert_eq!(config.router.realm, "cli-realm");
        assert_eq!(config.database.url, "sqlite://:memory:");
        assert_eq!(config.router.url, "ws://localhost:8080/ws");
        assert!(!cli.verbose);
    }
}
