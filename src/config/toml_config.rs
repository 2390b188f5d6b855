use crate::core::endpoint::REGISTER_PROCEDURE;
use crate::domain::ports::ConfigProvider;
use crate::utils::error::{Result, ServiceError};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub router: RouterConfig,
    pub database: DatabaseConfig,
    pub rpc: RpcConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub url: String,
    pub realm: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8080/ws".to_string(),
            realm: "realm1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://db.sqlite3".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    pub procedure: String,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            procedure: REGISTER_PROCEDURE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl AppConfig {
    /// Loads the configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(ServiceError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// Parses the configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| ServiceError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replaces `${VAR}` placeholders; unset variables stay as written
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ServiceError::ConfigError {
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// Command line values take precedence over the file
    pub fn with_overrides(
        mut self,
        router_url: Option<String>,
        realm: Option<String>,
        database_url: Option<String>,
    ) -> Self {
        if let Some(url) = router_url {
            self.router.url = url;
        }
        if let Some(realm) = realm {
            self.router.realm = realm;
        }
        if let Some(url) = database_url {
            self.database.url = url;
        }
        self
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_websocket_url("router.url", &self.router.url)?;
        validation::validate_non_empty_string("router.realm", &self.router.realm)?;
        validation::validate_database_url("database.url", &self.database.url)?;
        validation::validate_non_empty_string("rpc.procedure", &self.rpc.procedure)?;
        Ok(())
    }
}

impl ConfigProvider for AppConfig {
    fn router_url(&self) -> &str {
        &self.router.url
    }

    fn realm(&self) -> &str {
        &self.router.realm
    }

    fn database_url(&self) -> &str {
        &self.database.url
    }

    fn procedure(&self) -> &str {
        &self.rpc.procedure
    }
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();

        assert_eq!(config.router_url(), "ws://localhost:8080/ws");
        assert_eq!(config.realm(), "realm1");
        assert_eq!(config.database_url(), "sqlite://db.sqlite3");
        assert_eq!(config.procedure(), "io.crossbar.register");
        assert_eq!(config.logging.format, LogFormat::Compact);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let toml_content = r#"
[router]
url = "wss://router.example.com/ws"
realm = "profiles"

[database]
url = "sqlite://:memory:"

[rpc]
procedure = "com.example.register"

[logging]
format = "json"
"#;

        let config = AppConfig::from_toml_str(toml_content).unwrap();

        assert_eq!(config.router.url, "wss://router.example.com/ws");
        assert_eq!(config.router.realm, "profiles");
        assert_eq!(config.database.url, "sqlite://:memory:");
        assert_eq!(config.rpc.procedure, "com.example.register");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("PROFILE_RPC_TEST_REALM", "from-env");

        let toml_content = r#"
[router]
realm = "${PROFILE_RPC_TEST_REALM}"

[database]
url = "sqlite://${PROFILE_RPC_TEST_UNSET_VAR}"
"#;

        let config = AppConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.router.realm, "from-env");
        assert_eq!(config.database.url, "sqlite://${PROFILE_RPC_TEST_UNSET_VAR}");

        std::env::remove_var("PROFILE_RPC_TEST_REALM");
    }

    #[test]
    fn test_overrides_take_precedence() {
        let config = AppConfig::default().with_overrides(
            Some("ws://127.0.0.1:9000/ws".to_string()),
            None,
            Some("sqlite://other.sqlite3".to_string()),
        );
        assert_eq!(config.router.url, "ws://127.0.0.1:9000/ws");
        assert_eq!(config.router.realm, "realm1");
        assert_eq!(config.database.url, "sqlite://other.sqlite3");
    }

    #[test]
    fn test_config_validation() {
        let config = AppConfig::from_toml_str(
            r#"
[router]
url = "http://localhost:8080/ws"
"#,
        )
        .unwrap();
        assert!(config.validate().is_err());

        let config = AppConfig::from_toml_str(
            r#"
[database]
url = "postgres://localhost/profiles"
"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_toml_is_reported() {
        let err = AppConfig::from_toml_str("[router\nurl = 1").unwrap_err();
        assert!(matches!(err, ServiceError::ConfigValidationError { .. }));
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();

        let toml_content = r#"
[router]
realm = "file-realm"
"#;

        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = AppConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.router.realm, "file-realm");
    }
}
