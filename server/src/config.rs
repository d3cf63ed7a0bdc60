use anyhow::{bail, Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub auth: AuthConfig,
    pub coordination: CoordinationConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// Bind address, `BIND` in the environment.
    pub bind: String,
    /// Listen port, `PORT` in the environment.
    pub port: u16,
    /// Root of the source tree agents work on. Informational for the
    /// server; the watcher that reports file events runs against it.
    pub repo_root: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct DatabaseConfig {
    /// SQLite file path, `DB_PATH` in the environment.
    pub path: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// fatal|error|warn|info|debug|trace|silent
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
    Compact,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AuthConfig {
    pub enabled: bool,
    pub api_keys: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CoordinationConfig {
    /// When true, dependency readiness is enforced on status transitions
    /// unless a request explicitly opts out.
    pub strict_mode: bool,
    /// Requests allowed per key per minute.
    pub rate_limit_rpm: u32,
}

const LOG_LEVELS: [&str; 7] = ["fatal", "error", "warn", "info", "debug", "trace", "silent"];

impl Config {
    /// Layer built-in defaults, an optional `CONFIG_FILE`, `FOREMAN_*`
    /// overrides, then the standard environment variables.
    pub fn from_env() -> Result<Self> {
        let mut builder = ConfigBuilder::builder().add_source(File::from_str(
            include_str!("../config/default.toml"),
            FileFormat::Toml,
        ));

        if let Ok(config_file) = env::var("CONFIG_FILE") {
            builder = builder.add_source(
                File::with_name(&config_file)
                    .required(false)
                    .format(FileFormat::Toml),
            );
        }

        builder = builder.add_source(
            Environment::with_prefix("FOREMAN")
                .separator("_")
                .try_parsing(true),
        );

        let config = builder.build().context("failed to build configuration")?;
        let mut result: Config = config
            .try_deserialize()
            .context("failed to deserialize configuration")?;

        Self::apply_standard_env_vars(&mut result)?;
        Ok(result)
    }

    /// The unprefixed variables every deployment of this server has used.
    fn apply_standard_env_vars(config: &mut Config) -> Result<()> {
        if let Ok(port) = env::var("PORT") {
            config.server.port = port.parse().context("PORT must be a port number")?;
        }
        if let Ok(bind) = env::var("BIND") {
            config.server.bind = bind;
        }
        if let Ok(repo_root) = env::var("REPO_ROOT") {
            config.server.repo_root = Some(repo_root);
        }
        if let Ok(db_path) = env::var("DB_PATH") {
            config.database.path = Some(db_path);
        }
        if let Ok(level) = env::var("LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(rpm) = env::var("RATE_LIMIT_RPM") {
            config.coordination.rate_limit_rpm =
                rpm.parse().context("RATE_LIMIT_RPM must be an integer")?;
        }
        if let Ok(strict) = env::var("STRICT_MODE") {
            config.coordination.strict_mode = parse_bool(&strict);
        }
        if let Ok(auth) = env::var("AUTH_ENABLED") {
            config.auth.enabled = parse_bool(&auth);
        }
        if let Ok(keys) = env::var("API_KEYS") {
            config.auth.api_keys = keys
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect();
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            bail!("server.port must be nonzero");
        }
        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            bail!(
                "logging.level must be one of {}",
                LOG_LEVELS.join("|")
            );
        }
        if self.auth.enabled && self.auth.api_keys.is_empty() {
            bail!("auth.enabled requires at least one API key");
        }
        if self.coordination.rate_limit_rpm == 0 {
            bail!("coordination.rate_limit_rpm must be nonzero");
        }
        Ok(())
    }

    pub fn database_path(&self) -> String {
        self.database
            .path
            .clone()
            .unwrap_or_else(|| "foreman.db".to_string())
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.bind, self.server.port)
    }
}

fn parse_bool(raw: &str) -> bool {
    !matches!(raw.to_ascii_lowercase().as_str(), "false" | "0" | "no" | "off")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Config {
        Config {
            server: ServerConfig {
                bind: "127.0.0.1".to_string(),
                port: 4177,
                repo_root: None,
            },
            database: DatabaseConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                format: LogFormat::Pretty,
            },
            auth: AuthConfig {
                enabled: false,
                api_keys: Vec::new(),
            },
            coordination: CoordinationConfig {
                strict_mode: true,
                rate_limit_rpm: 300,
            },
        }
    }

    #[test]
    fn default_shape_validates() {
        assert!(base().validate().is_ok());
    }

    #[test]
    fn auth_requires_keys() {
        let mut config = base();
        config.auth.enabled = true;
        assert!(config.validate().is_err());

        config.auth.api_keys.push("secret".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_unknown_log_level() {
        let mut config = base();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());

        for level in LOG_LEVELS {
            config.logging.level = level.to_string();
            assert!(config.validate().is_ok(), "rejected {level}");
        }
    }

    #[test]
    fn database_path_defaults() {
        let mut config = base();
        assert_eq!(config.database_path(), "foreman.db");
        config.database.path = Some("/tmp/x.db".to_string());
        assert_eq!(config.database_path(), "/tmp/x.db");
    }

    #[test]
    fn bool_parsing_accepts_common_falsy_forms() {
        for raw in ["false", "0", "no", "off", "False", "NO"] {
            assert!(!parse_bool(raw), "{raw} should be false");
        }
        for raw in ["true", "1", "yes", "on"] {
            assert!(parse_bool(raw), "{raw} should be true");
        }
    }
}
