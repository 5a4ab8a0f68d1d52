use crate::config::AppConfig;
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/Config.toml";

/// Prefix of environment overrides, e.g. `SPREADWATCH_POLLING__DRAIN_INTERVAL_MS`.
pub const ENV_PREFIX: &str = "SPREADWATCH_";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads configuration by merging the TOML file at `path` with environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or the result fails validation.
    pub fn load(path: impl AsRef<Path>) -> Result<AppConfig> {
        let path = path.as_ref();
        let config: AppConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| format!("failed to load configuration from {}", path.display()))?;

        config.validate()?;
        tracing::debug!(
            pairs = config.pairs.len(),
            exchanges = config.active_exchanges().len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Parses and validates configuration from an in-memory TOML document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be parsed or fails validation.
    pub fn from_toml_str(toml: &str) -> Result<AppConfig> {
        let config: AppConfig = Figment::new().merge(Toml::string(toml)).extract()?;
        config.validate()?;
        Ok(config)
    }
}
