use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Load configuration from file with environment variable overrides.
///
/// Nested keys in the environment use a double underscore, e.g.
/// `TRANSCODR_LEDGER__FLUSH_INTERVAL_SECS=30`.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    figment_base()
        .merge(Toml::file(path))
        .merge(Env::prefixed("TRANSCODR_").split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Load defaults with environment variable overrides only.
pub fn load_default_config() -> Result<Config, ConfigError> {
    figment_base()
        .merge(Env::prefixed("TRANSCODR_").split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

fn figment_base() -> Figment {
    Figment::from(Serialized::defaults(Config::default()))
}
