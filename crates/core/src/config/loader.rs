use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;
use tracing::debug;

use super::{types::Config, validate::validate_config, ConfigError};

/// Prefix of environment overrides. Nested keys are joined with `__`, so
/// `LINKHOARD_DISPATCH__BATCH_SIZE=8` sets `dispatch.batch_size`.
pub const ENV_PREFIX: &str = "LINKHOARD_";

/// Provider stack used by [`load_config`]: the TOML file, then the
/// environment on top.
pub fn config_figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Load and validate configuration from `path` with environment overrides.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = config_figment(path)
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;

    debug!(
        store = ?config.store.path,
        batch_size = config.dispatch.batch_size,
        "Loaded configuration from {:?}",
        path
    );
    Ok(config)
}

/// Parse and validate configuration from a TOML string. The environment is
/// not consulted.
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    let config: Config =
        toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}
