use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Store path is not empty
/// - Dispatch batch size is not 0
/// - Event capacity is not 0
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.store.path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "store.path cannot be empty".to_string(),
        ));
    }

    if config.dispatch.batch_size == 0 {
        return Err(ConfigError::ValidationError(
            "dispatch.batch_size cannot be 0".to_string(),
        ));
    }

    // tokio's broadcast channel panics on a zero capacity
    if config.events.capacity == 0 {
        return Err(ConfigError::ValidationError(
            "events.capacity cannot be 0".to_string(),
        ));
    }

    Ok(())
}
