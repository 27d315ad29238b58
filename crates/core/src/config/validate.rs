use super::{types::Config, ConfigError};

/// Validate configuration for a run
/// Currently validates:
/// - ffmpeg and ffprobe paths are not empty
/// - ledger flush interval is positive
/// - source root is set
/// - target root is set for mirror and flat layouts
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.converter.ffmpeg_path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "converter.ffmpeg_path cannot be empty".to_string(),
        ));
    }
    if config.converter.ffprobe_path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "converter.ffprobe_path cannot be empty".to_string(),
        ));
    }

    if config.ledger.flush_interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "ledger.flush_interval_secs must be greater than 0".to_string(),
        ));
    }

    if config.run.source_root.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "run.source_root is required".to_string(),
        ));
    }

    if config.run.layout.needs_target_root() && config.run.target_root.is_none() {
        return Err(ConfigError::ValidationError(format!(
            "run.target_root is required for layout {}",
            config.run.layout
        )));
    }

    Ok(())
}
