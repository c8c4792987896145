use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.workload_capacity == 0 {
        return Err(ConfigError::Validation {
            message: "workload_capacity must be at least 1".to_string(),
        });
    }

    if config.retry.base_delay_ms == 0 {
        return Err(ConfigError::Validation {
            message: "retry.base_delay_ms must be at least 1".to_string(),
        });
    }

    Ok(())
}
