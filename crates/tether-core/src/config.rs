//! Core configuration traits and TOML loading

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::errors::TetherError;

/// Trait for configuration validation
pub trait ConfigValidation {
    /// Validate this configuration
    fn validate(&self) -> Result<(), TetherError>;
}

/// Parse and validate a configuration from TOML text
pub fn load_toml_str<T>(content: &str) -> Result<T, TetherError>
where
    T: DeserializeOwned + ConfigValidation,
{
    let config: T = toml::from_str(content)
        .map_err(|e| TetherError::config(format!("Invalid TOML: {e}")))?;
    config.validate()?;
    Ok(config)
}

/// Read, parse and validate a configuration file
pub fn load_toml_file<T>(path: &Path) -> Result<T, TetherError>
where
    T: DeserializeOwned + ConfigValidation,
{
    let content = std::fs::read_to_string(path).map_err(|e| {
        TetherError::config(format!(
            "Failed to read config file {}: {e}",
            path.display()
        ))
    })?;
    load_toml_str(&content)
}

/// Overwrite `target` from an integer environment variable, if set.
pub fn env_override_u64(var: &str, target: &mut u64) -> Result<(), TetherError> {
    match std::env::var(var) {
        Ok(raw) => {
            *target = raw
                .trim()
                .parse()
                .map_err(|e| TetherError::config(format!("{var}={raw:?}: {e}")))?;
            Ok(())
        }
        Err(std::env::VarError::NotPresent) => Ok(()),
        Err(e) => Err(TetherError::config(format!("{var}: {e}"))),
    }
}
