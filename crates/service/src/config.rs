//! Engine configuration.

use std::path::Path;

use closeman_core::CloseError;
use closeman_progress::HealthPolicy;
use serde::{Deserialize, Serialize};

/// Tunables for the close engine. Every field has a default, so an empty
/// JSON object is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Close length used when a request omits `close_days`
    pub default_close_days: u32,
    /// Largest accepted `close_days`
    pub max_close_days: u32,
    /// Health rating thresholds
    pub health: HealthPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_close_days: 5,
            max_close_days: 30,
            health: HealthPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Load and validate a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CloseError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            CloseError::validation(format!("Cannot read config {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&json).map_err(|e| {
            CloseError::validation(format!("Invalid config {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the values make sense together.
    pub fn validate(&self) -> Result<(), CloseError> {
        if self.max_close_days == 0 {
            return Err(CloseError::validation("max_close_days must be at least 1"));
        }
        self.check_close_days(self.default_close_days)
            .map_err(|e| CloseError::validation(format!("default_close_days: {}", e)))?;
        self.health.validate()
    }

    /// Reject a requested close length outside `1..=max_close_days`.
    pub fn check_close_days(&self, close_days: u32) -> Result<u32, CloseError> {
        if close_days == 0 || close_days > self.max_close_days {
            return Err(CloseError::validation(format!(
                "close_days must be between 1 and {}, got {}",
                self.max_close_days, close_days
            )));
        }
        Ok(close_days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.default_close_days, 5);
        assert_eq!(config.max_close_days, 30);
        assert_eq!(config.health, HealthPolicy::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"default_close_days": 7, "health": {{"at_risk_threshold": 5}}}}"#)
            .unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.default_close_days, 7);
        assert_eq!(config.max_close_days, 30);
        assert_eq!(config.health.attention_threshold, 1);
        assert_eq!(config.health.at_risk_threshold, 5);
    }

    #[test]
    fn test_rejects_nonsense() {
        let config = EngineConfig {
            default_close_days: 40,
            ..Default::default()
        };
        assert_eq!(config.validate().unwrap_err().kind(), "ValidationError");

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(EngineConfig::from_file(file.path()).is_err());
        assert!(EngineConfig::from_file("/nonexistent/closeman.json").is_err());
    }

    #[test]
    fn test_check_close_days() {
        let config = EngineConfig::default();
        assert_eq!(config.check_close_days(10).unwrap(), 10);
        assert!(config.check_close_days(0).is_err());
        assert!(config.check_close_days(31).is_err());
    }
}
