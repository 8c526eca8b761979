//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::RouterConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<RouterConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let config: RouterConfig = toml::from_str(&content).map_err(ConfigError::Parse)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("breakwater.toml");
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_valid_file_loads_with_defaults_filled() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
            [[endpoints]]
            id = "geo"
            addresses = ["http://geo.test"]
            "#,
        );

        let config = load_config(&path).unwrap();
        assert_eq!(config.endpoints.len(), 1);
        assert_eq!(config.endpoints[0].id, "geo");
        assert_eq!(config.endpoints[0].failure_threshold, 5);
        assert_eq!(config.server.bind_address, "0.0.0.0:8080");
    }

    #[test]
    fn test_missing_file_is_an_io_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nonexistent.toml");

        assert!(matches!(load_config(&missing), Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_malformed_toml_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "endpoints = [not toml");

        assert!(matches!(load_config(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_every_violation_is_collected_and_printed() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
            [[endpoints]]
            id = "geo"
            addresses = ["ftp://geo.test"]

            [[fallback_rules]]
            pattern = "geo/*"
            [[fallback_rules.candidates]]
            endpoint = "missing"
            "#,
        );

        let error = load_config(&path).unwrap_err();
        let ConfigError::Validation(ref violations) = error else {
            panic!("expected a validation error, got {error}");
        };
        assert_eq!(violations.len(), 2);

        let message = error.to_string();
        assert!(message.contains("unsupported scheme 'ftp'"));
        assert!(message.contains("unknown endpoint 'missing'"));
    }
}
