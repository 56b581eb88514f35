//! Three-layer configuration loading, following the teacher's
//! `config/mod.rs` convention:
//!
//! 1. Built-in defaults (`defaults`).
//! 2. TOML config file, if present.
//! 3. Environment variable overrides (`POLITEFETCH_` prefix, plus the
//!    bare spec-documented names from §6).
//!
//! CLI flag overrides are applied by the binary crate after loading,
//! same as the teacher's `TUITBOT_`-prefixed layering.

pub mod defaults;
pub mod env_overrides;
pub mod types;
pub mod validation;

pub use env_overrides::{EnvSource, ProcessEnv};
pub use types::{BatchConfig, CircuitBreakerConfig, Config, HostLimit, RateLimitConfig, RetryConfig, TimeoutConfig};

use std::path::Path;

use crate::error::ConfigError;

/// Loads config from an optional TOML file, then applies process
/// environment overrides, then validates. Matches the teacher's
/// `Config::load` shape.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let config = match path {
        Some(p) => load_from_file(p)?,
        None => Config::default(),
    };
    let config = env_overrides::apply(config, &ProcessEnv)?;
    validation::validate(&config)?;
    Ok(config)
}

fn load_from_file(path: &Path) -> Result<Config, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_defaults_when_no_file_given() {
        let config = load(None).unwrap();
        assert_eq!(config.max_concurrency, defaults::MAX_CONCURRENCY);
    }

    #[test]
    fn loads_and_parses_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_concurrency = 9\n[rate_limit]\ndefault_rps = 2.0").unwrap();
        let config = load(Some(file.path())).unwrap();
        assert_eq!(config.max_concurrency, 9);
        assert_eq!(config.rate_limit.default_rps, 2.0);
    }

    #[test]
    fn missing_file_errors() {
        let err = load(Some(Path::new("/nonexistent/path/config.toml")));
        assert!(err.is_err());
    }
}
