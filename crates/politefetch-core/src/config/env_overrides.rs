//! Layer 3 of the config load: environment variable overrides. Mirrors
//! the teacher's `TUITBOT_`-prefixed convention, replaced with
//! `POLITEFETCH_` and the spec's own bare env keys (§6) as aliases.

use std::env;

use crate::error::ConfigError;

use super::types::Config;

/// Applies `POLITEFETCH_*`-prefixed and the spec's bare env-var names
/// (`MAX_CONCURRENCY`, `RATE_LIMIT_PER_SEC`, ...) over an already-loaded
/// config. Bare names are recognized for compatibility with §6's
/// documented configuration surface; `POLITEFETCH_`-prefixed names take
/// precedence when both are set.
pub fn apply(mut config: Config, env_vars: &impl EnvSource) -> Result<Config, ConfigError> {
    if let Some(v) = either(env_vars, "MAX_CONCURRENCY") {
        config.max_concurrency = parse("MAX_CONCURRENCY", &v)?;
        config.batch.concurrency = config.max_concurrency;
    }
    if let Some(v) = either(env_vars, "RATE_LIMIT_PER_SEC") {
        config.rate_limit.default_rps = parse("RATE_LIMIT_PER_SEC", &v)?;
    }
    if let Some(v) = either(env_vars, "MAX_RETRIES") {
        config.retry.max_retries = parse("MAX_RETRIES", &v)?;
    }
    if let Some(v) = either(env_vars, "BASE_BACKOFF_MS") {
        config.retry.base_backoff_ms = parse("BASE_BACKOFF_MS", &v)?;
    }
    if let Some(v) = either(env_vars, "MAX_BACKOFF_MS") {
        config.retry.max_backoff_ms = parse("MAX_BACKOFF_MS", &v)?;
    }
    if let Some(v) = either(env_vars, "JITTER_FACTOR") {
        config.retry.jitter_factor = parse("JITTER_FACTOR", &v)?;
    }
    if let Some(v) = either(env_vars, "CONNECT_TIMEOUT_MS") {
        config.timeouts.connect_timeout_ms = parse("CONNECT_TIMEOUT_MS", &v)?;
    }
    if let Some(v) = either(env_vars, "READ_TIMEOUT_MS") {
        config.timeouts.read_timeout_ms = parse("READ_TIMEOUT_MS", &v)?;
    }
    if let Some(v) = either(env_vars, "CIRCUIT_BREAKER_THRESHOLD") {
        config.circuit_breaker.threshold = parse("CIRCUIT_BREAKER_THRESHOLD", &v)?;
    }
    if let Some(v) = either(env_vars, "CIRCUIT_BREAKER_RESET_MS") {
        config.circuit_breaker.initial_reset_ms = parse("CIRCUIT_BREAKER_RESET_MS", &v)?;
    }
    if let Some(v) = either(env_vars, "CIRCUIT_BREAKER_HALF_OPEN_MAX_CALLS") {
        config.circuit_breaker.half_open_max_calls = parse("CIRCUIT_BREAKER_HALF_OPEN_MAX_CALLS", &v)?;
    }
    if let Some(v) = either(env_vars, "INTER_REQUEST_DELAY_MS") {
        config.inter_request_delay_ms = parse("INTER_REQUEST_DELAY_MS", &v)?;
    }
    Ok(config)
}

/// `POLITEFETCH_<key>` takes precedence over the bare spec-documented key.
fn either(env_vars: &impl EnvSource, key: &str) -> Option<String> {
    env_vars.get(&format!("POLITEFETCH_{key}")).or_else(|| env_vars.get(key))
}

fn parse<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.parse::<T>().map_err(|_| ConfigError::EnvVar {
        key: key.to_string(),
        reason: format!("could not parse {raw:?}"),
    })
}

/// Abstracts over `std::env::vars` so tests can inject a fixed map instead
/// of mutating process environment.
pub trait EnvSource {
    fn get(&self, key: &str) -> Option<String>;
}

pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }
}

impl EnvSource for std::collections::HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn applies_bare_spec_names() {
        let mut env = HashMap::new();
        env.insert("MAX_CONCURRENCY".to_string(), "12".to_string());
        env.insert("MAX_RETRIES".to_string(), "7".to_string());
        let config = apply(Config::default(), &env).unwrap();
        assert_eq!(config.max_concurrency, 12);
        assert_eq!(config.retry.max_retries, 7);
    }

    #[test]
    fn prefixed_name_overrides_bare() {
        let mut env = HashMap::new();
        env.insert("MAX_CONCURRENCY".to_string(), "12".to_string());
        env.insert("POLITEFETCH_MAX_CONCURRENCY".to_string(), "3".to_string());
        let config = apply(Config::default(), &env).unwrap();
        assert_eq!(config.max_concurrency, 3);
    }

    #[test]
    fn invalid_value_is_rejected() {
        let mut env = HashMap::new();
        env.insert("MAX_RETRIES".to_string(), "not-a-number".to_string());
        assert!(apply(Config::default(), &env).is_err());
    }
}
