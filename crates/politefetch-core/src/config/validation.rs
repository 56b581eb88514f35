//! Post-load invariant checks (§3's "adaptive rate profile" and "recovery
//! strategy" invariants: `minRPS ≤ currentRPS ≤ maxRPS`, etc).

use crate::error::ConfigError;

use super::types::Config;

pub fn validate(config: &Config) -> Result<(), ConfigError> {
    let rl = &config.rate_limit;
    if rl.min_rps > rl.max_rps {
        return Err(ConfigError::Invalid {
            field: "rate_limit.min_rps".to_string(),
            reason: format!("min_rps ({}) must be <= max_rps ({})", rl.min_rps, rl.max_rps),
        });
    }
    if !(rl.min_rps..=rl.max_rps).contains(&rl.default_rps) {
        return Err(ConfigError::Invalid {
            field: "rate_limit.default_rps".to_string(),
            reason: format!("default_rps ({}) must be within [min_rps, max_rps]", rl.default_rps),
        });
    }
    if rl.backoff_multiplier >= 1.0 {
        return Err(ConfigError::Invalid {
            field: "rate_limit.backoff_multiplier".to_string(),
            reason: "must be < 1.0".to_string(),
        });
    }
    if rl.recovery_multiplier <= 1.0 {
        return Err(ConfigError::Invalid {
            field: "rate_limit.recovery_multiplier".to_string(),
            reason: "must be > 1.0".to_string(),
        });
    }
    let cb = &config.circuit_breaker;
    if cb.initial_reset_ms > cb.max_reset_ms {
        return Err(ConfigError::Invalid {
            field: "circuit_breaker.initial_reset_ms".to_string(),
            reason: "must be <= max_reset_ms".to_string(),
        });
    }
    if cb.backoff_multiplier < 1.0 {
        return Err(ConfigError::Invalid {
            field: "circuit_breaker.backoff_multiplier".to_string(),
            reason: "must be >= 1.0".to_string(),
        });
    }
    if cb.half_open_max_calls == 0 {
        return Err(ConfigError::Invalid {
            field: "circuit_breaker.half_open_max_calls".to_string(),
            reason: "must be >= 1".to_string(),
        });
    }
    if config.batch.max_urls_per_batch == 0 {
        return Err(ConfigError::Invalid {
            field: "batch.max_urls_per_batch".to_string(),
            reason: "must be >= 1".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn rejects_inverted_rps_bounds() {
        let mut config = Config::default();
        config.rate_limit.min_rps = 10.0;
        config.rate_limit.max_rps = 1.0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_backoff_multiplier_ge_one() {
        let mut config = Config::default();
        config.rate_limit.backoff_multiplier = 1.0;
        assert!(validate(&config).is_err());
    }
}
