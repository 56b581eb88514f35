//! Adaptive rate profile/state (§3 "Adaptive rate profile", "Adaptive
//! state"; §4.3 "Adaptive feedback").

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;

const HISTORY_CAP: usize = 100;
const CONSECUTIVE_5XX_BEFORE_BACKOFF: u32 = 3;
const FIVE_XX_BACKOFF_MULTIPLIER: f64 = 0.9;

/// Tuning knobs for one host (or the default profile). Immutable once
/// constructed; `AdaptiveState` carries the mutable side.
#[derive(Debug, Clone)]
pub struct AdaptiveProfile {
    pub initial_rps: f64,
    pub max_rps: f64,
    pub min_rps: f64,
    pub burst: u32,
    pub backoff_multiplier: f64,
    pub recovery_multiplier: f64,
    pub recovery_threshold: u32,
    pub cooldown: Duration,
}

impl AdaptiveProfile {
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self {
            initial_rps: config.default_rps,
            max_rps: config.max_rps,
            min_rps: config.min_rps,
            burst: config.burst,
            backoff_multiplier: config.backoff_multiplier,
            recovery_multiplier: config.recovery_multiplier,
            recovery_threshold: config.recovery_threshold,
            cooldown: Duration::from_millis(config.cooldown_ms),
        }
    }

    pub fn with_override(config: &RateLimitConfig, rps: f64, burst: u32) -> Self {
        let mut profile = Self::from_config(config);
        profile.initial_rps = rps;
        profile.burst = burst;
        profile
    }
}

#[derive(Debug, Clone, Copy)]
pub enum AdjustmentReason {
    RateLimited,
    Recovered,
    StreakedServerError,
}

#[derive(Debug, Clone)]
pub struct AdjustmentRecord {
    pub at: Instant,
    pub reason: AdjustmentReason,
    pub new_rps: f64,
}

/// Mutable adaptive state for one host. Only `adjust_rate` may change
/// `current_rps`, and it always appends to `adjustment_history`.
#[derive(Debug, Clone)]
pub struct AdaptiveState {
    pub current_rps: f64,
    pub success_streak: u32,
    pub error_streak: u32,
    pub consecutive_5xx: u32,
    pub last_rate_limited_at: Option<Instant>,
    pub pause_until: Option<Instant>,
    adjustment_history: VecDeque<AdjustmentRecord>,
}

impl AdaptiveState {
    pub fn new(profile: &AdaptiveProfile) -> Self {
        Self {
            current_rps: profile.initial_rps,
            success_streak: 0,
            error_streak: 0,
            consecutive_5xx: 0,
            last_rate_limited_at: None,
            pause_until: None,
            adjustment_history: VecDeque::with_capacity(HISTORY_CAP),
        }
    }

    pub fn history(&self) -> &VecDeque<AdjustmentRecord> {
        &self.adjustment_history
    }

    fn adjust_rate(&mut self, profile: &AdaptiveProfile, reason: AdjustmentReason, new_rps: f64) {
        self.current_rps = new_rps.clamp(profile.min_rps, profile.max_rps);
        if self.adjustment_history.len() >= HISTORY_CAP {
            self.adjustment_history.pop_front();
        }
        self.adjustment_history.push_back(AdjustmentRecord { at: Instant::now(), reason, new_rps: self.current_rps });
    }

    /// On `429`, per §4.3: bump error streak, reset success streak, set
    /// `pause_until` from `retry_after` or exponential fallback, and back
    /// off `current_rps`.
    pub fn on_rate_limited(&mut self, profile: &AdaptiveProfile, retry_after: Option<Duration>) {
        self.error_streak += 1;
        self.success_streak = 0;
        let now = Instant::now();
        self.last_rate_limited_at = Some(now);
        let pause = retry_after.unwrap_or_else(|| {
            let backoff_secs = 2f64.powi(self.error_streak.min(6) as i32);
            Duration::from_millis((1000.0 * backoff_secs).min(profile.cooldown.as_millis() as f64) as u64)
        });
        self.pause_until = Some(now + pause);
        let new_rps = self.current_rps * profile.backoff_multiplier;
        self.adjust_rate(profile, AdjustmentReason::RateLimited, new_rps);
    }

    /// On 2xx, per §4.3: decay error streak, bump success streak, and
    /// recover `current_rps` once the success streak and cooldown both
    /// clear their thresholds.
    pub fn on_success(&mut self, profile: &AdaptiveProfile) {
        self.error_streak = self.error_streak.saturating_sub(1);
        self.consecutive_5xx = 0;
        self.success_streak += 1;
        let cooldown_elapsed = self
            .last_rate_limited_at
            .map(|t| t.elapsed() > profile.cooldown)
            .unwrap_or(true);
        if self.success_streak >= profile.recovery_threshold && cooldown_elapsed {
            let new_rps = self.current_rps * profile.recovery_multiplier;
            self.adjust_rate(profile, AdjustmentReason::Recovered, new_rps);
            self.success_streak = 0;
        }
    }

    /// On 5xx, per §4.3: after 3 streaked 5xx, back off by 0.9x.
    pub fn on_server_error(&mut self, profile: &AdaptiveProfile) {
        self.consecutive_5xx += 1;
        self.success_streak = 0;
        if self.consecutive_5xx > CONSECUTIVE_5XX_BEFORE_BACKOFF {
            let new_rps = self.current_rps * FIVE_XX_BACKOFF_MULTIPLIER;
            self.adjust_rate(profile, AdjustmentReason::StreakedServerError, new_rps);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitConfig;

    fn profile() -> AdaptiveProfile {
        AdaptiveProfile::from_config(&RateLimitConfig { default_rps: 4.0, ..RateLimitConfig::default() })
    }

    #[test]
    fn rate_limited_backs_off_and_sets_pause() {
        let profile = profile();
        let mut state = AdaptiveState::new(&profile);
        state.on_rate_limited(&profile, Some(Duration::from_secs(2)));
        assert!(state.current_rps < 4.0);
        assert!(state.pause_until.is_some());
        assert_eq!(state.error_streak, 1);
        assert_eq!(state.history().len(), 1);
    }

    #[test]
    fn current_rps_never_leaves_bounds() {
        let profile = profile();
        let mut state = AdaptiveState::new(&profile);
        for _ in 0..50 {
            state.on_rate_limited(&profile, None);
        }
        assert!(state.current_rps >= profile.min_rps);
        assert!(state.current_rps <= profile.max_rps);
    }

    #[test]
    fn recovers_after_threshold_successes_and_cooldown() {
        let profile = AdaptiveProfile { recovery_threshold: 2, cooldown: Duration::from_millis(0), ..profile() };
        let mut state = AdaptiveState::new(&profile);
        state.on_success(&profile);
        assert_eq!(state.history().len(), 0);
        state.on_success(&profile);
        assert_eq!(state.history().len(), 1);
        assert_eq!(state.success_streak, 0);
    }

    #[test]
    fn streaked_5xx_backs_off() {
        let profile = profile();
        let mut state = AdaptiveState::new(&profile);
        for _ in 0..4 {
            state.on_server_error(&profile);
        }
        assert_eq!(state.history().len(), 1);
        assert!(state.current_rps < profile.initial_rps);
    }

    #[test]
    fn history_is_bounded_to_100() {
        let profile = profile();
        let mut state = AdaptiveState::new(&profile);
        for _ in 0..150 {
            state.on_rate_limited(&profile, None);
        }
        assert_eq!(state.history().len(), HISTORY_CAP);
    }
}
