//! Closed error taxonomy and the pure classifier that maps raw failures
//! onto it. Mirrors the teacher's one-enum-per-concern layout.

use std::fmt;
use std::time::Duration;

/// Stable error kinds used throughout the core. Serialized to lower-snake
/// strings at the logging edge (see `log`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connection refused, reset, or otherwise failed before a response arrived.
    Network,
    /// The request exceeded its configured deadline.
    Timeout,
    /// HTTP 429, or the adaptive limiter backed off after repeated 429s.
    RateLimited,
    /// The host's circuit breaker was open or half-open and rejected the call.
    CircuitOpen,
    /// HTTP 4xx other than 429.
    Client4xx,
    /// HTTP 5xx.
    Server5xx,
    /// The URL or request shape failed validation before any network call.
    Validation,
    /// The response body could not be parsed as expected.
    Parse,
    /// robots.txt disallows this path for our user agent.
    RobotsBlocked,
    /// DNS resolution failed.
    Dns,
    /// TLS handshake failed.
    Ssl,
    /// Synthetic kind reported when a caller observes repeated failures directly.
    ConsecutiveErrors,
    /// Catch-all for failures that don't fit another kind.
    Unknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::CircuitOpen => "circuit_open",
            ErrorKind::Client4xx => "client_4xx",
            ErrorKind::Server5xx => "server_5xx",
            ErrorKind::Validation => "validation",
            ErrorKind::Parse => "parse",
            ErrorKind::RobotsBlocked => "robots_blocked",
            ErrorKind::Dns => "dns",
            ErrorKind::Ssl => "ssl",
            ErrorKind::ConsecutiveErrors => "consecutive_errors",
            ErrorKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Log-level hint attached to a `ClassifiedError` (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Expected, routine (rate limiting, circuit gating, robots blocks).
    Info,
    /// Client-side or validation problem, not the engine's fault.
    Warn,
    /// Unexpected failure worth surfacing loudly.
    Error,
}

impl ErrorKind {
    /// Counts toward the circuit breaker's `consecutiveFailures` per §4.4/§7.
    pub fn counts_toward_circuit(self) -> bool {
        matches!(self, ErrorKind::Network | ErrorKind::Timeout | ErrorKind::Server5xx)
    }

    /// Log-level hint for this kind; see `Severity`.
    pub fn severity(self) -> Severity {
        match self {
            ErrorKind::Validation | ErrorKind::Client4xx => Severity::Warn,
            ErrorKind::RateLimited | ErrorKind::CircuitOpen | ErrorKind::RobotsBlocked => {
                Severity::Info
            }
            _ => Severity::Error,
        }
    }

    /// Whether the retry scheduler should attempt this kind again (§4.6).
    pub fn retriable(self) -> bool {
        matches!(
            self,
            ErrorKind::Network
                | ErrorKind::Timeout
                | ErrorKind::RateLimited
                | ErrorKind::Server5xx
                | ErrorKind::Dns
        )
    }
}

/// A classified failure: stable kind plus severity/retriable hints and a
/// human-readable message. Never constructed by panicking code paths.
#[derive(Debug, Clone, thiserror::Error, serde::Serialize)]
#[error("{kind}: {message}")]
pub struct ClassifiedError {
    /// The stable taxonomy kind.
    pub kind: ErrorKind,
    /// Derived from `kind` at construction time; never set independently.
    pub severity: Severity,
    /// Derived from `kind` at construction time; never set independently.
    pub retriable: bool,
    /// Human-readable detail for logs; not part of the stable contract.
    pub message: String,
    /// Parsed `Retry-After`, when the failure carried one.
    #[serde(skip)]
    pub retry_after: Option<Duration>,
    /// HTTP status code, when the failure came from a response.
    pub status: Option<u16>,
}

impl ClassifiedError {
    /// Builds a `ClassifiedError`, deriving `severity`/`retriable` from `kind`.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.severity(),
            retriable: kind.retriable(),
            message: message.into(),
            retry_after: None,
            status: None,
        }
    }

    /// Attaches a parsed `Retry-After` duration.
    pub fn with_retry_after(mut self, d: Duration) -> Self {
        self.retry_after = Some(d);
        self
    }

    /// Attaches the HTTP status code that produced this error.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

/// Raw signal fed into the classifier, in priority order per §4.1: an
/// explicit kind if one is already known, a platform error code, an HTTP
/// status, or a message to pattern-match as a last resort.
#[derive(Debug, Default)]
pub struct RawFailure<'a> {
    /// Already-known kind; short-circuits the rest of `classify`.
    pub explicit_kind: Option<ErrorKind>,
    /// HTTP status code, if a response was received.
    pub status: Option<u16>,
    /// Set when the transport reports a deadline was exceeded.
    pub is_timeout: bool,
    /// Set when the transport failed to establish a connection.
    pub is_connect: bool,
    /// Set when the transport failed during DNS resolution.
    pub is_dns: bool,
    /// Set when the transport failed during the TLS handshake.
    pub is_tls: bool,
    /// Freeform detail used for message text and last-resort pattern matching.
    pub message: Option<&'a str>,
}

/// Pure, total classifier: never panics, always returns a `ClassifiedError`.
pub fn classify(raw: &RawFailure<'_>) -> ClassifiedError {
    if let Some(kind) = raw.explicit_kind {
        return ClassifiedError::new(kind, raw.message.unwrap_or("explicit"));
    }
    if raw.is_dns {
        return ClassifiedError::new(ErrorKind::Dns, raw.message.unwrap_or("dns resolution failed"));
    }
    if raw.is_tls {
        return ClassifiedError::new(ErrorKind::Ssl, raw.message.unwrap_or("tls handshake failed"));
    }
    if raw.is_timeout {
        return ClassifiedError::new(ErrorKind::Timeout, raw.message.unwrap_or("request timed out"));
    }
    if raw.is_connect {
        return ClassifiedError::new(ErrorKind::Network, raw.message.unwrap_or("connection refused"));
    }
    if let Some(status) = raw.status {
        let kind = match status {
            429 => ErrorKind::RateLimited,
            500..=599 => ErrorKind::Server5xx,
            400..=499 => ErrorKind::Client4xx,
            _ => ErrorKind::Unknown,
        };
        return ClassifiedError::new(kind, format!("http status {status}"));
    }
    if let Some(msg) = raw.message {
        let lower = msg.to_ascii_lowercase();
        if lower.contains("abort") || lower.contains("cancel") {
            return ClassifiedError::new(ErrorKind::Timeout, msg);
        }
        if lower.contains("dns") {
            return ClassifiedError::new(ErrorKind::Dns, msg);
        }
        return ClassifiedError::new(ErrorKind::Unknown, msg);
    }
    ClassifiedError::new(ErrorKind::Unknown, "unclassified failure")
}

/// Config load/parse/validation failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file exists but couldn't be opened or read.
    #[error("failed to read config file {path}")]
    Read {
        /// The path that was opened.
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// The config file's contents aren't valid TOML.
    #[error("failed to parse config file {path} as TOML")]
    Parse {
        /// The path that was parsed.
        path: String,
        #[source]
        source: toml::de::Error,
    },
    /// A parsed value fails validation (out of range, contradictory, etc).
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// The dotted field path, e.g. `rate_limit.default_rps`.
        field: String,
        /// Why the value was rejected.
        reason: String,
    },
    /// An env-var override (layer 3) couldn't be parsed into its target type.
    #[error("environment variable {key} could not be parsed: {reason}")]
    EnvVar {
        /// The environment variable name.
        key: String,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Transport-level failures from the fetch engine, before classification.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// `reqwest::RequestBuilder::build` rejected the request itself.
    #[error("failed to build request for {url}")]
    Build {
        /// The request URL.
        url: String,
        #[source]
        source: reqwest::Error,
    },
    /// The underlying HTTP client failed to send or receive.
    #[error("transport error contacting {url}")]
    Transport {
        /// The request URL.
        url: String,
        #[source]
        source: reqwest::Error,
    },
    /// `RateLimiter::acquire` waited past the configured max wait (§4.3).
    #[error("rate limit wait exceeded for host {host}")]
    RateLimitWaitExceeded {
        /// The host key that was rate limited.
        host: String,
    },
}

/// Orchestrator-level failures.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    /// Rejected before Phase 1 even runs (§4.9).
    #[error("batch of {count} URLs exceeds max_urls_per_batch ({limit})")]
    TooLarge {
        /// URLs submitted.
        count: usize,
        /// Configured `max_urls_per_batch`.
        limit: usize,
    },
    /// A control method was called in a state that doesn't allow it.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidTransition {
        /// The state the batch was in.
        from: String,
        /// The state that was requested.
        to: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_status_codes() {
        let cases = [(429, ErrorKind::RateLimited), (503, ErrorKind::Server5xx), (404, ErrorKind::Client4xx)];
        for (status, expected) in cases {
            let raw = RawFailure { status: Some(status), ..Default::default() };
            assert_eq!(classify(&raw).kind, expected);
        }
    }

    #[test]
    fn timeout_takes_priority_over_status() {
        let raw = RawFailure { is_timeout: true, status: Some(500), ..Default::default() };
        assert_eq!(classify(&raw).kind, ErrorKind::Timeout);
    }

    #[test]
    fn only_network_timeout_5xx_count_toward_circuit() {
        assert!(ErrorKind::Network.counts_toward_circuit());
        assert!(ErrorKind::Timeout.counts_toward_circuit());
        assert!(ErrorKind::Server5xx.counts_toward_circuit());
        assert!(!ErrorKind::RateLimited.counts_toward_circuit());
        assert!(!ErrorKind::Client4xx.counts_toward_circuit());
        assert!(!ErrorKind::Validation.counts_toward_circuit());
    }

    #[test]
    fn never_panics_on_empty_input() {
        let raw = RawFailure::default();
        let classified = classify(&raw);
        assert_eq!(classified.kind, ErrorKind::Unknown);
    }

    #[test]
    fn display_matches_taxonomy_strings() {
        assert_eq!(ErrorKind::RateLimited.to_string(), "rate_limited");
        assert_eq!(ErrorKind::RobotsBlocked.to_string(), "robots_blocked");
    }
}
