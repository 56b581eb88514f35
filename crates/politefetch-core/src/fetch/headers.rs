//! Header shaping (§4.5 step 4): a stable browser-like header set, with
//! correlation/request IDs and caller overrides applied last.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use crate::config::defaults::USER_AGENT_PRODUCT;

pub const CONTACT_URL: &str = "https://github.com/politefetch/politefetch";

pub fn user_agent() -> String {
    format!("{USER_AGENT_PRODUCT}/{} (+{CONTACT_URL})", env!("CARGO_PKG_VERSION"))
}

/// Builds the base header set; `overrides` are applied last per spec.
pub fn build(correlation_id: &str, request_id: &str, overrides: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("User-Agent", HeaderValue::from_str(&user_agent()).unwrap());
    headers.insert("Accept", HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"));
    headers.insert("Accept-Language", HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert("Accept-Encoding", HeaderValue::from_static("gzip, deflate, br"));
    if let Ok(value) = HeaderValue::from_str(correlation_id) {
        headers.insert(HeaderName::from_static("x-correlation-id"), value);
    }
    if let Ok(value) = HeaderValue::from_str(request_id) {
        headers.insert(HeaderName::from_static("x-request-id"), value);
    }
    for (name, value) in overrides {
        headers.insert(name.clone(), value.clone());
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_win_over_base_headers() {
        let mut overrides = HeaderMap::new();
        overrides.insert("Accept", HeaderValue::from_static("application/json"));
        let headers = build("corr-1", "req-1", &overrides);
        assert_eq!(headers.get("Accept").unwrap(), "application/json");
    }

    #[test]
    fn includes_correlation_and_request_ids() {
        let headers = build("corr-1", "req-1", &HeaderMap::new());
        assert_eq!(headers.get("x-correlation-id").unwrap(), "corr-1");
        assert_eq!(headers.get("x-request-id").unwrap(), "req-1");
    }
}
