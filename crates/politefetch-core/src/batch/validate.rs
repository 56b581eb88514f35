//! Phase 1 — validate and deduplicate (§4.9).

use std::collections::HashMap;

use url::Url;

use super::types::{BatchItem, InvalidUrl, Duplicate};

const TRACKING_PREFIXES: &[&str] = &["utm_"];
const TRACKING_EXACT: &[&str] = &["gclid", "fbclid", "msclkid", "dclid", "ref", "source", "_ga", "_gid", "_utm"];

/// Strips the fragment and a fixed set of tracking query parameters.
/// `normalize(normalize(u)) == normalize(u)` (§8 round-trip invariant).
pub fn normalize(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("malformed".to_string());
    }
    let mut url = Url::parse(trimmed).map_err(|_| "malformed".to_string())?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err("unsupported scheme".to_string());
    }
    url.set_fragment(None);
    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if retained.is_empty() {
        url.set_query(None);
    } else {
        let query = retained.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("&");
        url.set_query(Some(&query));
    }
    Ok(url.to_string())
}

fn is_tracking_param(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    TRACKING_PREFIXES.iter().any(|p| lower.starts_with(p)) || TRACKING_EXACT.contains(&lower.as_str())
}

pub struct ValidationOutcome {
    pub items: Vec<BatchItem>,
    pub invalid_urls: Vec<InvalidUrl>,
    pub duplicates: Vec<Duplicate>,
}

/// Validates, normalizes, and deduplicates, preserving `original_index`
/// order throughout (§4.9 Phase 1).
pub fn validate_and_dedupe(urls: &[String]) -> ValidationOutcome {
    let mut items = Vec::new();
    let mut invalid_urls = Vec::new();
    let mut duplicates = Vec::new();
    let mut first_occurrence: HashMap<String, usize> = HashMap::new();

    for (original_index, original_url) in urls.iter().enumerate() {
        match normalize(original_url) {
            Ok(normalized_url) => {
                if let Some(&first_index) = first_occurrence.get(&normalized_url) {
                    duplicates.push(Duplicate { original_index, first_occurrence_index: first_index, normalized_url });
                } else {
                    first_occurrence.insert(normalized_url.clone(), original_index);
                    items.push(BatchItem { original_url: original_url.clone(), normalized_url, original_index });
                }
            }
            Err(reason) => {
                invalid_urls.push(InvalidUrl { original_index, original_url: original_url.clone(), reason });
            }
        }
    }

    ValidationOutcome { items, invalid_urls, duplicates }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fragment_and_tracking_params() {
        let normalized = normalize("https://b.example/?utm_source=foo&kept=1#frag").unwrap();
        assert_eq!(normalized, "https://b.example/?kept=1");
    }

    #[test]
    fn drops_query_entirely_when_only_tracking_params() {
        let normalized = normalize("https://b.example/?utm_source=foo").unwrap();
        assert_eq!(normalized, "https://b.example/");
    }

    #[test]
    fn blank_input_is_malformed() {
        assert!(normalize("   ").is_err());
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = normalize("https://a.example/x?utm_campaign=y").unwrap();
        let twice = normalize(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn end_to_end_scenario_1_from_spec() {
        let urls = vec![
            "https://a.example/x".to_string(),
            "https://a.example/x#frag".to_string(),
            "  ".to_string(),
            "https://b.example/?utm_source=foo".to_string(),
        ];
        let outcome = validate_and_dedupe(&urls);
        assert_eq!(outcome.items.len(), 2);
        assert_eq!(outcome.items[0].normalized_url, "https://a.example/x");
        assert_eq!(outcome.items[1].normalized_url, "https://b.example/");
        assert_eq!(outcome.duplicates.len(), 1);
        assert_eq!(outcome.duplicates[0].original_index, 1);
        assert_eq!(outcome.duplicates[0].first_occurrence_index, 0);
        assert_eq!(outcome.invalid_urls.len(), 1);
        assert_eq!(outcome.invalid_urls[0].original_index, 2);
    }
}
