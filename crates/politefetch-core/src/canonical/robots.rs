//! robots.txt cache and directive matching (§4.7, §6 "robots.txt
//! compliance"). Parse failures default to "allow".

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::config::defaults::{ROBOTS_CACHE_TTL_MS, USER_AGENT_PRODUCT};
use crate::fetch::{FetchEngine, FetchOutcome, FetchRequest};

#[derive(Debug, Clone)]
struct Rules {
    disallow_prefixes: Vec<String>,
}

impl Rules {
    fn allows(&self, path: &str) -> bool {
        !self.disallow_prefixes.iter().any(|prefix| !prefix.is_empty() && path.starts_with(prefix.as_str()))
    }
}

/// Parses robots.txt into the directive set that applies to us: the most
/// specific group whose `User-agent` stem matches our product name, falling
/// back to the `*` group if no specific group matches (§4.7/§6).
fn parse(body: &str) -> Rules {
    parse_for(body, USER_AGENT_PRODUCT)
}

fn parse_for(body: &str, product: &str) -> Rules {
    let product = product.to_ascii_lowercase();
    let mut groups: Vec<(Vec<String>, Vec<String>)> = Vec::new();
    let mut current: Option<(Vec<String>, Vec<String>)> = None;
    let mut prev_was_agent = false;

    for line in body.lines() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else { continue };
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim();
        match key.as_str() {
            "user-agent" => {
                if !prev_was_agent {
                    if let Some(group) = current.take() {
                        groups.push(group);
                    }
                    current = Some((Vec::new(), Vec::new()));
                }
                current.get_or_insert_with(|| (Vec::new(), Vec::new())).0.push(value.to_ascii_lowercase());
                prev_was_agent = true;
            }
            "disallow" => {
                if let Some(group) = current.as_mut() {
                    group.1.push(value.to_string());
                }
                prev_was_agent = false;
            }
            _ => prev_was_agent = false,
        }
    }
    if let Some(group) = current.take() {
        groups.push(group);
    }

    // Most specific matching stem wins; "*" is only a fallback when no
    // named group matches our product.
    let mut best: Option<(&Vec<String>, usize)> = None;
    let mut wildcard: Option<&Vec<String>> = None;
    for (agents, disallow) in &groups {
        for agent in agents {
            if agent == "*" {
                wildcard = Some(disallow);
            } else if product.starts_with(agent.as_str()) && agent.len() > best.map_or(0, |(_, len)| len) {
                best = Some((disallow, agent.len()));
            }
        }
    }
    let disallow_prefixes = best.map(|(d, _)| d.clone()).or_else(|| wildcard.cloned()).unwrap_or_default();
    Rules { disallow_prefixes }
}

struct CacheEntry {
    rules: Rules,
    fetched_at: Instant,
}

pub struct RobotsCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl RobotsCache {
    pub fn new() -> Self {
        Self { entries: Mutex::new(HashMap::new()) }
    }

    /// `origin` like `https://example.com`. Defaults to "allow" if the
    /// fetch fails or the cache entry has expired and a refetch fails.
    pub async fn is_allowed(&self, engine: &FetchEngine, origin: &str, path: &str, correlation_id: &str) -> bool {
        let ttl = Duration::from_millis(ROBOTS_CACHE_TTL_MS);
        {
            let entries = self.entries.lock().await;
            if let Some(entry) = entries.get(origin) {
                if entry.fetched_at.elapsed() < ttl {
                    return entry.rules.allows(path);
                }
            }
        }
        let url = format!("{origin}/robots.txt");
        let request = FetchRequest::get(url, correlation_id.to_string());
        let rules = match engine.fetch_once(request).await {
            FetchOutcome::Success(success) if success.status < 400 => {
                parse(&String::from_utf8_lossy(&success.body))
            }
            _ => Rules { disallow_prefixes: Vec::new() },
        };
        let allowed = rules.allows(path);
        let mut entries = self.entries.lock().await;
        entries.insert(origin.to_string(), CacheEntry { rules, fetched_at: Instant::now() });
        allowed
    }
}

impl Default for RobotsCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wildcard_disallow_rules() {
        let rules = parse("User-agent: *\nDisallow: /private\nDisallow: /admin\n");
        assert!(!rules.allows("/private/x"));
        assert!(!rules.allows("/admin"));
        assert!(rules.allows("/public"));
    }

    #[test]
    fn ignores_non_matching_agent_blocks() {
        let rules = parse("User-agent: Googlebot\nDisallow: /only-google\n");
        assert!(rules.allows("/only-google"));
    }

    #[test]
    fn empty_disallow_allows_everything() {
        let rules = parse("User-agent: *\nDisallow:\n");
        assert!(rules.allows("/anything"));
    }

    #[test]
    fn matches_our_product_stem_over_wildcard() {
        let rules = parse_for(
            "User-agent: *\nDisallow: /private\n\nUser-agent: politefetch\nDisallow: /no-bots\n",
            "politefetch",
        );
        assert!(!rules.allows("/no-bots"));
        assert!(rules.allows("/private"));
    }

    #[test]
    fn falls_back_to_wildcard_when_no_stem_matches() {
        let rules = parse_for("User-agent: *\nDisallow: /private\n\nUser-agent: othercrawler\nDisallow: /no-bots\n", "politefetch");
        assert!(!rules.allows("/private"));
        assert!(rules.allows("/no-bots"));
    }
}
