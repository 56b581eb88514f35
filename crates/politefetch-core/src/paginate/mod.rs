//! Pagination discovery (§4.8): walks numeric or letter-indexed pages,
//! stopping on a consecutive-404 streak.

use std::time::{Duration, Instant};

use scraper::{Html, Selector};
use tokio::time::sleep;

use crate::config::defaults::{
    PAGINATION_CONSECUTIVE_404_THRESHOLD, PAGINATION_INTER_LETTER_DELAY_MS, PAGINATION_INTER_PAGE_DELAY_MS,
    PAGINATION_LETTER_404_THRESHOLD, PAGINATION_LETTER_MAX_PAGES,
};
use crate::error::ErrorKind;
use crate::fetch::{FetchEngine, FetchOutcome, FetchRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PaginationMode {
    Numeric,
    Letter,
    Mixed,
}

#[derive(Debug, Clone)]
pub struct PageRecord {
    pub url: String,
    pub page: Option<u32>,
    pub letter: Option<char>,
    pub status: Option<u16>,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct PaginationResult {
    pub base_url: String,
    pub mode: PaginationMode,
    pub pages: Vec<PageRecord>,
    pub errors: Vec<(String, ErrorKind)>,
    pub total_elapsed: Duration,
}

const DEFAULT_ALPHABET: &str = "abcdefghijklmnopqrstuvwxyz0123456789";

pub struct PaginationDiscoverer<'a> {
    engine: &'a FetchEngine,
}

impl<'a> PaginationDiscoverer<'a> {
    pub fn new(engine: &'a FetchEngine) -> Self {
        Self { engine }
    }

    /// `auto` mode per §4.8: fetch the base URL, look for a numeric
    /// pagination template; else fall back to letter discovery.
    pub async fn discover(&self, base_url: &str, correlation_id: &str, max_pages: u32) -> PaginationResult {
        let start = Instant::now();
        let request = FetchRequest::get(base_url, correlation_id.to_string());
        let outcome = self.engine.fetch_once(request).await;

        let FetchOutcome::Success(success) = outcome else {
            return PaginationResult {
                base_url: base_url.to_string(),
                mode: PaginationMode::Numeric,
                pages: Vec::new(),
                errors: vec![(base_url.to_string(), outcome.error_kind().unwrap_or(ErrorKind::Unknown))],
                total_elapsed: start.elapsed(),
            };
        };

        let body = String::from_utf8_lossy(&success.body).to_string();
        let mut pages = vec![PageRecord {
            url: base_url.to_string(),
            page: Some(1),
            letter: None,
            status: Some(success.status),
            elapsed: success.elapsed,
        }];
        let mut errors = Vec::new();

        match find_page_template(&body, base_url) {
            Some(template) => {
                self.numeric_discovery(&template, correlation_id, max_pages, &mut pages, &mut errors).await;
                PaginationResult { base_url: base_url.to_string(), mode: PaginationMode::Numeric, pages, errors, total_elapsed: start.elapsed() }
            }
            None => {
                self.letter_discovery(base_url, correlation_id, &mut pages, &mut errors).await;
                PaginationResult { base_url: base_url.to_string(), mode: PaginationMode::Letter, pages, errors, total_elapsed: start.elapsed() }
            }
        }
    }

    async fn numeric_discovery(
        &self,
        template: &str,
        correlation_id: &str,
        max_pages: u32,
        pages: &mut Vec<PageRecord>,
        errors: &mut Vec<(String, ErrorKind)>,
    ) {
        let mut consecutive_404s = 0u32;
        let mut page = 2u32;
        while page <= max_pages && consecutive_404s < PAGINATION_CONSECUTIVE_404_THRESHOLD {
            let url = template.replace("{page}", &page.to_string());
            sleep(Duration::from_millis(PAGINATION_INTER_PAGE_DELAY_MS)).await;
            let request = FetchRequest::get(&url, correlation_id.to_string());
            let outcome = self.engine.fetch_once(request).await;
            match outcome {
                FetchOutcome::Success(success) => {
                    consecutive_404s = 0;
                    pages.push(PageRecord { url, page: Some(page), letter: None, status: Some(success.status), elapsed: success.elapsed });
                }
                FetchOutcome::Network(e) if e.status == Some(404) => {
                    consecutive_404s += 1;
                    errors.push((url, ErrorKind::Client4xx));
                }
                other => {
                    errors.push((url, other.error_kind().unwrap_or(ErrorKind::Unknown)));
                }
            }
            page += 1;
        }
    }

    async fn letter_discovery(
        &self,
        base_url: &str,
        correlation_id: &str,
        pages: &mut Vec<PageRecord>,
        errors: &mut Vec<(String, ErrorKind)>,
    ) {
        for letter in DEFAULT_ALPHABET.chars() {
            sleep(Duration::from_millis(PAGINATION_INTER_LETTER_DELAY_MS)).await;
            let letter_base = substitute_letter(base_url, letter);
            let mut consecutive_404s = 0u32;
            let mut page = 1u32;
            while page <= PAGINATION_LETTER_MAX_PAGES && consecutive_404s < PAGINATION_LETTER_404_THRESHOLD {
                let url = if page == 1 { letter_base.clone() } else { format!("{letter_base}?page={page}") };
                sleep(Duration::from_millis(PAGINATION_INTER_PAGE_DELAY_MS)).await;
                let request = FetchRequest::get(&url, correlation_id.to_string());
                match self.engine.fetch_once(request).await {
                    FetchOutcome::Success(success) => {
                        consecutive_404s = 0;
                        pages.push(PageRecord {
                            url,
                            page: Some(page),
                            letter: Some(letter),
                            status: Some(success.status),
                            elapsed: success.elapsed,
                        });
                    }
                    FetchOutcome::Network(e) if e.status == Some(404) => {
                        consecutive_404s += 1;
                        errors.push((url, ErrorKind::Client4xx));
                    }
                    other => {
                        errors.push((url, other.error_kind().unwrap_or(ErrorKind::Unknown)));
                    }
                }
                page += 1;
            }
        }
    }
}

fn substitute_letter(base_url: &str, letter: char) -> String {
    if base_url.contains("/all") {
        base_url.replacen("/all", &format!("/{letter}"), 1)
    } else {
        format!("{}/{}", base_url.trim_end_matches('/'), letter)
    }
}

/// Looks for `rel="next"`, an aria-label containing "Next", or `a[href*="page"]`
/// link selectors in priority order (§4.8), and derives a `{page}`
/// template from the first numeric page parameter found.
fn find_page_template(body: &str, base_url: &str) -> Option<String> {
    let document = Html::parse_document(body);
    let selectors = [
        "a[rel=\"next\"]",
        "a[aria-label*=\"Next\" i]",
        "a[href*=\"page\"]",
    ];
    for selector_str in selectors {
        let Ok(selector) = Selector::parse(selector_str) else { continue };
        if let Some(element) = document.select(&selector).next() {
            if let Some(href) = element.value().attr("href") {
                if let Some(template) = templatize(href, base_url) {
                    return Some(template);
                }
            }
        }
    }
    None
}

fn templatize(href: &str, base_url: &str) -> Option<String> {
    let resolved = url::Url::parse(base_url).ok()?.join(href).ok()?;
    let mut out = resolved.clone();
    if let Some(query) = resolved.query() {
        let replaced: Vec<String> = query
            .split('&')
            .map(|pair| {
                if let Some((k, v)) = pair.split_once('=') {
                    if k.eq_ignore_ascii_case("page") && v.chars().all(|c| c.is_ascii_digit()) {
                        return format!("{k}={{page}}");
                    }
                }
                pair.to_string()
            })
            .collect();
        out.set_query(Some(&replaced.join("&")));
        return Some(out.to_string());
    }
    let path = resolved.path();
    if let Some(replaced_path) = replace_numeric_segment(path) {
        out.set_path(&replaced_path);
        return Some(out.to_string());
    }
    None
}

fn replace_numeric_segment(path: &str) -> Option<String> {
    let segments: Vec<&str> = path.split('/').collect();
    let mut found = false;
    let replaced: Vec<String> = segments
        .iter()
        .map(|segment| {
            if !found && !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit()) {
                found = true;
                "{page}".to_string()
            } else {
                segment.to_string()
            }
        })
        .collect();
    found.then(|| replaced.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templatizes_query_page_param() {
        let template = templatize("/list?page=2", "https://example.com/").unwrap();
        assert_eq!(template, "https://example.com/list?page={page}");
    }

    #[test]
    fn templatizes_path_segment() {
        let template = templatize("/page/2", "https://example.com/").unwrap();
        assert_eq!(template, "https://example.com/page/{page}");
    }

    #[test]
    fn finds_rel_next_link() {
        let body = r#"<html><body><a rel="next" href="/list?page=2">Next</a></body></html>"#;
        let template = find_page_template(body, "https://example.com/list").unwrap();
        assert_eq!(template, "https://example.com/list?page={page}");
    }

    #[test]
    fn returns_none_without_pagination_links() {
        assert!(find_page_template("<html><body>no links</body></html>", "https://example.com/").is_none());
    }

    #[test]
    fn substitutes_letter_into_all_sentinel() {
        assert_eq!(substitute_letter("https://example.com/company/all", 'b'), "https://example.com/company/b");
    }
}
