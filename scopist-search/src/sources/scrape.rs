//! Helpers shared by the HTML-scraping adapters.

use scraper::{ElementRef, Selector};

use crate::error::SourceError;

/// One result card lifted from a scraped results page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapedHit {
    /// Card title with whitespace collapsed.
    pub title: String,
    /// Landing URL, redirect wrappers removed.
    pub url: String,
    /// Snippet text. May be empty.
    pub snippet: String,
    /// Author / venue line where the page has one (Google Scholar).
    pub byline: Option<String>,
}

/// Hosts whose pages are never papers.
const EXCLUDED_HOSTS: &[&str] = &[
    "wikipedia", "facebook", "twitter", "youtube", "shopping", "news",
];

/// Terms suggesting research content in a title or snippet.
const ACADEMIC_TERMS: &[&str] = &[
    "research",
    "study",
    "analysis",
    "investigation",
    "journal",
    "paper",
    "findings",
    "results",
    "method",
    "systematic",
    "clinical",
    "trial",
    "evidence",
    "data",
    "university",
    "institute",
    "department",
];

/// Hosts that publish papers.
const ACADEMIC_DOMAINS: &[&str] = &[
    "scholar.google",
    "pubmed",
    "arxiv",
    "researchgate",
    "sciencedirect",
    "springer",
    "wiley",
    "nature.com",
    "science.org",
    "ieee.org",
    "acm.org",
    "doi.org",
];

/// Parse a CSS selector, reporting failures as a format change.
pub(crate) fn selector(css: &str) -> Result<Selector, SourceError> {
    Selector::parse(css)
        .map_err(|e| SourceError::FormatChanged(format!("invalid selector {css}: {e:?}")))
}

/// Concatenated element text with whitespace collapsed.
pub(crate) fn element_text(element: &ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

/// Collapse runs of whitespace into single spaces and trim.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Heuristic filter for scraped cards that plausibly describe a paper.
///
/// Requires a title of at least 10 characters, rejects excluded host
/// families, and needs either an academic term in the text or an
/// academic domain in the URL.
pub fn looks_academic(hit: &ScrapedHit) -> bool {
    if hit.title.chars().count() < 10 {
        return false;
    }
    let url = hit.url.to_lowercase();
    let host = url::Url::parse(&url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_owned))
        .unwrap_or_default();
    if EXCLUDED_HOSTS.iter().any(|excluded| host.contains(excluded)) {
        return false;
    }
    let text = format!("{} {}", hit.title, hit.snippet).to_lowercase();
    ACADEMIC_TERMS.iter().any(|term| text.contains(term))
        || ACADEMIC_DOMAINS.iter().any(|domain| url.contains(domain))
}
