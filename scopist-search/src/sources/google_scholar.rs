//! Google Scholar result-page scraper.
//!
//! Scholar has no public API and aggressive bot detection, so this adapter
//! runs with the longest governor interval and treats CAPTCHA interstitials
//! as rate limiting. Cards are `div.gs_ri` blocks carrying a title
//! (`h3.gs_rt`), a byline (`div.gs_a`, "authors - venue, year - host") and
//! a snippet (`div.gs_rs`).

use async_trait::async_trait;
use scraper::Html;

use crate::adapter::SourceAdapter;
use crate::config::{EngineConfig, SourceConfig};
use crate::error::SourceError;
use crate::governor::RateGovernor;
use crate::http;
use crate::sources::duckduckgo::quote_terms;
use crate::sources::scrape::{self, ScrapedHit};
use crate::types::{HitPayload, Query, RawHit, SourceKind};

/// Scholar serves at most this many results per page.
const MAX_PAGE_SIZE: usize = 20;

const CAPTCHA_MARKERS: &[&str] = &["gs_captcha", "unusual traffic", "not a robot"];

const NO_RESULTS_MARKER: &str = "did not match any articles";

/// Google Scholar scraper.
pub struct GoogleScholarAdapter {
    config: SourceConfig,
    client: reqwest::Client,
    governor: RateGovernor,
}

impl GoogleScholarAdapter {
    /// Creates the adapter from its source config.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SearchError::Http`] if the HTTP client cannot be built.
    pub fn new(config: SourceConfig, engine: &EngineConfig) -> crate::Result<Self> {
        Ok(Self {
            client: http::build_client(engine)?,
            governor: RateGovernor::new(config.min_interval()),
            config,
        })
    }
}

#[async_trait]
impl SourceAdapter for GoogleScholarAdapter {
    fn name(&self) -> &str {
        self.config.name()
    }

    fn kind(&self) -> Option<SourceKind> {
        Some(SourceKind::GoogleScholar)
    }

    async fn fetch(&self, query: &Query, max_results: usize) -> Result<Vec<RawHit>, SourceError> {
        let terms = query.search_terms(3);
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let q = quote_terms(&terms);
        let num = max_results.min(MAX_PAGE_SIZE).to_string();
        let endpoint = format!("{}/scholar", self.config.base_url());
        tracing::trace!(query = %q, "Google Scholar search");

        let html = http::fetch_text(self.name(), &self.governor, || {
            self.client
                .get(&endpoint)
                .query(&[
                    ("q", q.as_str()),
                    ("hl", "en"),
                    ("as_sdt", "0,5"),
                    ("num", num.as_str()),
                ])
                .header("Accept-Language", "en-US,en;q=0.9")
        })
        .await?;

        let hits: Vec<RawHit> = parse_scholar_html(&html)?
            .into_iter()
            .take(max_results)
            .map(|card| RawHit::new(self.name(), HitPayload::Scraped(card)))
            .collect();
        tracing::debug!(source = self.name(), count = hits.len(), "Google Scholar hits parsed");
        Ok(hits)
    }
}

/// Remove leading `[PDF]`, `[HTML]`, `[CITATION]` style tags from a title.
fn strip_bracket_tags(title: &str) -> &str {
    let mut rest = title.trim_start();
    while rest.starts_with('[') {
        match rest.find(']') {
            Some(end) => rest = rest[end + 1..].trim_start(),
            None => break,
        }
    }
    rest
}

/// Parse a Scholar results page into cards.
pub(crate) fn parse_scholar_html(html: &str) -> Result<Vec<ScrapedHit>, SourceError> {
    let lowered = html.to_lowercase();
    if CAPTCHA_MARKERS.iter().any(|m| lowered.contains(m)) {
        return Err(SourceError::RateLimited(
            "Google Scholar served a CAPTCHA page".into(),
        ));
    }

    let document = Html::parse_document(html);
    let card_sel = scrape::selector("div.gs_ri")?;
    let title_sel = scrape::selector("h3.gs_rt")?;
    let link_sel = scrape::selector("h3.gs_rt a")?;
    let byline_sel = scrape::selector("div.gs_a")?;
    let snippet_sel = scrape::selector("div.gs_rs")?;

    let mut cards = 0usize;
    let mut results = Vec::new();

    for card in document.select(&card_sel) {
        cards += 1;
        let Some(title_el) = card.select(&title_sel).next() else {
            continue;
        };
        let title = strip_bracket_tags(&scrape::element_text(&title_el)).to_owned();
        if title.is_empty() {
            continue;
        }
        let url = card
            .select(&link_sel)
            .next()
            .and_then(|a| a.value().attr("href"))
            .unwrap_or_default()
            .to_owned();
        let byline = card
            .select(&byline_sel)
            .next()
            .map(|el| scrape::element_text(&el))
            .filter(|b| !b.is_empty());
        let snippet = card
            .select(&snippet_sel)
            .next()
            .map(|el| scrape::element_text(&el))
            .unwrap_or_default();

        results.push(ScrapedHit {
            title,
            url,
            snippet,
            byline,
        });
    }

    if results.is_empty() {
        if cards > 0 {
            return Err(SourceError::FormatChanged(format!(
                "Google Scholar returned {cards} cards without titles"
            )));
        }
        if lowered.contains(NO_RESULTS_MARKER) {
            return Ok(Vec::new());
        }
        return Err(SourceError::FormatChanged(
            "Google Scholar page has no result cards and no empty-result notice".into(),
        ));
    }

    Ok(results)
}
