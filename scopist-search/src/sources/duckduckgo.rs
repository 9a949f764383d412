//! DuckDuckGo academic search: the HTML-only endpoint restricted to
//! scholarly sites.
//!
//! Uses `POST {base}/html/`, which requires no JavaScript. The query is
//! the keyword terms plus an OR-group of academic `site:` filters, so the
//! general web index acts as a fallback literature source.

use async_trait::async_trait;
use scraper::Html;
use url::Url;

use crate::adapter::SourceAdapter;
use crate::config::{EngineConfig, SourceConfig};
use crate::error::SourceError;
use crate::governor::RateGovernor;
use crate::http;
use crate::sources::scrape::{self, ScrapedHit};
use crate::types::{HitPayload, Query, RawHit, SourceKind};

/// Academic hosts included in the site filter.
const ACADEMIC_SITES: &[&str] = &[
    "scholar.google.com",
    "pubmed.ncbi.nlm.nih.gov",
    "arxiv.org",
    "researchgate.net",
    "sciencedirect.com",
    "springer.com",
];

const RESEARCH_TERMS: &str = "(research OR study OR analysis OR paper OR journal)";

/// Markers of DuckDuckGo's bot challenge page.
const CHALLENGE_MARKERS: &[&str] = &["anomaly-modal", "challenge-form", "bots use DuckDuckGo too"];

/// DuckDuckGo HTML scraper with an academic site filter.
pub struct DuckDuckGoAdapter {
    config: SourceConfig,
    client: reqwest::Client,
    governor: RateGovernor,
}

impl DuckDuckGoAdapter {
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

    /// Build the DuckDuckGo query string for `terms`.
    pub(crate) fn academic_query(terms: &[String]) -> String {
        let sites = ACADEMIC_SITES
            .iter()
            .map(|site| format!("site:{site}"))
            .collect::<Vec<_>>()
            .join(" OR ");
        format!("{} ({sites}) {RESEARCH_TERMS}", quote_terms(terms))
    }
}

#[async_trait]
impl SourceAdapter for DuckDuckGoAdapter {
    fn name(&self) -> &str {
        self.config.name()
    }

    fn kind(&self) -> Option<SourceKind> {
        Some(SourceKind::DuckDuckGo)
    }

    async fn fetch(&self, query: &Query, max_results: usize) -> Result<Vec<RawHit>, SourceError> {
        let terms = query.search_terms(5);
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let q = Self::academic_query(&terms);
        tracing::trace!(query = %q, "DuckDuckGo academic search");

        let cards = search_html(
            self.name(),
            &self.client,
            &self.governor,
            &self.config.base_url(),
            &q,
        )
        .await?;

        let hits: Vec<RawHit> = cards
            .into_iter()
            .filter(scrape::looks_academic)
            .take(max_results)
            .map(|card| RawHit::new(self.name(), HitPayload::Scraped(card)))
            .collect();
        tracing::debug!(source = self.name(), count = hits.len(), "DuckDuckGo hits kept");
        Ok(hits)
    }
}

/// Quote multi-word terms and join them with spaces.
pub(crate) fn quote_terms(terms: &[String]) -> String {
    terms
        .iter()
        .map(|t| {
            if t.contains(char::is_whitespace) {
                format!("\"{t}\"")
            } else {
                t.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// POST `q` to the HTML endpoint under `base` and parse the result cards.
pub(crate) async fn search_html(
    source: &str,
    client: &reqwest::Client,
    governor: &RateGovernor,
    base: &str,
    q: &str,
) -> Result<Vec<ScrapedHit>, SourceError> {
    let endpoint = format!("{base}/html/");
    let html = http::fetch_text(source, governor, || {
        client
            .post(&endpoint)
            .form(&[("q", q)])
            .header("Accept-Language", "en-US,en;q=0.9")
    })
    .await?;
    parse_duckduckgo_html(&html)
}

/// Extract the actual URL from DuckDuckGo's redirect wrapper.
///
/// DDG wraps URLs like `//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com&rut=...`.
fn extract_url(href: &str) -> Option<String> {
    let full_href = if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.to_string()
    };

    let parsed = Url::parse(&full_href).ok()?;

    if parsed.host_str() == Some("duckduckgo.com") && parsed.path().starts_with("/l/") {
        parsed
            .query_pairs()
            .find(|(key, _)| key == "uddg")
            .map(|(_, value)| value.into_owned())
    } else {
        Some(full_href)
    }
}

/// Parse a DuckDuckGo HTML response into result cards.
///
/// Distinguishes three outcomes: cards found, a recognised "no results"
/// page (empty success), and anything else (layout changed). A bot
/// challenge page is reported as rate limiting.
pub(crate) fn parse_duckduckgo_html(html: &str) -> Result<Vec<ScrapedHit>, SourceError> {
    if CHALLENGE_MARKERS.iter().any(|m| html.contains(m)) {
        return Err(SourceError::RateLimited(
            "DuckDuckGo served a bot challenge page".into(),
        ));
    }

    let document = Html::parse_document(html);
    let result_sel = scrape::selector(
        ".result.results_links.results_links_deep:not(.result--ad), .web-result:not(.result--ad)",
    )?;
    let title_sel = scrape::selector(".result__a")?;
    let snippet_sel = scrape::selector(".result__snippet")?;
    let no_results_sel = scrape::selector(".no-results, .result--no-result")?;

    let mut cards = 0usize;
    let mut results = Vec::new();

    for element in document.select(&result_sel) {
        cards += 1;
        let Some(title_el) = element.select(&title_sel).next() else {
            continue;
        };

        let title = scrape::element_text(&title_el);
        if title.is_empty() {
            continue;
        }

        let Some(url) = title_el.value().attr("href").and_then(extract_url) else {
            continue;
        };

        let snippet = element
            .select(&snippet_sel)
            .next()
            .map(|el| scrape::element_text(&el))
            .unwrap_or_default();

        results.push(ScrapedHit {
            title,
            url,
            snippet,
            byline: None,
        });
    }

    if results.is_empty() {
        if cards > 0 {
            return Err(SourceError::FormatChanged(format!(
                "DuckDuckGo returned {cards} result cards without titles or links"
            )));
        }
        if document.select(&no_results_sel).next().is_some() {
            return Ok(Vec::new());
        }
        return Err(SourceError::FormatChanged(
            "DuckDuckGo page has neither result cards nor a no-results marker".into(),
        ));
    }

    tracing::debug!(count = results.len(), "DuckDuckGo results parsed");
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MOCK_DDG_HTML: &str = r#"<!DOCTYPE html>
<html>
<body>
<div class="result results_links results_links_deep web-result">
    <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Farxiv.org%2Fabs%2F2101.00001&amp;rut=abc123">
        Caffeine   and Sleep Architecture
    </a>
    <div class="result__snippet">
        A randomized study of evening caffeine intake. doi:10.1000/xyz.2021
    </div>
</div>
<div class="result results_links results_links_deep web-result result--ad">
    <a class="result__a" href="https://ads.example.com/">Buy caffeine pills (Ad)</a>
</div>
<div class="result results_links results_links_deep web-result">
    <a class="result__a" href="https://www.researchgate.net/publication/123_Sleep_quality_in_students">
        Sleep quality in students
    </a>
    <div class="result__snippet">
        Survey data from three universities.
    </div>
</div>
<div class="result results_links results_links_deep web-result">
    <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fen.wikipedia.org%2Fwiki%2FCaffeine&amp;rut=def456">
        Caffeine - Wikipedia
    </a>
    <div class="result__snippet">Caffeine is a central nervous system stimulant.</div>
</div>
</body>
</html>"#;

    const NO_RESULTS_HTML: &str = r#"<html><body>
<div class="results"><div class="no-results">No results found for your query.</div></div>
</body></html>"#;

    fn adapter(base: &str) -> DuckDuckGoAdapter {
        let config = SourceConfig::new(SourceKind::DuckDuckGo)
            .with_base_url(base)
            .with_min_interval_ms(1);
        DuckDuckGoAdapter::new(config, &EngineConfig::default()).expect("adapter")
    }

    #[test]
    fn extract_url_from_ddg_redirect() {
        let href = "//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com%2Fpage&rut=abc";
        assert_eq!(extract_url(href), Some("https://example.com/page".to_string()));
    }

    #[test]
    fn extract_url_direct_link() {
        let href = "https://example.com/direct";
        assert_eq!(extract_url(href), Some("https://example.com/direct".to_string()));
    }

    #[test]
    fn extract_url_invalid() {
        assert!(extract_url("not-a-url").is_none());
    }

    #[test]
    fn parse_mock_html_skips_ads_and_unwraps_links() {
        let results = parse_duckduckgo_html(MOCK_DDG_HTML).expect("should parse");
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].title, "Caffeine and Sleep Architecture");
        assert_eq!(results[0].url, "https://arxiv.org/abs/2101.00001");
        assert!(results[0].snippet.contains("randomized study"));
        assert!(results.iter().all(|r| !r.title.contains("(Ad)")));
    }

    #[test]
    fn no_results_page_is_empty_success() {
        let results = parse_duckduckgo_html(NO_RESULTS_HTML).expect("should parse");
        assert!(results.is_empty());
    }

    #[test]
    fn unknown_layout_is_format_change() {
        let err = parse_duckduckgo_html("<html><body><main>redesigned</main></body></html>")
            .unwrap_err();
        assert!(matches!(err, SourceError::FormatChanged(_)));
    }

    #[test]
    fn cards_without_titles_are_format_change() {
        let html = r#"<div class="result results_links results_links_deep web-result">
            <span class="result__title-new">Caffeine</span></div>"#;
        let err = parse_duckduckgo_html(html).unwrap_err();
        assert!(matches!(err, SourceError::FormatChanged(_)));
    }

    #[test]
    fn challenge_page_is_rate_limited() {
        let html = r#"<html><body><div class="anomaly-modal__title">Unfortunately, bots use DuckDuckGo too.</div></body></html>"#;
        let err = parse_duckduckgo_html(html).unwrap_err();
        assert!(matches!(err, SourceError::RateLimited(_)));
    }

    #[test]
    fn academic_query_has_site_group_and_quotes() {
        let q = DuckDuckGoAdapter::academic_query(&["caffeine".into(), "sleep quality".into()]);
        assert!(q.starts_with("caffeine \"sleep quality\" (site:scholar.google.com OR "));
        assert!(q.contains("site:springer.com)"));
        assert!(q.ends_with(RESEARCH_TERMS));
    }

    #[tokio::test]
    async fn fetch_filters_non_academic_and_tags_source() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/html/"))
            .and(body_string_contains("caffeine"))
            .respond_with(ResponseTemplate::new(200).set_body_string(MOCK_DDG_HTML))
            .expect(1)
            .mount(&server)
            .await;

        let query = Query::new("effect of caffeine on sleep").with_keywords(["caffeine", "sleep"]);
        let hits = adapter(&server.uri()).fetch(&query, 10).await.expect("should succeed");

        assert_eq!(hits.len(), 2, "wikipedia card must be filtered");
        assert!(hits.iter().all(|h| h.source == "DuckDuckGo"));
    }

    #[tokio::test]
    async fn fetch_respects_max_results() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(MOCK_DDG_HTML))
            .mount(&server)
            .await;

        let hits = adapter(&server.uri())
            .fetch(&Query::new("caffeine"), 1)
            .await
            .expect("should succeed");
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<DuckDuckGoAdapter>();
    }

    #[tokio::test]
    #[ignore] // Live test — run with `cargo test -- --ignored`
    async fn live_duckduckgo_search() {
        let config = SourceConfig::new(SourceKind::DuckDuckGo);
        let adapter = DuckDuckGoAdapter::new(config, &EngineConfig::default()).expect("adapter");
        let query = Query::new("caffeine sleep").with_keywords(["caffeine", "sleep"]);
        let hits = adapter.fetch(&query, 10).await.expect("live search should work");
        assert!(!hits.is_empty());
    }
}
