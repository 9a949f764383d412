//! ResearchGate, reached through DuckDuckGo with a `site:` filter.
//!
//! ResearchGate blocks direct automated access, so the adapter asks the
//! DuckDuckGo HTML endpoint for `site:researchgate.net` results and keeps
//! only cards whose landing page is on researchgate.net.

use async_trait::async_trait;

use crate::adapter::SourceAdapter;
use crate::config::{EngineConfig, SourceConfig};
use crate::error::SourceError;
use crate::governor::RateGovernor;
use crate::http;
use crate::sources::duckduckgo::{quote_terms, search_html};
use crate::sources::scrape::{self, ScrapedHit};
use crate::types::{HitPayload, Query, RawHit, SourceKind};

const SITE: &str = "researchgate.net";

/// ResearchGate publication search via DuckDuckGo.
pub struct ResearchGateAdapter {
    config: SourceConfig,
    client: reqwest::Client,
    governor: RateGovernor,
}

impl ResearchGateAdapter {
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

fn on_researchgate(card: &ScrapedHit) -> bool {
    url::Url::parse(&card.url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_owned))
        .is_some_and(|host| host == SITE || host.ends_with(".researchgate.net"))
}

#[async_trait]
impl SourceAdapter for ResearchGateAdapter {
    fn name(&self) -> &str {
        self.config.name()
    }

    fn kind(&self) -> Option<SourceKind> {
        Some(SourceKind::ResearchGate)
    }

    async fn fetch(&self, query: &Query, max_results: usize) -> Result<Vec<RawHit>, SourceError> {
        let terms = query.search_terms(5);
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let q = format!("{} site:{SITE}", quote_terms(&terms));

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
            .filter(on_researchgate)
            .filter(scrape::looks_academic)
            .take(max_results)
            .map(|card| RawHit::new(self.name(), HitPayload::Scraped(card)))
            .collect();
        tracing::debug!(source = self.name(), count = hits.len(), "ResearchGate hits kept");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RG_HTML: &str = r#"<html><body>
<div class="result results_links results_links_deep web-result">
    <a class="result__a" href="https://www.researchgate.net/publication/3301_Caffeine_and_adenosine_in_sleep_regulation">
        (PDF) Caffeine and adenosine in sleep regulation
    </a>
    <div class="result__snippet">Caffeine blocks adenosine receptors. 2019</div>
</div>
<div class="result results_links results_links_deep web-result">
    <a class="result__a" href="https://mirror.example.com/rg/3301">
        Caffeine and adenosine in sleep regulation (mirror copy)
    </a>
    <div class="result__snippet">Copied research article.</div>
</div>
</body></html>"#;

    #[test]
    fn only_researchgate_hosts_pass() {
        let card = |url: &str| ScrapedHit {
            title: "t".into(),
            url: url.into(),
            snippet: String::new(),
            byline: None,
        };
        assert!(on_researchgate(&card("https://www.researchgate.net/publication/1")));
        assert!(on_researchgate(&card("https://researchgate.net/x")));
        assert!(!on_researchgate(&card("https://researchgate.net.evil.example/x")));
        assert!(!on_researchgate(&card("not a url")));
    }

    #[tokio::test]
    async fn fetch_keeps_only_researchgate_cards() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/html/"))
            .and(body_string_contains("researchgate.net"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RG_HTML))
            .expect(1)
            .mount(&server)
            .await;

        let config = SourceConfig::new(SourceKind::ResearchGate)
            .with_base_url(server.uri())
            .with_min_interval_ms(1);
        let adapter = ResearchGateAdapter::new(config, &EngineConfig::default()).expect("adapter");
        let hits = adapter
            .fetch(&Query::new("q").with_keywords(["caffeine", "adenosine"]), 10)
            .await
            .expect("should succeed");

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source, "ResearchGate");
    }

    #[tokio::test]
    async fn format_change_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>new</body></html>"))
            .mount(&server)
            .await;

        let config = SourceConfig::new(SourceKind::ResearchGate)
            .with_base_url(server.uri())
            .with_min_interval_ms(1);
        let adapter = ResearchGateAdapter::new(config, &EngineConfig::default()).expect("adapter");
        let err = adapter.fetch(&Query::new("caffeine"), 10).await.unwrap_err();
        assert!(matches!(err, SourceError::FormatChanged(_)));
    }
}
