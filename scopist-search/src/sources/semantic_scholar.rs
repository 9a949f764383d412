//! Semantic Scholar Graph API paper search.

use async_trait::async_trait;
use serde::Deserialize;

use crate::adapter::SourceAdapter;
use crate::config::{EngineConfig, SourceConfig};
use crate::error::SourceError;
use crate::governor::RateGovernor;
use crate::http;
use crate::types::{HitPayload, Query, RawHit, SourceKind};

const FIELDS: &str = "title,url,abstract,authors,year,venue,externalIds";

/// The search endpoint returns at most this many papers per page.
const MAX_LIMIT: usize = 100;

/// An author reference inside a paper.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SemanticScholarAuthor {
    /// Author id, when Semantic Scholar has disambiguated the author.
    #[serde(rename = "authorId", default)]
    pub author_id: Option<String>,
    /// Display name as published.
    #[serde(default)]
    pub name: Option<String>,
}

/// External identifiers attached to a paper.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ExternalIds {
    /// DOI, unnormalized.
    #[serde(rename = "DOI", default)]
    pub doi: Option<String>,
    /// arXiv identifier.
    #[serde(rename = "ArXiv", default)]
    pub arxiv: Option<String>,
    /// PubMed identifier.
    #[serde(rename = "PubMed", default)]
    pub pubmed: Option<String>,
}

/// A paper from the `paper/search` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SemanticScholarPaper {
    /// Semantic Scholar paper id.
    #[serde(rename = "paperId")]
    pub paper_id: String,
    /// Title.
    #[serde(default)]
    pub title: Option<String>,
    /// Landing page on semanticscholar.org.
    #[serde(default)]
    pub url: Option<String>,
    /// Abstract, often absent for publisher-restricted papers.
    #[serde(rename = "abstract", default)]
    pub abstract_text: Option<String>,
    /// Authors in listed order.
    #[serde(default)]
    pub authors: Vec<SemanticScholarAuthor>,
    /// Publication year.
    #[serde(default)]
    pub year: Option<i32>,
    /// Venue name.
    #[serde(default)]
    pub venue: Option<String>,
    /// DOI and other identifiers.
    #[serde(rename = "externalIds", default)]
    pub external_ids: Option<ExternalIds>,
}

impl SemanticScholarPaper {
    /// The paper URL, falling back to the canonical paper page.
    pub fn landing_url(&self) -> String {
        self.url
            .clone()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| format!("https://www.semanticscholar.org/paper/{}", self.paper_id))
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    total: Option<u64>,
    data: Option<Vec<SemanticScholarPaper>>,
}

/// Semantic Scholar adapter.
pub struct SemanticScholarAdapter {
    config: SourceConfig,
    client: reqwest::Client,
    governor: RateGovernor,
}

impl SemanticScholarAdapter {
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

/// Decode a search response body.
pub(crate) fn parse_search_response(body: &str) -> Result<Vec<SemanticScholarPaper>, SourceError> {
    let parsed: SearchResponse = serde_json::from_str(body)
        .map_err(|e| SourceError::FormatChanged(format!("Semantic Scholar JSON: {e}")))?;
    match (parsed.data, parsed.total) {
        (Some(papers), _) => Ok(papers),
        (None, Some(_)) => Ok(Vec::new()),
        (None, None) => Err(SourceError::FormatChanged(
            "Semantic Scholar response has neither data nor total".into(),
        )),
    }
}

#[async_trait]
impl SourceAdapter for SemanticScholarAdapter {
    fn name(&self) -> &str {
        self.config.name()
    }

    fn kind(&self) -> Option<SourceKind> {
        Some(SourceKind::SemanticScholar)
    }

    async fn fetch(&self, query: &Query, max_results: usize) -> Result<Vec<RawHit>, SourceError> {
        let terms = query.search_terms(5);
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let q = terms.join(" ");
        let limit = max_results.min(MAX_LIMIT).to_string();
        let endpoint = format!("{}/graph/v1/paper/search", self.config.base_url());

        let body = http::fetch_text(self.name(), &self.governor, || {
            let mut request = self.client.get(&endpoint).query(&[
                ("query", q.as_str()),
                ("limit", limit.as_str()),
                ("fields", FIELDS),
            ]);
            if let Some(key) = self.config.api_key() {
                request = request.header("x-api-key", key);
            }
            request
        })
        .await?;

        let hits: Vec<RawHit> = parse_search_response(&body)?
            .into_iter()
            .filter(|p| p.title.as_deref().is_some_and(|t| !t.trim().is_empty()))
            .take(max_results)
            .map(|paper| RawHit::new(self.name(), HitPayload::SemanticScholar(paper)))
            .collect();
        tracing::debug!(source = self.name(), count = hits.len(), "Semantic Scholar papers parsed");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SEARCH_JSON: &str = r#"{
      "total": 2, "offset": 0,
      "data": [
        {"paperId": "abc123", "title": "Caffeine and Sleep", "url": "https://www.semanticscholar.org/paper/abc123",
         "abstract": "We review...", "year": 2008, "venue": "Sleep Med Rev",
         "authors": [{"authorId": "1", "name": "Timothy Roehrs"}, {"authorId": null, "name": "Thomas Roth"}],
         "externalIds": {"DOI": "10.1016/J.SMRV.2007.07.001", "PubMed": "17950009"}},
        {"paperId": "def456", "title": "Coffee, tea and insomnia", "url": null, "abstract": null,
         "year": null, "authors": [], "externalIds": null}
      ]
    }"#;

    fn adapter(base: &str, key: Option<&str>) -> SemanticScholarAdapter {
        let mut config = SourceConfig::new(SourceKind::SemanticScholar)
            .with_base_url(base)
            .with_min_interval_ms(1);
        config.api_key = key.map(str::to_owned);
        SemanticScholarAdapter::new(config, &EngineConfig::default()).expect("adapter")
    }

    #[test]
    fn parses_papers_and_optional_fields() {
        let papers = parse_search_response(SEARCH_JSON).expect("should parse");
        assert_eq!(papers.len(), 2);
        assert_eq!(papers[0].authors[1].name.as_deref(), Some("Thomas Roth"));
        assert_eq!(
            papers[0].external_ids.as_ref().and_then(|e| e.doi.as_deref()),
            Some("10.1016/J.SMRV.2007.07.001")
        );
        assert!(papers[1].external_ids.is_none());
        assert_eq!(
            papers[1].landing_url(),
            "https://www.semanticscholar.org/paper/def456"
        );
    }

    #[test]
    fn total_without_data_is_empty_success() {
        assert!(parse_search_response(r#"{"total": 0, "offset": 0}"#)
            .expect("should parse")
            .is_empty());
    }

    #[test]
    fn unknown_shape_is_format_change() {
        assert!(matches!(
            parse_search_response(r#"{"message": "Internal Server Error"}"#),
            Err(SourceError::FormatChanged(_))
        ));
        assert!(matches!(
            parse_search_response("<html></html>"),
            Err(SourceError::FormatChanged(_))
        ));
    }

    #[tokio::test]
    async fn fetch_sends_key_header_and_fields() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/graph/v1/paper/search"))
            .and(query_param("query", "caffeine sleep"))
            .and(query_param("fields", FIELDS))
            .and(header("x-api-key", "s2-key"))
            .respond_with(ResponseTemplate::new(200).set_body_string(SEARCH_JSON))
            .expect(1)
            .mount(&server)
            .await;

        let query = Query::new("q").with_keywords(["caffeine", "sleep"]);
        let hits = adapter(&server.uri(), Some("s2-key"))
            .fetch(&query, 10)
            .await
            .expect("should succeed");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].source, "Semantic Scholar");
    }

    #[tokio::test]
    async fn rate_limit_is_reported_after_single_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).set_body_string(r#"{"message":"Too Many Requests"}"#))
            .expect(2)
            .mount(&server)
            .await;

        let err = adapter(&server.uri(), None)
            .fetch(&Query::new("caffeine"), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::RateLimited(_)));
    }
}
