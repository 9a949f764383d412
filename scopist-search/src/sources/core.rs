//! CORE v3 open-access aggregator search. Requires an API key.

use async_trait::async_trait;
use serde::Deserialize;

use crate::adapter::SourceAdapter;
use crate::config::{EngineConfig, SourceConfig};
use crate::error::SourceError;
use crate::governor::RateGovernor;
use crate::http;
use crate::types::{HitPayload, Query, RawHit, SourceKind};

const MAX_LIMIT: usize = 100;

/// An author entry on a CORE work.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CoreAuthor {
    /// Name, frequently in "Family, Given" form.
    #[serde(default)]
    pub name: Option<String>,
}

/// A work from `search/works`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CoreWork {
    /// CORE work id.
    pub id: serde_json::Value,
    /// Title.
    #[serde(default)]
    pub title: Option<String>,
    /// Authors in listed order.
    #[serde(default)]
    pub authors: Option<Vec<CoreAuthor>>,
    /// Abstract.
    #[serde(rename = "abstract", default)]
    pub abstract_text: Option<String>,
    /// Publication year.
    #[serde(rename = "yearPublished", default)]
    pub year_published: Option<i32>,
    /// DOI, unnormalized.
    #[serde(default)]
    pub doi: Option<String>,
    /// Full-text download link.
    #[serde(rename = "downloadUrl", default)]
    pub download_url: Option<String>,
}

impl CoreWork {
    /// Work id as a string regardless of its JSON type.
    pub fn id_string(&self) -> String {
        match &self.id {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Download URL, falling back to the CORE work page.
    pub fn landing_url(&self) -> String {
        self.download_url
            .clone()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| format!("https://core.ac.uk/works/{}", self.id_string()))
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Option<Vec<CoreWork>>,
}

/// CORE adapter.
pub struct CoreAdapter {
    config: SourceConfig,
    client: reqwest::Client,
    governor: RateGovernor,
}

impl CoreAdapter {
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

    /// Build the CORE query: `title:"kw"` clauses joined with AND.
    pub(crate) fn search_query(query: &Query) -> String {
        query
            .search_terms(5)
            .iter()
            .map(|t| format!("title:\"{}\"", t.replace('"', "")))
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}

/// Decode a `search/works` response body.
pub(crate) fn parse_search_response(body: &str) -> Result<Vec<CoreWork>, SourceError> {
    let parsed: SearchResponse = serde_json::from_str(body)
        .map_err(|e| SourceError::FormatChanged(format!("CORE JSON: {e}")))?;
    parsed
        .results
        .ok_or_else(|| SourceError::FormatChanged("CORE response lacks results".into()))
}

#[async_trait]
impl SourceAdapter for CoreAdapter {
    fn name(&self) -> &str {
        self.config.name()
    }

    fn kind(&self) -> Option<SourceKind> {
        Some(SourceKind::Core)
    }

    async fn fetch(&self, query: &Query, max_results: usize) -> Result<Vec<RawHit>, SourceError> {
        let Some(key) = self.config.api_key() else {
            return Err(SourceError::Auth(
                "CORE requires an API key; add one to the core source settings".into(),
            ));
        };
        let q = Self::search_query(query);
        if q.is_empty() {
            return Ok(Vec::new());
        }
        let limit = max_results.min(MAX_LIMIT).to_string();
        let endpoint = format!("{}/v3/search/works", self.config.base_url());

        let body = http::fetch_text(self.name(), &self.governor, || {
            self.client
                .get(&endpoint)
                .query(&[("q", q.as_str()), ("limit", limit.as_str())])
                .bearer_auth(key)
        })
        .await?;

        let hits: Vec<RawHit> = parse_search_response(&body)?
            .into_iter()
            .filter(|w| w.title.as_deref().is_some_and(|t| !t.trim().is_empty()))
            .take(max_results)
            .map(|work| RawHit::new(self.name(), HitPayload::Core(work)))
            .collect();
        tracing::debug!(source = self.name(), count = hits.len(), "CORE works parsed");
        Ok(hits)
    }
}
