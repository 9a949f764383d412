//! Engine and per-source adapter configuration.
//!
//! The engine never reads configuration files; the host builds an
//! [`EngineConfig`] and hands it over. Defaults are tuned for polite
//! collection: official APIs get short intervals, scrapers long ones.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use crate::error::SearchError;
use crate::types::SourceKind;

/// Configuration for one source adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Which source this adapter talks to.
    pub source: SourceKind,
    /// Display name used as the source tag. Defaults to [`SourceKind::name`].
    pub display_name: Option<String>,
    /// API key, where the source accepts or requires one.
    pub api_key: Option<String>,
    /// Minimum spacing between outbound calls in milliseconds.
    /// Defaults to [`default_interval_ms`] for the source.
    pub min_interval_ms: Option<u64>,
    /// Endpoint override, mainly for mirrors and tests.
    pub base_url: Option<String>,
    /// Disabled sources are skipped when building the adapter set.
    pub enabled: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self::new(SourceKind::PubMed)
    }
}

impl SourceConfig {
    /// Creates an enabled config with source defaults.
    pub fn new(source: SourceKind) -> Self {
        Self {
            source,
            display_name: None,
            api_key: None,
            min_interval_ms: None,
            base_url: None,
            enabled: true,
        }
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the endpoint base URL.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the minimum call spacing.
    #[must_use]
    pub fn with_min_interval_ms(mut self, ms: u64) -> Self {
        self.min_interval_ms = Some(ms);
        self
    }

    /// The source tag used on hits and failures.
    pub fn name(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| self.source.name())
    }

    /// The API key, if set and non-blank.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }

    /// Effective base URL without a trailing slash.
    pub fn base_url(&self) -> String {
        let url = self
            .base_url
            .as_deref()
            .unwrap_or_else(|| default_base_url(self.source));
        url.trim_end_matches('/').to_owned()
    }

    /// Effective minimum spacing between calls.
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(
            self.min_interval_ms
                .unwrap_or_else(|| default_interval_ms(self.source)),
        )
    }
}

/// Default minimum call spacing per source, in milliseconds.
pub fn default_interval_ms(source: SourceKind) -> u64 {
    match source {
        SourceKind::PubMed => 400,
        SourceKind::SemanticScholar => 1_000,
        SourceKind::Core => 6_000,
        SourceKind::Arxiv => 3_000,
        SourceKind::GoogleScholar => 5_000,
        SourceKind::DuckDuckGo => 3_000,
        SourceKind::ResearchGate => 4_000,
    }
}

/// Default public endpoint per source.
pub fn default_base_url(source: SourceKind) -> &'static str {
    match source {
        SourceKind::PubMed => "https://eutils.ncbi.nlm.nih.gov/entrez/eutils",
        SourceKind::SemanticScholar => "https://api.semanticscholar.org",
        SourceKind::Core => "https://api.core.ac.uk",
        SourceKind::Arxiv => "https://export.arxiv.org",
        SourceKind::GoogleScholar => "https://scholar.google.com",
        SourceKind::DuckDuckGo | SourceKind::ResearchGate => "https://html.duckduckgo.com",
    }
}

/// Engine-wide configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on `max_results` per source per query.
    pub max_results_ceiling: usize,
    /// Overall budget for one query, measured from dispatch.
    pub query_timeout_seconds: u64,
    /// Per-HTTP-request timeout.
    pub request_timeout_seconds: u64,
    /// Title token-set similarity needed for the fuzzy equivalence rule.
    pub similarity_threshold: f64,
    /// Custom User-Agent. If `None`, rotates through browser User-Agents.
    pub user_agent: Option<String>,
    /// Adapters available to collection runs.
    pub sources: Vec<SourceConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_results_ceiling: 100,
            query_timeout_seconds: 60,
            request_timeout_seconds: 20,
            similarity_threshold: 0.9,
            user_agent: None,
            sources: SourceKind::all()
                .iter()
                .map(|&kind| SourceConfig::new(kind))
                .collect(),
        }
    }
}

impl EngineConfig {
    /// The per-query budget.
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_seconds)
    }

    /// The per-request budget.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Clamps a requested result count to `1..=max_results_ceiling`.
    pub fn clamp_max_results(&self, requested: usize) -> usize {
        requested.clamp(1, self.max_results_ceiling.max(1))
    }

    /// Returns the config for `source`, if present.
    pub fn source(&self, source: SourceKind) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.source == source)
    }

    /// Validates this configuration, returning an error if any field is invalid.
    ///
    /// Checks:
    /// - `max_results_ceiling` must be greater than 0
    /// - both timeouts must be greater than 0
    /// - `similarity_threshold` must be in `(0, 1]`
    /// - each source appears at most once
    /// - base URL overrides must parse
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.max_results_ceiling == 0 {
            return Err(SearchError::Config(
                "max_results_ceiling must be greater than 0".into(),
            ));
        }
        if self.query_timeout_seconds == 0 {
            return Err(SearchError::Config(
                "query_timeout_seconds must be greater than 0".into(),
            ));
        }
        if self.request_timeout_seconds == 0 {
            return Err(SearchError::Config(
                "request_timeout_seconds must be greater than 0".into(),
            ));
        }
        if !(self.similarity_threshold > 0.0 && self.similarity_threshold <= 1.0) {
            return Err(SearchError::Config(
                "similarity_threshold must be in (0, 1]".into(),
            ));
        }
        let mut seen = HashSet::new();
        for source in &self.sources {
            if !seen.insert(source.source) {
                return Err(SearchError::Config(format!(
                    "source {} configured more than once",
                    source.source.key()
                )));
            }
            if let Some(ref base) = source.base_url {
                url::Url::parse(base).map_err(|e| {
                    SearchError::Config(format!(
                        "invalid base_url for {}: {e}",
                        source.source.key()
                    ))
                })?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sensible_values() {
        let config = EngineConfig::default();
        assert_eq!(config.max_results_ceiling, 100);
        assert_eq!(config.query_timeout_seconds, 60);
        assert!((config.similarity_threshold - 0.9).abs() < f64::EPSILON);
        assert_eq!(config.sources.len(), SourceKind::all().len());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn scrapers_are_throttled_harder_than_apis() {
        for kind in SourceKind::all() {
            if kind.is_scraper() {
                assert!(default_interval_ms(*kind) >= default_interval_ms(SourceKind::SemanticScholar));
            }
        }
        assert!(
            default_interval_ms(SourceKind::GoogleScholar) > default_interval_ms(SourceKind::PubMed)
        );
    }

    #[test]
    fn validate_rejects_zero_ceiling() {
        let config = EngineConfig {
            max_results_ceiling: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_results_ceiling"));
    }

    #[test]
    fn validate_rejects_zero_query_timeout() {
        let config = EngineConfig {
            query_timeout_seconds: 0,
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("query_timeout"));
    }

    #[test]
    fn validate_rejects_out_of_range_threshold() {
        for threshold in [0.0, -0.5, 1.5] {
            let config = EngineConfig {
                similarity_threshold: threshold,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "threshold {threshold} accepted");
        }
        let config = EngineConfig {
            similarity_threshold: 1.0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_duplicate_sources() {
        let config = EngineConfig {
            sources: vec![
                SourceConfig::new(SourceKind::Arxiv),
                SourceConfig::new(SourceKind::Arxiv),
            ],
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("arxiv"));
    }

    #[test]
    fn validate_rejects_bad_base_url() {
        let config = EngineConfig {
            sources: vec![SourceConfig::new(SourceKind::PubMed).with_base_url("not a url")],
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("base_url"));
    }

    #[test]
    fn clamp_max_results_applies_ceiling() {
        let config = EngineConfig::default();
        assert_eq!(config.clamp_max_results(500), 100);
        assert_eq!(config.clamp_max_results(0), 1);
        assert_eq!(config.clamp_max_results(25), 25);
    }

    #[test]
    fn source_config_defaults() {
        let config = SourceConfig::new(SourceKind::Arxiv);
        assert_eq!(config.name(), "arXiv");
        assert_eq!(config.min_interval(), Duration::from_millis(3_000));
        assert_eq!(config.base_url(), "https://export.arxiv.org");
        assert!(config.api_key().is_none());
    }

    #[test]
    fn source_config_overrides() {
        let config = SourceConfig {
            display_name: Some("A".into()),
            ..SourceConfig::new(SourceKind::Core)
        }
        .with_api_key("  ")
        .with_base_url("http://127.0.0.1:9000/")
        .with_min_interval_ms(5);
        assert_eq!(config.name(), "A");
        assert!(config.api_key().is_none(), "blank key counts as missing");
        assert_eq!(config.base_url(), "http://127.0.0.1:9000");
        assert_eq!(config.min_interval(), Duration::from_millis(5));
    }

    #[test]
    fn engine_config_deserializes_with_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"query_timeout_seconds": 30}"#).expect("deserialize");
        assert_eq!(config.query_timeout_seconds, 30);
        assert_eq!(config.max_results_ceiling, 100);
    }
}
