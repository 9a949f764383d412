//! Source adapter implementations.
//!
//! Each module provides a struct implementing [`crate::adapter::SourceAdapter`]
//! for one academic source. Official APIs decode JSON or XML; scrapers parse
//! result pages with CSS selectors and report layout drift as
//! [`crate::error::SourceError::FormatChanged`].

pub mod arxiv;
pub mod core;
pub mod duckduckgo;
pub mod google_scholar;
pub mod pubmed;
pub mod researchgate;
pub mod scrape;
pub mod semantic_scholar;

use std::sync::Arc;

use crate::adapter::SourceAdapter;
use crate::config::{EngineConfig, SourceConfig};
use crate::types::SourceKind;

pub use arxiv::ArxivAdapter;
pub use self::core::CoreAdapter;
pub use duckduckgo::DuckDuckGoAdapter;
pub use google_scholar::GoogleScholarAdapter;
pub use pubmed::PubMedAdapter;
pub use researchgate::ResearchGateAdapter;
pub use semantic_scholar::SemanticScholarAdapter;

/// Build the adapter for one source config.
///
/// # Errors
///
/// Returns [`crate::SearchError::Http`] if the HTTP client cannot be built.
pub fn build_adapter(
    config: &SourceConfig,
    engine: &EngineConfig,
) -> crate::Result<Arc<dyn SourceAdapter>> {
    let config = config.clone();
    let adapter: Arc<dyn SourceAdapter> = match config.source {
        SourceKind::PubMed => Arc::new(PubMedAdapter::new(config, engine)?),
        SourceKind::SemanticScholar => Arc::new(SemanticScholarAdapter::new(config, engine)?),
        SourceKind::Core => Arc::new(CoreAdapter::new(config, engine)?),
        SourceKind::Arxiv => Arc::new(ArxivAdapter::new(config, engine)?),
        SourceKind::GoogleScholar => Arc::new(GoogleScholarAdapter::new(config, engine)?),
        SourceKind::DuckDuckGo => Arc::new(DuckDuckGoAdapter::new(config, engine)?),
        SourceKind::ResearchGate => Arc::new(ResearchGateAdapter::new(config, engine)?),
    };
    Ok(adapter)
}

/// Build adapters for every enabled source in `engine`.
///
/// # Errors
///
/// Returns [`crate::SearchError::Config`] if the config is invalid, or
/// [`crate::SearchError::Http`] if an HTTP client cannot be built.
pub fn build_adapters(engine: &EngineConfig) -> crate::Result<Vec<Arc<dyn SourceAdapter>>> {
    engine.validate()?;
    engine
        .sources
        .iter()
        .filter(|s| s.enabled)
        .map(|s| build_adapter(s, engine))
        .collect()
}
