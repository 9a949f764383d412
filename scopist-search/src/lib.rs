//! # scopist-search
//!
//! Literature collection engine for Scopist.
//!
//! Given a research query, this crate queries several academic sources
//! concurrently, maps their heterogeneous records onto one canonical
//! [`Article`] shape, removes the duplicates the same paper produces across
//! sources, and persists the result per project.
//!
//! ## Design
//!
//! - One [`SourceAdapter`] per source: PubMed, Semantic Scholar, CORE and
//!   arXiv through their official APIs; Google Scholar, DuckDuckGo and
//!   ResearchGate through scraped result pages
//! - Each adapter owns a [`RateGovernor`] enforcing strict minimum spacing
//!   between its outbound calls; governors share nothing
//! - [`FetchOrchestrator`] runs the selected adapters concurrently under one
//!   per-query deadline and reports per-source failures instead of failing
//! - [`Deduplicator`] merges by DOI, exact title, then fuzzy title plus a
//!   shared author surname, independent of arrival order
//! - [`CollectionStore`] keeps the merged set in the project directory and
//!   makes re-collection idempotent
//!
//! The engine never reads configuration files; hosts build an
//! [`EngineConfig`] and hand it over.

pub mod adapter;
pub mod config;
pub mod error;
pub mod governor;
pub mod http;
pub mod orchestrator;
pub mod sources;
pub mod store;
pub mod types;

pub use adapter::SourceAdapter;
pub use config::{EngineConfig, SourceConfig};
pub use error::{FailureKind, Result, SearchError, SourceError};
pub use governor::RateGovernor;
pub use orchestrator::{
    DedupStats, Deduplicator, FetchOrchestrator, FetchReport, RunEvent, SourceOutcome,
};
pub use store::{CollectionStore, StoreLock};
pub use types::{Article, HitPayload, Query, RawHit, SourceFailure, SourceKind};

/// Outcome of a full collection run for one project.
#[derive(Debug, Clone)]
pub struct CollectionReport {
    /// The project's full article set after the run.
    pub articles: Vec<Article>,
    /// Articles from this run that were not already stored.
    pub added: usize,
    /// Per-source details of the fetch phase.
    pub fetch: FetchReport,
}

/// Run a full collection: fetch, normalize, deduplicate, persist.
///
/// Holds the store's advisory lock for the whole run so two runs on the
/// same project never interleave.
///
/// # Errors
///
/// Returns [`SearchError::Store`] only when the store cannot be locked,
/// read or written. Source failures are reported in
/// [`CollectionReport::fetch`].
///
/// # Examples
///
/// ```no_run
/// # async fn example() -> scopist_search::Result<()> {
/// use scopist_search::{CollectionStore, EngineConfig, FetchOrchestrator, Query};
///
/// let orchestrator = FetchOrchestrator::from_config(EngineConfig::default())?;
/// let store = CollectionStore::open("projects/caffeine")?;
/// let query = Query::new("effect of caffeine on sleep").with_keywords(["caffeine", "sleep"]);
/// let report = scopist_search::collect(&query, &orchestrator, &store).await?;
/// println!("{} new, {} total", report.added, report.articles.len());
/// # Ok(())
/// # }
/// ```
pub async fn collect(
    query: &Query,
    orchestrator: &FetchOrchestrator,
    store: &CollectionStore,
) -> Result<CollectionReport> {
    let _lock = store.lock().await?;
    let fetch = orchestrator.run(query).await;
    let (articles, stats) = store.append_and_merge_with_stats(fetch.articles.clone())?;
    Ok(CollectionReport {
        articles,
        added: stats.added(),
        fetch,
    })
}
