//! Trait definition for source adapters.
//!
//! Each academic source (PubMed, Semantic Scholar, CORE, arXiv and the
//! scraped backends) implements [`SourceAdapter`] so the orchestrator can
//! fan a query out over a flat list of `Arc<dyn SourceAdapter>`.

use async_trait::async_trait;

use crate::error::SourceError;
use crate::types::{Query, RawHit, SourceKind};

/// One external academic data source.
///
/// Implementors translate a [`Query`] into their source's protocol and
/// return raw hits. Each adapter handles its own:
///
/// - request construction and query encoding
/// - waiting on its rate governor before every outbound call
/// - at most one bounded retry for rate limiting or network failures
/// - classifying every failure into a [`SourceError`] kind
///
/// A short page (fewer hits than requested without an explicit error) is a
/// success. All implementations must be `Send + Sync` for concurrent fan-out.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Source tag placed on every hit and failure, e.g. `"PubMed"`.
    fn name(&self) -> &str;

    /// Which built-in source this adapter talks to, if any.
    fn kind(&self) -> Option<SourceKind> {
        None
    }

    /// Fetch up to `max_results` hits for `query`.
    ///
    /// # Errors
    ///
    /// Returns a classified [`SourceError`]; raw transport errors never escape.
    async fn fetch(&self, query: &Query, max_results: usize) -> Result<Vec<RawHit>, SourceError>;
}
