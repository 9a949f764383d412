//! arXiv export API (Atom feed).
//!
//! `GET {base}/api/query?search_query=...` returns an Atom `feed` with one
//! `entry` per preprint. Elements are matched by local name so the
//! `arxiv:` extension namespace (DOI, categories) needs no special casing.

use async_trait::async_trait;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::adapter::SourceAdapter;
use crate::config::{EngineConfig, SourceConfig};
use crate::error::SourceError;
use crate::governor::RateGovernor;
use crate::http;
use crate::types::{HitPayload, Query, RawHit, SourceKind};

/// arXiv asks clients to keep pages at or below this size.
const MAX_PAGE_SIZE: usize = 100;

const ERROR_ID_PREFIX: &str = "http://arxiv.org/api/errors";

/// One Atom `entry` from the export API.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArxivEntry {
    /// Entry id, the versioned abstract URL.
    pub id: String,
    /// Title, possibly wrapped over several lines.
    pub title: String,
    /// Abstract.
    pub summary: String,
    /// RFC 3339 timestamp of the first version.
    pub published: Option<String>,
    /// Author names as published.
    pub authors: Vec<String>,
    /// Journal DOI supplied by the submitter.
    pub doi: Option<String>,
    /// HTML abstract page.
    pub abs_url: Option<String>,
    /// PDF link.
    pub pdf_url: Option<String>,
    /// Subject categories, primary first.
    pub categories: Vec<String>,
}

impl ArxivEntry {
    /// Year of first publication.
    pub fn year(&self) -> Option<i32> {
        self.published
            .as_deref()
            .and_then(|p| p.get(..4))
            .and_then(|y| y.parse().ok())
    }

    /// Abstract page URL, falling back to the entry id.
    pub fn landing_url(&self) -> String {
        self.abs_url.clone().unwrap_or_else(|| self.id.clone())
    }
}

/// arXiv adapter.
pub struct ArxivAdapter {
    config: SourceConfig,
    client: reqwest::Client,
    governor: RateGovernor,
}

impl ArxivAdapter {
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

    /// Build `search_query`: `all:"kw"` clauses joined with AND.
    pub(crate) fn search_query(query: &Query) -> String {
        query
            .search_terms(5)
            .iter()
            .map(|t| format!("all:\"{}\"", t.replace('"', "")))
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}

#[async_trait]
impl SourceAdapter for ArxivAdapter {
    fn name(&self) -> &str {
        self.config.name()
    }

    fn kind(&self) -> Option<SourceKind> {
        Some(SourceKind::Arxiv)
    }

    async fn fetch(&self, query: &Query, max_results: usize) -> Result<Vec<RawHit>, SourceError> {
        let search_query = Self::search_query(query);
        if search_query.is_empty() {
            return Ok(Vec::new());
        }
        let page = max_results.min(MAX_PAGE_SIZE).to_string();
        let endpoint = format!("{}/api/query", self.config.base_url());

        let xml = http::fetch_text(self.name(), &self.governor, || {
            self.client.get(&endpoint).query(&[
                ("search_query", search_query.as_str()),
                ("start", "0"),
                ("max_results", page.as_str()),
                ("sortBy", "relevance"),
            ])
        })
        .await?;

        let hits: Vec<RawHit> = parse_arxiv_feed(&xml)?
            .into_iter()
            .take(max_results)
            .map(|entry| RawHit::new(self.name(), HitPayload::Arxiv(entry)))
            .collect();
        tracing::debug!(source = self.name(), count = hits.len(), "arXiv entries parsed");
        Ok(hits)
    }
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn attr(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn absorb_link(entry: &mut ArxivEntry, e: &BytesStart<'_>) {
    match local_name(e).as_str() {
        "link" => {
            let href = attr(e, b"href");
            if attr(e, b"title").as_deref() == Some("pdf") {
                entry.pdf_url = href;
            } else if attr(e, b"rel").as_deref() == Some("alternate") {
                entry.abs_url = href;
            }
        }
        "primary_category" | "category" => {
            if let Some(term) = attr(e, b"term") {
                if !entry.categories.contains(&term) {
                    entry.categories.push(term);
                }
            }
        }
        _ => {}
    }
}

/// Parse an Atom feed from the export API.
///
/// # Errors
///
/// Returns [`SourceError::FormatChanged`] if the XML is malformed, the root
/// is not `feed`, or the feed is an API error report.
pub(crate) fn parse_arxiv_feed(xml: &str) -> Result<Vec<ArxivEntry>, SourceError> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<String> = Vec::new();
    let mut entries = Vec::new();
    let mut current: Option<ArxivEntry> = None;
    let mut saw_root = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| SourceError::FormatChanged(format!("arXiv XML: {e}")))?;
        match event {
            Event::Start(e) => {
                let name = local_name(&e);
                if stack.is_empty() {
                    if name != "feed" {
                        return Err(SourceError::FormatChanged(format!(
                            "arXiv root element is {name}, expected feed"
                        )));
                    }
                    saw_root = true;
                }
                if name == "entry" {
                    current = Some(ArxivEntry::default());
                } else if let Some(entry) = current.as_mut() {
                    absorb_link(entry, &e);
                }
                stack.push(name);
            }
            Event::Empty(e) => {
                if let Some(entry) = current.as_mut() {
                    absorb_link(entry, &e);
                }
            }
            Event::Text(t) => {
                let Some(entry) = current.as_mut() else {
                    continue;
                };
                let text = t
                    .unescape()
                    .map_err(|e| SourceError::FormatChanged(format!("arXiv XML text: {e}")))?;
                let name = stack.last().map(String::as_str).unwrap_or_default();
                let parent = stack
                    .len()
                    .checked_sub(2)
                    .and_then(|i| stack.get(i))
                    .map(String::as_str)
                    .unwrap_or_default();
                match (parent, name) {
                    ("entry", "id") => entry.id.push_str(text.trim()),
                    ("entry", "title") => entry.title.push_str(&text),
                    ("entry", "summary") => entry.summary.push_str(&text),
                    ("entry", "published") => entry.published = Some(text.trim().to_owned()),
                    ("entry", "doi") => entry.doi = Some(text.trim().to_owned()),
                    ("author", "name") => {
                        let author = text.trim();
                        if !author.is_empty() {
                            entry.authors.push(author.to_owned());
                        }
                    }
                    _ => {}
                }
            }
            Event::End(_) => {
                if stack.pop().as_deref() == Some("entry") {
                    if let Some(entry) = current.take() {
                        if entry.id.starts_with(ERROR_ID_PREFIX) {
                            return Err(SourceError::FormatChanged(format!(
                                "arXiv rejected the query: {}",
                                entry.summary.trim()
                            )));
                        }
                        entries.push(entry);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        return Err(SourceError::FormatChanged("arXiv returned an empty document".into()));
    }
    Ok(entries)
}
