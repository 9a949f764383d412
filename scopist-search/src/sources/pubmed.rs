//! PubMed via NCBI E-utilities.
//!
//! Two governed calls per query: `esearch` (JSON) resolves the query into
//! PMIDs, then `efetch` (XML) returns the `PubmedArticle` records, which
//! are parsed with a streaming quick-xml reader.

use async_trait::async_trait;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Deserialize;

use crate::adapter::SourceAdapter;
use crate::config::{EngineConfig, SourceConfig};
use crate::error::SourceError;
use crate::governor::RateGovernor;
use crate::http;
use crate::types::{HitPayload, Query, RawHit, SourceKind};

/// E-utilities caps `retmax` for JSON esearch at this value per call.
const MAX_RETMAX: usize = 100;

/// One author entry from an efetch record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PubMedAuthor {
    /// Family name.
    pub last_name: Option<String>,
    /// Given names.
    pub fore_name: Option<String>,
    /// Group author name, used instead of a personal name.
    pub collective_name: Option<String>,
}

/// One `PubmedArticle` from efetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PubMedRecord {
    /// PubMed identifier.
    pub pmid: String,
    /// Raw article title.
    pub title: String,
    /// Abstract sections, labelled ones prefixed with `LABEL: `.
    pub abstract_sections: Vec<String>,
    /// Authors in listed order.
    pub authors: Vec<PubMedAuthor>,
    /// Publication year resolved from PubDate, MedlineDate or ArticleDate.
    pub year: Option<i32>,
    /// DOI from the article id list or electronic location.
    pub doi: Option<String>,
    /// Journal title.
    pub journal: Option<String>,
}

impl PubMedRecord {
    /// Canonical PubMed landing page.
    pub fn url(&self) -> String {
        format!("https://pubmed.ncbi.nlm.nih.gov/{}/", self.pmid)
    }
}

#[derive(Debug, Deserialize)]
struct EsearchResponse {
    esearchresult: Option<EsearchResult>,
}

#[derive(Debug, Deserialize)]
struct EsearchResult {
    idlist: Option<Vec<String>>,
    #[serde(rename = "ERROR")]
    error: Option<String>,
}

/// PubMed E-utilities adapter.
pub struct PubMedAdapter {
    config: SourceConfig,
    client: reqwest::Client,
    governor: RateGovernor,
}

impl PubMedAdapter {
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

    /// Build the esearch `term`: up to five quoted terms joined with AND.
    pub(crate) fn search_term(query: &Query) -> String {
        query
            .search_terms(5)
            .iter()
            .map(|t| format!("\"{t}\""))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    async fn esearch(&self, term: &str, retmax: usize) -> Result<Vec<String>, SourceError> {
        let endpoint = format!("{}/esearch.fcgi", self.config.base_url());
        let retmax = retmax.to_string();
        let body = http::fetch_text(self.name(), &self.governor, || {
            let mut params = vec![
                ("db", "pubmed"),
                ("term", term),
                ("retmax", retmax.as_str()),
                ("retmode", "json"),
            ];
            if let Some(key) = self.config.api_key() {
                params.push(("api_key", key));
            }
            self.client.get(&endpoint).query(&params)
        })
        .await?;

        let parsed: EsearchResponse = serde_json::from_str(&body)
            .map_err(|e| SourceError::FormatChanged(format!("esearch JSON: {e}")))?;
        let result = parsed.esearchresult.ok_or_else(|| {
            SourceError::FormatChanged("esearch response lacks esearchresult".into())
        })?;
        match (result.idlist, result.error) {
            (Some(ids), _) => Ok(ids),
            (None, Some(err)) => Err(SourceError::FormatChanged(format!("esearch error: {err}"))),
            (None, None) => Err(SourceError::FormatChanged(
                "esearch response lacks idlist".into(),
            )),
        }
    }

    async fn efetch(&self, ids: &[String]) -> Result<String, SourceError> {
        let endpoint = format!("{}/efetch.fcgi", self.config.base_url());
        let id_list = ids.join(",");
        http::fetch_text(self.name(), &self.governor, || {
            let mut params = vec![
                ("db", "pubmed"),
                ("id", id_list.as_str()),
                ("retmode", "xml"),
                ("rettype", "abstract"),
            ];
            if let Some(key) = self.config.api_key() {
                params.push(("api_key", key));
            }
            self.client.get(&endpoint).query(&params)
        })
        .await
    }
}

#[async_trait]
impl SourceAdapter for PubMedAdapter {
    fn name(&self) -> &str {
        self.config.name()
    }

    fn kind(&self) -> Option<SourceKind> {
        Some(SourceKind::PubMed)
    }

    async fn fetch(&self, query: &Query, max_results: usize) -> Result<Vec<RawHit>, SourceError> {
        let term = Self::search_term(query);
        if term.is_empty() {
            return Ok(Vec::new());
        }
        tracing::trace!(term = %term, "PubMed esearch");

        let ids = self.esearch(&term, max_results.min(MAX_RETMAX)).await?;
        if ids.is_empty() {
            tracing::debug!(source = self.name(), "PubMed esearch matched nothing");
            return Ok(Vec::new());
        }

        let xml = self.efetch(&ids).await?;
        let hits: Vec<RawHit> = parse_pubmed_xml(&xml)?
            .into_iter()
            .take(max_results)
            .map(|record| RawHit::new(self.name(), HitPayload::PubMed(record)))
            .collect();
        tracing::debug!(
            source = self.name(),
            requested = ids.len(),
            count = hits.len(),
            "PubMed records parsed"
        );
        Ok(hits)
    }
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn attr_value(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn first_year(text: &str) -> Option<i32> {
    text.split(|c: char| !c.is_ascii_digit())
        .find(|chunk| chunk.len() == 4)
        .and_then(|chunk| chunk.parse().ok())
}

/// Per-record accumulation state while streaming efetch XML.
#[derive(Default)]
struct RecordBuilder {
    record: PubMedRecord,
    abstract_label: Option<String>,
    abstract_text: String,
    author: PubMedAuthor,
    pub_year: Option<i32>,
    medline_year: Option<i32>,
    article_year: Option<i32>,
    id_type: Option<String>,
    eloc_doi: Option<String>,
    eloc_type: Option<String>,
}

impl RecordBuilder {
    fn finish(mut self) -> PubMedRecord {
        self.record.year = self.pub_year.or(self.medline_year).or(self.article_year);
        if self.record.doi.is_none() {
            self.record.doi = self.eloc_doi;
        }
        self.record
    }
}

/// Parse an efetch `PubmedArticleSet` document.
///
/// # Errors
///
/// Returns [`SourceError::FormatChanged`] if the document is not well-formed
/// XML or its root is not `PubmedArticleSet`.
pub(crate) fn parse_pubmed_xml(xml: &str) -> Result<Vec<PubMedRecord>, SourceError> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<String> = Vec::new();
    let mut records = Vec::new();
    let mut current: Option<RecordBuilder> = None;
    let mut saw_root = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| SourceError::FormatChanged(format!("efetch XML: {e}")))?;
        match event {
            Event::Start(e) => {
                let name = local_name(&e);
                if stack.is_empty() {
                    if name != "PubmedArticleSet" {
                        return Err(SourceError::FormatChanged(format!(
                            "efetch root element is {name}, expected PubmedArticleSet"
                        )));
                    }
                    saw_root = true;
                }
                match name.as_str() {
                    "PubmedArticle" => current = Some(RecordBuilder::default()),
                    "AbstractText" => {
                        if let Some(b) = current.as_mut() {
                            b.abstract_label = attr_value(&e, b"Label");
                            b.abstract_text.clear();
                        }
                    }
                    "Author" => {
                        if let Some(b) = current.as_mut() {
                            b.author = PubMedAuthor::default();
                        }
                    }
                    "ArticleId" => {
                        if let Some(b) = current.as_mut() {
                            b.id_type = attr_value(&e, b"IdType");
                        }
                    }
                    "ELocationID" => {
                        if let Some(b) = current.as_mut() {
                            b.eloc_type = attr_value(&e, b"EIdType");
                        }
                    }
                    _ => {}
                }
                stack.push(name);
            }
            Event::Text(t) => {
                let text = t
                    .unescape()
                    .map_err(|e| SourceError::FormatChanged(format!("efetch XML text: {e}")))?;
                if let Some(b) = current.as_mut() {
                    absorb_text(b, &stack, &text);
                }
            }
            Event::CData(t) => {
                let text = String::from_utf8_lossy(&t).into_owned();
                if let Some(b) = current.as_mut() {
                    absorb_text(b, &stack, &text);
                }
            }
            Event::End(_) => {
                let name = stack.pop().unwrap_or_default();
                if name == "PubmedArticle" {
                    if let Some(b) = current.take() {
                        records.push(b.finish());
                    }
                    continue;
                }
                let parent = stack.last().map(String::as_str).unwrap_or_default();
                let Some(b) = current.as_mut() else {
                    continue;
                };
                match name.as_str() {
                    "AbstractText" => {
                        let text = crate::sources::scrape::collapse_whitespace(&b.abstract_text);
                        if !text.is_empty() {
                            let section = match b.abstract_label.take() {
                                Some(label) if !label.is_empty() => format!("{label}: {text}"),
                                _ => text,
                            };
                            b.record.abstract_sections.push(section);
                        }
                    }
                    "Author" if parent == "AuthorList" => {
                        let author = std::mem::take(&mut b.author);
                        if author.last_name.is_some() || author.collective_name.is_some() {
                            b.record.authors.push(author);
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        return Err(SourceError::FormatChanged(
            "efetch returned an empty document".into(),
        ));
    }
    Ok(records)
}

fn absorb_text(b: &mut RecordBuilder, stack: &[String], text: &str) {
    let Some(name) = stack.last().map(String::as_str) else {
        return;
    };
    let parent = stack
        .len()
        .checked_sub(2)
        .and_then(|i| stack.get(i))
        .map(String::as_str)
        .unwrap_or_default();
    let within = |tag: &str| stack.iter().any(|n| n == tag);

    if within("ArticleTitle") {
        b.record.title.push_str(text);
    } else if within("AbstractText") {
        b.abstract_text.push_str(text);
    } else if name == "PMID" && parent == "MedlineCitation" && b.record.pmid.is_empty() {
        b.record.pmid = text.trim().to_owned();
    } else if parent == "Author" && within("AuthorList") {
        let value = Some(text.trim().to_owned()).filter(|v| !v.is_empty());
        match name {
            "LastName" => b.author.last_name = value,
            "ForeName" => b.author.fore_name = value,
            "CollectiveName" => b.author.collective_name = value,
            _ => {}
        }
    } else if parent == "PubDate" && within("JournalIssue") {
        match name {
            "Year" => b.pub_year = text.trim().parse().ok(),
            "MedlineDate" => b.medline_year = first_year(text),
            _ => {}
        }
    } else if name == "Year" && parent == "ArticleDate" {
        b.article_year = text.trim().parse().ok();
    } else if name == "Title" && parent == "Journal" {
        b.record.journal = Some(text.trim().to_owned());
    } else if name == "ArticleId"
        && parent == "ArticleIdList"
        && stack.iter().rev().nth(2).is_some_and(|g| g == "PubmedData")
        && b.id_type.as_deref() == Some("doi")
    {
        b.record.doi = Some(text.trim().to_owned());
    } else if name == "ELocationID" && b.eloc_type.as_deref() == Some("doi") {
        b.eloc_doi = Some(text.trim().to_owned());
    }
}
