//! Core types: source identification, queries, raw hits and canonical articles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::FailureKind;
use crate::sources::arxiv::ArxivEntry;
use crate::sources::core::CoreWork;
use crate::sources::pubmed::PubMedRecord;
use crate::sources::scrape::ScrapedHit;
use crate::sources::semantic_scholar::SemanticScholarPaper;

/// Academic data sources the engine knows how to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// NCBI PubMed via E-utilities.
    PubMed,
    /// Semantic Scholar Graph API.
    SemanticScholar,
    /// CORE v3 API (API key required).
    Core,
    /// arXiv export API (Atom feed).
    Arxiv,
    /// Google Scholar result pages, scraped.
    GoogleScholar,
    /// DuckDuckGo HTML endpoint restricted to academic sites.
    DuckDuckGo,
    /// ResearchGate, reached through DuckDuckGo with a site filter.
    ResearchGate,
}

impl SourceKind {
    /// Returns the human-readable name used as the source tag on hits.
    pub fn name(&self) -> &'static str {
        match self {
            Self::PubMed => "PubMed",
            Self::SemanticScholar => "Semantic Scholar",
            Self::Core => "CORE",
            Self::Arxiv => "arXiv",
            Self::GoogleScholar => "Google Scholar",
            Self::DuckDuckGo => "DuckDuckGo",
            Self::ResearchGate => "ResearchGate",
        }
    }

    /// Returns the configuration key, e.g. `semantic_scholar`.
    pub fn key(&self) -> &'static str {
        match self {
            Self::PubMed => "pubmed",
            Self::SemanticScholar => "semantic_scholar",
            Self::Core => "core",
            Self::Arxiv => "arxiv",
            Self::GoogleScholar => "google_scholar",
            Self::DuckDuckGo => "duckduckgo",
            Self::ResearchGate => "researchgate",
        }
    }

    /// Whether results come from scraping HTML rather than an official API.
    pub fn is_scraper(&self) -> bool {
        matches!(
            self,
            Self::GoogleScholar | Self::DuckDuckGo | Self::ResearchGate
        )
    }

    /// Returns all known sources.
    pub fn all() -> &'static [SourceKind] {
        &[
            Self::PubMed,
            Self::SemanticScholar,
            Self::Core,
            Self::Arxiv,
            Self::GoogleScholar,
            Self::DuckDuckGo,
            Self::ResearchGate,
        ]
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    /// Accepts the config key or the display name, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::all()
            .iter()
            .copied()
            .find(|kind| {
                kind.key().eq_ignore_ascii_case(wanted) || kind.name().eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| format!("unknown source: {wanted}"))
    }
}

/// A research query, immutable once dispatched.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Free-text research question.
    pub text: String,
    /// Ordered keyword terms. Adapters use a prefix of these.
    pub keywords: Vec<String>,
    /// Selected source names (adapter names or config keys). Empty selects all.
    pub sources: Vec<String>,
    /// Requested hits per source, clamped to the engine ceiling.
    pub max_results: usize,
    /// Overrides the engine's per-query timeout.
    pub timeout: Option<Duration>,
}

impl Query {
    /// Creates a query with no keywords, all sources and 100 results per source.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keywords: Vec::new(),
            sources: Vec::new(),
            max_results: 100,
            timeout: None,
        }
    }

    /// Sets the keyword terms.
    #[must_use]
    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// Restricts the query to the named sources.
    #[must_use]
    pub fn with_sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sources = sources.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the requested hits per source.
    #[must_use]
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    /// Overrides the per-query timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns up to `limit` non-blank keywords, falling back to the
    /// question's content words when no keywords were given.
    pub fn search_terms(&self, limit: usize) -> Vec<String> {
        let terms: Vec<String> = self
            .keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .take(limit)
            .map(str::to_owned)
            .collect();
        if terms.is_empty() {
            extract_terms(&self.text).into_iter().take(limit).collect()
        } else {
            terms
        }
    }

    /// Whether the named adapter is selected by this query.
    pub fn selects(&self, adapter_name: &str, kind: Option<SourceKind>) -> bool {
        if self.sources.is_empty() {
            return true;
        }
        self.sources.iter().any(|wanted| {
            let wanted = wanted.trim();
            wanted.eq_ignore_ascii_case(adapter_name)
                || kind.is_some_and(|k| {
                    wanted.eq_ignore_ascii_case(k.key()) || wanted.eq_ignore_ascii_case(k.name())
                })
        })
    }
}

/// Most content words taken from a question.
pub const MAX_EXTRACTED_TERMS: usize = 10;

/// Question words, connectives and relation nouns that make poor search terms.
const STOP_WORDS: &[&str] = &[
    "is", "are", "was", "were", "can", "could", "will", "would", "should", "shall", "does", "do",
    "did", "has", "have", "had", "the", "a", "an", "and", "or", "but", "in", "on", "at", "to",
    "for", "of", "with", "by", "from", "about", "into", "through", "there", "what", "which",
    "who", "when", "where", "why", "how", "that", "this", "these", "those", "between", "among",
    "relationship", "correlation", "effect", "impact", "influence", "association", "comparison",
];

/// Content words of a research question, in order of first appearance.
///
/// Words are lowercased ASCII alphanumeric runs starting with a letter;
/// stop words and words of two letters or fewer are dropped, as are
/// repeats. At most [`MAX_EXTRACTED_TERMS`] are returned.
pub fn extract_terms(question: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for word in question
        .to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| w.starts_with(|c: char| c.is_ascii_alphabetic()))
    {
        if word.len() <= 2 || STOP_WORDS.contains(&word) || terms.iter().any(|t| t == word) {
            continue;
        }
        terms.push(word.to_owned());
        if terms.len() == MAX_EXTRACTED_TERMS {
            break;
        }
    }
    terms
}

/// Source-specific payload of a hit, one variant per protocol family.
#[derive(Debug, Clone, PartialEq)]
pub enum HitPayload {
    /// A `PubmedArticle` from efetch.
    PubMed(PubMedRecord),
    /// A paper from the Semantic Scholar search endpoint.
    SemanticScholar(SemanticScholarPaper),
    /// A work from CORE search.
    Core(CoreWork),
    /// An Atom entry from the arXiv export API.
    Arxiv(ArxivEntry),
    /// A scraped result card (Google Scholar, DuckDuckGo, ResearchGate).
    Scraped(ScrapedHit),
}

/// An unprocessed result as returned by one adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct RawHit {
    /// Name of the adapter that produced the hit.
    pub source: String,
    /// When the adapter received the response.
    pub fetched_at: DateTime<Utc>,
    /// The source-specific record.
    pub payload: HitPayload,
}

impl RawHit {
    /// Creates a hit stamped with the current time.
    pub fn new(source: impl Into<String>, payload: HitPayload) -> Self {
        Self {
            source: source.into(),
            fetched_at: Utc::now(),
            payload,
        }
    }
}

/// The canonical, deduplicated representation of one paper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    /// Whitespace-normalized title, never empty.
    pub title: String,
    /// Author names in "Given Family" order where the source distinguishes them.
    #[serde(default)]
    pub authors: Vec<String>,
    /// Publication year.
    #[serde(default)]
    pub year: Option<i32>,
    /// Normalized DOI: lowercase, no resolver prefix.
    #[serde(default)]
    pub doi: Option<String>,
    /// Abstract or snippet text.
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
    /// Every source that produced this article. Never empty.
    pub source_names: BTreeSet<String>,
    /// Landing URL per source.
    #[serde(default)]
    pub source_urls: BTreeMap<String, String>,
    /// Set once when the article was first observed.
    pub first_seen_at: DateTime<Utc>,
}

impl Article {
    /// Creates an article observed by a single source.
    pub fn new(
        title: impl Into<String>,
        source: impl Into<String>,
        first_seen_at: DateTime<Utc>,
    ) -> Self {
        let mut source_names = BTreeSet::new();
        source_names.insert(source.into());
        Self {
            title: title.into(),
            authors: Vec::new(),
            year: None,
            doi: None,
            abstract_text: None,
            source_names,
            source_urls: BTreeMap::new(),
            first_seen_at,
        }
    }

    /// Key used by screening collaborators: the DOI when present, else the
    /// normalized title.
    pub fn screening_key(&self) -> String {
        match &self.doi {
            Some(doi) => doi.clone(),
            None => crate::orchestrator::dedup::normalize_title(&self.title),
        }
    }

    /// First URL in source-name order, if any source reported one.
    pub fn primary_url(&self) -> Option<&str> {
        self.source_urls.values().next().map(String::as_str)
    }
}

/// A per-source failure entry in a run report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFailure {
    /// Adapter name.
    pub source: String,
    /// Failure category.
    pub kind: FailureKind,
    /// Human-readable detail.
    pub detail: String,
}

impl fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.source, self.kind, self.detail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_kind_name_and_key() {
        assert_eq!(SourceKind::SemanticScholar.name(), "Semantic Scholar");
        assert_eq!(SourceKind::SemanticScholar.key(), "semantic_scholar");
        assert_eq!(SourceKind::Core.to_string(), "CORE");
    }

    #[test]
    fn source_kind_parses_key_or_name() {
        assert_eq!("pubmed".parse::<SourceKind>(), Ok(SourceKind::PubMed));
        assert_eq!("PubMed".parse::<SourceKind>(), Ok(SourceKind::PubMed));
        assert_eq!(
            "google scholar".parse::<SourceKind>(),
            Ok(SourceKind::GoogleScholar)
        );
        assert!("scopus".parse::<SourceKind>().is_err());
    }

    #[test]
    fn source_kind_all_is_complete() {
        assert_eq!(SourceKind::all().len(), 7);
        assert!(SourceKind::GoogleScholar.is_scraper());
        assert!(!SourceKind::PubMed.is_scraper());
    }

    #[test]
    fn source_kind_serde_uses_keys() {
        let json = serde_json::to_string(&SourceKind::GoogleScholar).expect("serialize");
        assert_eq!(json, "\"google_scholar\"");
        let back: SourceKind = serde_json::from_str("\"arxiv\"").expect("deserialize");
        assert_eq!(back, SourceKind::Arxiv);
    }

    #[test]
    fn search_terms_takes_prefix_of_non_blank_keywords() {
        let q = Query::new("q").with_keywords(["a", " ", "b", "c"]);
        assert_eq!(q.search_terms(2), vec!["a", "b"]);
    }

    #[test]
    fn search_terms_fall_back_to_question_content_words() {
        let q = Query::new("  effect of caffeine on sleep ");
        assert_eq!(q.search_terms(5), vec!["caffeine", "sleep"]);
        assert_eq!(q.search_terms(1), vec!["caffeine"]);
    }

    #[test]
    fn extract_terms_drops_stop_words_short_words_and_repeats() {
        assert_eq!(
            extract_terms("What is the impact of Caffeine, and caffeine timing, on REM sleep in 2nd-year students?"),
            vec!["caffeine", "timing", "rem", "sleep", "year", "students"]
        );
        assert!(extract_terms("  ").is_empty());
        assert!(extract_terms("is it on?").is_empty());
    }

    #[test]
    fn extract_terms_caps_at_ten() {
        let terms = extract_terms(
            "alpha bravo charlie delta echo foxtrot golf hotel india juliet kilo lima",
        );
        assert_eq!(terms.len(), MAX_EXTRACTED_TERMS);
        assert_eq!(terms.last().map(String::as_str), Some("juliet"));
    }

    #[test]
    fn empty_selection_selects_everything() {
        let q = Query::new("q");
        assert!(q.selects("anything", None));
    }

    #[test]
    fn selection_matches_name_or_key() {
        let q = Query::new("q").with_sources(["semantic_scholar", "A"]);
        assert!(q.selects("Semantic Scholar", Some(SourceKind::SemanticScholar)));
        assert!(q.selects("a", None));
        assert!(!q.selects("PubMed", Some(SourceKind::PubMed)));
    }

    #[test]
    fn article_serializes_abstract_field_name() {
        let mut article = Article::new("Caffeine and Sleep", "PubMed", Utc::now());
        article.abstract_text = Some("text".into());
        let json = serde_json::to_value(&article).expect("serialize");
        assert_eq!(json["abstract"], "text");
        assert_eq!(json["source_names"][0], "PubMed");
    }

    #[test]
    fn screening_key_prefers_doi() {
        let mut article = Article::new("Caffeine and Sleep.", "A", Utc::now());
        assert_eq!(article.screening_key(), "caffeine and sleep");
        article.doi = Some("10.1/x".into());
        assert_eq!(article.screening_key(), "10.1/x");
    }

    #[test]
    fn failure_display_includes_kind() {
        let failure = SourceFailure {
            source: "CORE".into(),
            kind: FailureKind::AuthError,
            detail: "missing key".into(),
        };
        assert_eq!(failure.to_string(), "CORE [AuthError]: missing key");
    }
}
