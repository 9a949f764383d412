//! Raw hit to canonical [`Article`] mapping.
//!
//! Pure and best-effort: each payload variant fills what its source
//! provides, scraped cards fall back to pattern extraction for year and
//! DOI, and absent values stay `None` rather than becoming placeholders.

use chrono::{Datelike, Utc};
use regex::Regex;
use std::sync::LazyLock;

use crate::sources::arxiv::ArxivEntry;
use crate::sources::core::CoreWork;
use crate::sources::pubmed::{PubMedAuthor, PubMedRecord};
use crate::sources::scrape::{collapse_whitespace, ScrapedHit};
use crate::sources::semantic_scholar::SemanticScholarPaper;
use crate::types::{Article, HitPayload, RawHit};

/// Abstracts longer than this are truncated.
pub const MAX_ABSTRACT_CHARS: usize = 5_000;

static YEAR_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\b(19|20)\d{2}\b").ok());

static DOI_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"10\.\d{4,9}/[^\s"<>]+"#).ok());

/// Resolver and scheme prefixes stripped from DOIs, matched case-insensitively.
const DOI_PREFIXES: &[&str] = &[
    "https://doi.org/",
    "http://doi.org/",
    "https://dx.doi.org/",
    "http://dx.doi.org/",
    "doi.org/",
    "doi:",
];

/// Leading tags scrapers leave on titles.
const TITLE_TAGS: &[&str] = &["[PDF]", "(PDF)", "[HTML]", "[BOOK]", "[CITATION]"];

/// Trailing site names DuckDuckGo includes in card titles.
const TITLE_SUFFIXES: &[&str] = &[" | ResearchGate", " - ResearchGate"];

/// Normalize a batch of hits, dropping those without a usable title.
pub fn normalize_hits<'a>(hits: impl IntoIterator<Item = &'a RawHit>) -> Vec<Article> {
    hits.into_iter().filter_map(normalize).collect()
}

/// Map one raw hit to an article. Returns `None` when the hit has no title.
pub fn normalize(hit: &RawHit) -> Option<Article> {
    let fields = match &hit.payload {
        HitPayload::PubMed(record) => from_pubmed(record),
        HitPayload::SemanticScholar(paper) => from_semantic_scholar(paper),
        HitPayload::Core(work) => from_core(work),
        HitPayload::Arxiv(entry) => from_arxiv(entry),
        HitPayload::Scraped(card) => from_scraped(card),
    };

    let Some(title) = clean_title(&fields.title) else {
        tracing::debug!(source = %hit.source, "dropping hit without a title");
        return None;
    };

    let mut article = Article::new(title, hit.source.clone(), hit.fetched_at);
    article.authors = fields
        .authors
        .iter()
        .map(|a| collapse_whitespace(a))
        .filter(|a| !a.is_empty())
        .collect();
    article.year = fields.year;
    article.doi = fields.doi.as_deref().and_then(normalize_doi);
    article.abstract_text = fields.abstract_text.as_deref().and_then(clean_abstract);
    if let Some(url) = fields.url.filter(|u| !u.trim().is_empty()) {
        article.source_urls.insert(hit.source.clone(), url.trim().to_owned());
    }
    Some(article)
}

/// Intermediate field bag shared by the per-source mappings.
#[derive(Default)]
struct Fields {
    title: String,
    authors: Vec<String>,
    year: Option<i32>,
    doi: Option<String>,
    abstract_text: Option<String>,
    url: Option<String>,
}

fn from_pubmed(record: &PubMedRecord) -> Fields {
    let abstract_text = (!record.abstract_sections.is_empty())
        .then(|| record.abstract_sections.join(" "));
    Fields {
        title: record.title.clone(),
        authors: record.authors.iter().filter_map(pubmed_author).collect(),
        year: record.year,
        doi: record.doi.clone(),
        abstract_text,
        url: Some(record.url()),
    }
}

fn pubmed_author(author: &PubMedAuthor) -> Option<String> {
    if let Some(collective) = author.collective_name.as_deref() {
        return Some(collective.to_owned());
    }
    match (author.fore_name.as_deref(), author.last_name.as_deref()) {
        (Some(fore), Some(last)) => Some(format!("{fore} {last}")),
        (None, Some(last)) => Some(last.to_owned()),
        (Some(fore), None) => Some(fore.to_owned()),
        (None, None) => None,
    }
}

fn from_semantic_scholar(paper: &SemanticScholarPaper) -> Fields {
    Fields {
        title: paper.title.clone().unwrap_or_default(),
        authors: paper.authors.iter().filter_map(|a| a.name.clone()).collect(),
        year: paper.year,
        doi: paper.external_ids.as_ref().and_then(|ids| ids.doi.clone()),
        abstract_text: paper.abstract_text.clone(),
        url: Some(paper.landing_url()),
    }
}

fn from_core(work: &CoreWork) -> Fields {
    let authors = work
        .authors
        .iter()
        .flatten()
        .filter_map(|a| a.name.as_deref())
        .map(flip_family_given)
        .collect();
    Fields {
        title: work.title.clone().unwrap_or_default(),
        authors,
        year: work.year_published,
        doi: work.doi.clone(),
        abstract_text: work.abstract_text.clone(),
        url: Some(work.landing_url()),
    }
}

fn from_arxiv(entry: &ArxivEntry) -> Fields {
    Fields {
        title: entry.title.clone(),
        authors: entry.authors.clone(),
        year: entry.year(),
        doi: entry.doi.clone(),
        abstract_text: Some(entry.summary.clone()),
        url: Some(entry.landing_url()),
    }
}

fn from_scraped(card: &ScrapedHit) -> Fields {
    let (authors, venue) = match card.byline.as_deref() {
        Some(byline) => split_byline(byline),
        None => (Vec::new(), None),
    };
    let year = venue
        .and_then(extract_year)
        .or_else(|| extract_year(&card.snippet));
    let doi = extract_doi(&card.url).or_else(|| extract_doi(&card.snippet));
    Fields {
        title: card.title.clone(),
        authors,
        year,
        doi,
        abstract_text: Some(card.snippet.clone()),
        url: Some(card.url.clone()),
    }
}

/// Turn "Family, Given" into "Given Family"; other shapes pass through.
pub fn flip_family_given(name: &str) -> String {
    match name.split_once(',') {
        Some((family, given)) if !family.trim().is_empty() && !given.trim().is_empty() => {
            format!("{} {}", given.trim(), family.trim())
        }
        _ => name.trim().to_owned(),
    }
}

/// Split a Scholar byline ("A Smith, B Jones - Venue, 2020 - host") into
/// author names and the remainder. Ellipsis entries are dropped.
pub fn split_byline(byline: &str) -> (Vec<String>, Option<&str>) {
    let (names, rest) = match byline.split_once(" - ") {
        Some((names, rest)) => (names, Some(rest)),
        None => (byline, None),
    };
    let authors = names
        .split(',')
        .map(str::trim)
        .filter(|n| !n.is_empty() && !n.contains('\u{2026}') && !n.contains("..."))
        .map(str::to_owned)
        .collect();
    (authors, rest.or(Some(byline)))
}

/// Normalize a DOI: trim, strip resolver prefixes, lowercase.
///
/// Strings that do not look like DOIs are kept (lowercased) rather than
/// dropped; dedup ignores them. Blank input yields `None`.
pub fn normalize_doi(raw: &str) -> Option<String> {
    let mut doi = raw.trim();
    for prefix in DOI_PREFIXES {
        if doi.len() >= prefix.len()
            && doi.is_char_boundary(prefix.len())
            && doi[..prefix.len()].eq_ignore_ascii_case(prefix)
        {
            doi = doi[prefix.len()..].trim_start();
            break;
        }
    }
    let doi = doi.trim().to_lowercase();
    (!doi.is_empty()).then_some(doi)
}

/// Whether a normalized DOI is well-formed enough to identify a paper.
pub fn is_valid_doi(doi: &str) -> bool {
    doi.starts_with("10.") && doi.contains('/')
}

/// Largest plausible publication year in free text.
pub fn extract_year(text: &str) -> Option<i32> {
    let latest = Utc::now().year() + 1;
    YEAR_RE
        .as_ref()?
        .find_iter(text)
        .filter_map(|m| m.as_str().parse::<i32>().ok())
        .filter(|y| (1900..=latest).contains(y))
        .max()
}

/// First DOI-shaped substring in free text, trailing punctuation removed.
pub fn extract_doi(text: &str) -> Option<String> {
    let found = DOI_RE.as_ref()?.find(text)?;
    let doi = found
        .as_str()
        .trim_end_matches(|c: char| matches!(c, '.' | ',' | ';' | ':' | ')' | ']' | '}' | '\''));
    normalize_doi(doi)
}

fn clean_title(raw: &str) -> Option<String> {
    let mut title = collapse_whitespace(raw);
    loop {
        let before = title.len();
        for tag in TITLE_TAGS {
            if let Some(rest) = title.strip_prefix(tag) {
                title = rest.trim_start().to_owned();
            }
        }
        if title.len() == before {
            break;
        }
    }
    for suffix in TITLE_SUFFIXES {
        if let Some(rest) = title.strip_suffix(suffix) {
            title = rest.trim_end().to_owned();
        }
    }
    (!title.is_empty()).then_some(title)
}

fn clean_abstract(raw: &str) -> Option<String> {
    let text = collapse_whitespace(raw);
    if text.is_empty() {
        return None;
    }
    if text.chars().count() > MAX_ABSTRACT_CHARS {
        Some(text.chars().take(MAX_ABSTRACT_CHARS).collect())
    } else {
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::core::CoreAuthor;
    use crate::sources::semantic_scholar::{ExternalIds, SemanticScholarAuthor};

    fn scraped(title: &str, url: &str, snippet: &str, byline: Option<&str>) -> RawHit {
        RawHit::new(
            "Google Scholar",
            HitPayload::Scraped(ScrapedHit {
                title: title.into(),
                url: url.into(),
                snippet: snippet.into(),
                byline: byline.map(str::to_owned),
            }),
        )
    }

    #[test]
    fn normalize_doi_strips_prefixes_and_lowercases() {
        assert_eq!(normalize_doi(" https://doi.org/10.1/X ").as_deref(), Some("10.1/x"));
        assert_eq!(normalize_doi("DOI: 10.1000/ABC").as_deref(), Some("10.1000/abc"));
        assert_eq!(normalize_doi("http://dx.doi.org/10.5/q").as_deref(), Some("10.5/q"));
        assert_eq!(normalize_doi("   "), None);
    }

    #[test]
    fn unparseable_doi_is_kept() {
        assert_eq!(normalize_doi("pending").as_deref(), Some("pending"));
        assert!(!is_valid_doi("pending"));
        assert!(is_valid_doi("10.1/x"));
        assert!(!is_valid_doi("10.1"));
    }

    #[test]
    fn extract_year_takes_largest_plausible() {
        assert_eq!(extract_year("Sleep Med Rev, 1999; reprinted 2008"), Some(2008));
        assert_eq!(extract_year("cohort of 1850 subjects"), None);
        assert_eq!(extract_year("ISBN 9782008123"), None);
        assert_eq!(extract_year("published 2999"), None);
    }

    #[test]
    fn extract_doi_trims_trailing_punctuation() {
        assert_eq!(
            extract_doi("see https://doi.org/10.1016/J.SMRV.2007.07.001).").as_deref(),
            Some("10.1016/j.smrv.2007.07.001")
        );
        assert_eq!(extract_doi("no identifier here"), None);
    }

    #[test]
    fn flips_family_given_names() {
        assert_eq!(flip_family_given("Smith, Jane A."), "Jane A. Smith");
        assert_eq!(flip_family_given("Jane Smith"), "Jane Smith");
        assert_eq!(flip_family_given("Smith,"), "Smith,");
    }

    #[test]
    fn byline_split_drops_ellipsis() {
        let (authors, rest) = split_byline("T Roehrs, T Roth, \u{2026} - Sleep medicine reviews, 2008 - Elsevier");
        assert_eq!(authors, vec!["T Roehrs", "T Roth"]);
        assert_eq!(rest, Some("Sleep medicine reviews, 2008 - Elsevier"));
    }

    #[test]
    fn scraped_card_extracts_year_doi_and_authors() {
        let hit = scraped(
            "[PDF] Caffeine and  sleep",
            "https://doi.org/10.1016/j.smrv.2007.07.001",
            "Caffeine is the most widely consumed psychoactive substance",
            Some("T Roehrs, T Roth - Sleep medicine reviews, 2008 - Elsevier"),
        );
        let article = normalize(&hit).expect("article");
        assert_eq!(article.title, "Caffeine and sleep");
        assert_eq!(article.authors, vec!["T Roehrs", "T Roth"]);
        assert_eq!(article.year, Some(2008));
        assert_eq!(article.doi.as_deref(), Some("10.1016/j.smrv.2007.07.001"));
        assert_eq!(article.first_seen_at, hit.fetched_at);
        assert!(article.source_names.contains("Google Scholar"));
        assert_eq!(
            article.source_urls.get("Google Scholar").map(String::as_str),
            Some("https://doi.org/10.1016/j.smrv.2007.07.001")
        );
    }

    #[test]
    fn missing_fields_stay_absent() {
        let hit = scraped("(PDF) Caffeine and adenosine receptors", "", "  ", None);
        let article = normalize(&hit).expect("article");
        assert_eq!(article.title, "Caffeine and adenosine receptors");
        assert!(article.authors.is_empty());
        assert_eq!(article.year, None);
        assert_eq!(article.doi, None);
        assert_eq!(article.abstract_text, None);
        assert!(article.source_urls.is_empty());
    }

    #[test]
    fn researchgate_suffix_is_stripped() {
        let hit = scraped("Caffeine timing and sleep | ResearchGate", "", "", None);
        assert_eq!(normalize(&hit).expect("article").title, "Caffeine timing and sleep");
    }

    #[test]
    fn hit_without_title_is_dropped() {
        assert!(normalize(&scraped("  [PDF] ", "https://x.org", "", None)).is_none());
    }

    #[test]
    fn abstract_is_capped() {
        let long = "a".repeat(MAX_ABSTRACT_CHARS + 50);
        let hit = scraped("Caffeine and sleep", "", &long, None);
        let article = normalize(&hit).expect("article");
        assert_eq!(
            article.abstract_text.map(|a| a.chars().count()),
            Some(MAX_ABSTRACT_CHARS)
        );
    }

    #[test]
    fn pubmed_authors_are_given_then_family() {
        let record = PubMedRecord {
            pmid: "17950009".into(),
            title: "Caffeine: sleep and daytime sleepiness.".into(),
            abstract_sections: vec!["BACKGROUND: x".into(), "RESULTS: y".into()],
            authors: vec![
                PubMedAuthor {
                    last_name: Some("Roehrs".into()),
                    fore_name: Some("Timothy".into()),
                    collective_name: None,
                },
                PubMedAuthor {
                    last_name: None,
                    fore_name: None,
                    collective_name: Some("Sleep Study Group".into()),
                },
            ],
            year: Some(2008),
            doi: Some("10.1016/J.SMRV.2007.07.001".into()),
            journal: None,
        };
        let article = normalize(&RawHit::new("PubMed", HitPayload::PubMed(record))).expect("article");
        assert_eq!(article.authors, vec!["Timothy Roehrs", "Sleep Study Group"]);
        assert_eq!(article.doi.as_deref(), Some("10.1016/j.smrv.2007.07.001"));
        assert_eq!(article.abstract_text.as_deref(), Some("BACKGROUND: x RESULTS: y"));
        assert_eq!(
            article.primary_url(),
            Some("https://pubmed.ncbi.nlm.nih.gov/17950009/")
        );
    }

    #[test]
    fn semantic_scholar_doi_comes_from_external_ids() {
        let paper = SemanticScholarPaper {
            paper_id: "abc".into(),
            title: Some("Caffeine and Sleep".into()),
            url: None,
            abstract_text: None,
            authors: vec![SemanticScholarAuthor {
                author_id: None,
                name: Some("Thomas Roth".into()),
            }],
            year: Some(2008),
            venue: None,
            external_ids: Some(ExternalIds {
                doi: Some("10.1/X".into()),
                ..Default::default()
            }),
        };
        let article =
            normalize(&RawHit::new("Semantic Scholar", HitPayload::SemanticScholar(paper)))
                .expect("article");
        assert_eq!(article.doi.as_deref(), Some("10.1/x"));
        assert_eq!(article.authors, vec!["Thomas Roth"]);
    }

    #[test]
    fn core_names_are_flipped() {
        let work = CoreWork {
            id: serde_json::json!(7),
            title: Some("Caffeine in adolescents".into()),
            authors: Some(vec![CoreAuthor {
                name: Some("Smith, Jane".into()),
            }]),
            abstract_text: Some(String::new()),
            year_published: Some(2015),
            doi: None,
            download_url: None,
        };
        let article = normalize(&RawHit::new("CORE", HitPayload::Core(work))).expect("article");
        assert_eq!(article.authors, vec!["Jane Smith"]);
        assert_eq!(article.abstract_text, None);
        assert_eq!(article.primary_url(), Some("https://core.ac.uk/works/7"));
    }

    #[test]
    fn arxiv_title_whitespace_is_collapsed() {
        let entry = ArxivEntry {
            id: "http://arxiv.org/abs/2101.00001v1".into(),
            title: "Modelling Caffeine\n      Effects".into(),
            summary: " text ".into(),
            published: Some("2021-01-04T18:00:00Z".into()),
            authors: vec!["Jane Doe".into()],
            ..Default::default()
        };
        let article = normalize(&RawHit::new("arXiv", HitPayload::Arxiv(entry))).expect("article");
        assert_eq!(article.title, "Modelling Caffeine Effects");
        assert_eq!(article.year, Some(2021));
        assert_eq!(article.abstract_text.as_deref(), Some("text"));
    }
}
