//! Multi-signal article deduplication.
//!
//! Two articles denote the same paper when, checked in order:
//!
//! 1. both carry the same well-formed DOI;
//! 2. their normalized titles are identical and the years agree (or either
//!    is unknown);
//! 3. their title token sets have Jaccard similarity at or above the
//!    threshold and at least one author surname matches.
//!
//! Input is sorted into a canonical order before folding, so the result is
//! independent of arrival order. Each article merges into the earliest
//! created equivalent record. Candidate records are found through a DOI
//! index, an exact-title index and a prefix-filter token index; the
//! indexes only narrow the search, the decision is always the pairwise
//! rule above.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use super::normalize::is_valid_doi;
use crate::types::Article;

/// Tolerance applied before rounding the prefix bound up, so float error
/// can only lengthen prefixes.
const PREFIX_EPSILON: f64 = 1e-9;

/// Counts from one dedup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupStats {
    /// Incoming articles.
    pub input: usize,
    /// Records after the pass, including seeded ones.
    pub output: usize,
    /// Incoming articles folded into another record.
    pub merged: usize,
}

impl DedupStats {
    /// Incoming articles that became new records.
    pub fn added(&self) -> usize {
        self.input - self.merged
    }
}

/// Lowercase, replace non-alphanumerics with spaces, collapse whitespace.
///
/// Titles made only of punctuation fall back to their lowercased,
/// whitespace-collapsed form so they still compare equal to themselves.
pub fn normalize_title(title: &str) -> String {
    let mapped: String = title
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .to_lowercase();
    let normalized = mapped.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.is_empty() {
        title.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
    } else {
        normalized
    }
}

/// Sorted, distinct tokens of a normalized title.
fn title_tokens(normalized: &str) -> Vec<String> {
    normalized
        .split_whitespace()
        .map(str::to_owned)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Jaccard similarity of two sorted, distinct token lists.
fn jaccard(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let (mut i, mut j, mut shared) = (0, 0, 0usize);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                shared += 1;
                i += 1;
                j += 1;
            }
        }
    }
    let union = a.len() + b.len() - shared;
    shared as f64 / union as f64
}

/// Token-set similarity of two raw titles.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    jaccard(
        &title_tokens(&normalize_title(a)),
        &title_tokens(&normalize_title(b)),
    )
}

/// Surname of an author: the last token, lowercased, punctuation removed.
pub fn surname(author: &str) -> Option<String> {
    let last = author.split_whitespace().last()?;
    let cleaned: String = last
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect::<String>()
        .to_lowercase();
    (!cleaned.is_empty()).then_some(cleaned)
}

fn shares_surname(a: &[String], b: &[String]) -> bool {
    let left: BTreeSet<String> = a.iter().filter_map(|n| surname(n)).collect();
    b.iter()
        .filter_map(|n| surname(n))
        .any(|s| left.contains(&s))
}

fn valid_doi(article: &Article) -> Option<&str> {
    article.doi.as_deref().filter(|d| is_valid_doi(d))
}

fn years_compatible(a: Option<i32>, b: Option<i32>) -> bool {
    match (a, b) {
        (Some(x), Some(y)) => x == y,
        _ => true,
    }
}

/// An article with its title signals precomputed.
struct Entry {
    article: Article,
    title_key: String,
    tokens: Vec<String>,
}

impl Entry {
    fn new(article: Article) -> Self {
        let title_key = normalize_title(&article.title);
        let tokens = title_tokens(&title_key);
        Self {
            article,
            title_key,
            tokens,
        }
    }
}

fn entries_equivalent(a: &Entry, b: &Entry, threshold: f64) -> bool {
    if let (Some(x), Some(y)) = (valid_doi(&a.article), valid_doi(&b.article)) {
        if x == y {
            return true;
        }
    }
    if !a.title_key.is_empty()
        && a.title_key == b.title_key
        && years_compatible(a.article.year, b.article.year)
    {
        return true;
    }
    jaccard(&a.tokens, &b.tokens) >= threshold
        && shares_surname(&a.article.authors, &b.article.authors)
}

/// Whether two articles denote the same paper under the equivalence rule.
pub fn equivalent(a: &Article, b: &Article, threshold: f64) -> bool {
    entries_equivalent(&Entry::new(a.clone()), &Entry::new(b.clone()), threshold)
}

/// Total order used to fold input deterministically: creation time, then
/// case-folded title, then every remaining field.
pub fn canonical_order(a: &Article, b: &Article) -> Ordering {
    a.first_seen_at
        .cmp(&b.first_seen_at)
        .then_with(|| a.title.to_lowercase().cmp(&b.title.to_lowercase()))
        .then_with(|| a.title.cmp(&b.title))
        .then_with(|| a.doi.cmp(&b.doi))
        .then_with(|| a.year.cmp(&b.year))
        .then_with(|| a.authors.cmp(&b.authors))
        .then_with(|| a.abstract_text.cmp(&b.abstract_text))
        .then_with(|| a.source_names.cmp(&b.source_names))
        .then_with(|| a.source_urls.cmp(&b.source_urls))
}

/// Absorb `other` into `canonical`: union sources, fill absent fields.
pub fn absorb(canonical: &mut Article, other: Article) {
    canonical.source_names.extend(other.source_names);
    for (source, url) in other.source_urls {
        canonical.source_urls.entry(source).or_insert(url);
    }
    if canonical.year.is_none() {
        canonical.year = other.year;
    }
    if canonical.doi.is_none() {
        canonical.doi = other.doi;
    }
    if canonical.abstract_text.is_none() {
        canonical.abstract_text = other.abstract_text;
    }
    if canonical.authors.is_empty() {
        canonical.authors = other.authors;
    }
}

/// Folds articles into a set of distinct records.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Deduplicator {
    threshold: f64,
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(0.9)
    }
}

impl Deduplicator {
    /// Creates a deduplicator with the given title similarity threshold.
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// The fuzzy-title threshold.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Deduplicate a batch with no prior records.
    pub fn merge(&self, articles: Vec<Article>) -> Vec<Article> {
        self.merge_into(Vec::new(), articles).0
    }

    /// Fold `incoming` into `existing`. Existing records are seeded first
    /// and stay canonical; they are not compared against each other.
    ///
    /// Returns every record ordered by (`first_seen_at`, title), plus stats.
    pub fn merge_into(
        &self,
        mut existing: Vec<Article>,
        mut incoming: Vec<Article>,
    ) -> (Vec<Article>, DedupStats) {
        let mut index = CandidateIndex::new(self.threshold);
        let mut records: Vec<Entry> = Vec::with_capacity(existing.len() + incoming.len());

        existing.sort_by(canonical_order);
        for article in existing {
            let entry = Entry::new(article);
            index.insert(records.len(), &entry);
            records.push(entry);
        }

        incoming.sort_by(canonical_order);
        let mut stats = DedupStats {
            input: incoming.len(),
            ..Default::default()
        };

        for article in incoming {
            let entry = Entry::new(article);
            let target = index
                .candidates(&entry)
                .into_iter()
                .find(|&i| entries_equivalent(&records[i], &entry, self.threshold));

            match target {
                Some(i) => {
                    let had_doi = records[i].article.doi.is_some();
                    absorb(&mut records[i].article, entry.article);
                    if !had_doi {
                        index.insert_doi(i, &records[i].article);
                    }
                    stats.merged += 1;
                }
                None => {
                    index.insert(records.len(), &entry);
                    records.push(entry);
                }
            }
        }

        stats.output = records.len();
        tracing::debug!(
            input = stats.input,
            merged = stats.merged,
            output = stats.output,
            "dedup pass complete"
        );

        let mut articles: Vec<Article> = records.into_iter().map(|e| e.article).collect();
        articles.sort_by(|a, b| {
            a.first_seen_at
                .cmp(&b.first_seen_at)
                .then_with(|| a.title.cmp(&b.title))
        });
        (articles, stats)
    }
}

/// Lookup structures narrowing the records an article must be checked against.
struct CandidateIndex {
    threshold: f64,
    by_doi: HashMap<String, Vec<usize>>,
    by_title: HashMap<String, Vec<usize>>,
    by_token: HashMap<String, Vec<usize>>,
}

impl CandidateIndex {
    fn new(threshold: f64) -> Self {
        Self {
            threshold,
            by_doi: HashMap::new(),
            by_title: HashMap::new(),
            by_token: HashMap::new(),
        }
    }

    /// Number of leading tokens (in sorted order) a title must index so
    /// that any pair with Jaccard >= threshold shares an indexed token.
    fn prefix_len(&self, tokens: usize) -> usize {
        let required = (self.threshold * tokens as f64 - PREFIX_EPSILON).ceil().max(0.0) as usize;
        (tokens - required.min(tokens) + 1).min(tokens)
    }

    fn insert(&mut self, id: usize, entry: &Entry) {
        self.insert_doi(id, &entry.article);
        self.by_title
            .entry(entry.title_key.clone())
            .or_default()
            .push(id);
        let prefix = self.prefix_len(entry.tokens.len());
        for token in &entry.tokens[..prefix] {
            self.by_token.entry(token.clone()).or_default().push(id);
        }
    }

    fn insert_doi(&mut self, id: usize, article: &Article) {
        if let Some(doi) = valid_doi(article) {
            let ids = self.by_doi.entry(doi.to_owned()).or_default();
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }

    /// Candidate record ids in creation order.
    fn candidates(&self, entry: &Entry) -> Vec<usize> {
        let mut ids = BTreeSet::new();
        if let Some(doi) = valid_doi(&entry.article) {
            ids.extend(self.by_doi.get(doi).into_iter().flatten().copied());
        }
        ids.extend(self.by_title.get(&entry.title_key).into_iter().flatten().copied());
        let prefix = self.prefix_len(entry.tokens.len());
        for token in &entry.tokens[..prefix] {
            ids.extend(self.by_token.get(token).into_iter().flatten().copied());
        }
        ids.into_iter().collect()
    }
}
