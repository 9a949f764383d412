//! CSV export of a project's article set.
//!
//! Columns: `id,title,authors,abstract,source,url,year,doi`. Multi-valued
//! fields are joined with `; `, and `url` is the first source URL.

use std::io::Write;
use std::path::Path;

use scopist_search::Article;

use crate::error::Result;

/// CSV header row.
pub const COLUMNS: [&str; 8] = [
    "id", "title", "authors", "abstract", "source", "url", "year", "doi",
];

const LIST_SEPARATOR: &str = "; ";

/// Write `articles` as CSV to `writer`. Ids are 1-based row numbers.
///
/// # Errors
///
/// Returns [`crate::ScopistError::Export`] if a row cannot be written.
pub fn write_csv<W: Write>(writer: W, articles: &[Article]) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(COLUMNS)?;
    for (index, article) in articles.iter().enumerate() {
        csv.write_record(row(index + 1, article))?;
    }
    csv.flush()?;
    Ok(())
}

/// Write `articles` as CSV to a file at `path`, creating parent directories.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn export_csv(path: &Path, articles: &[Article]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    write_csv(std::io::BufWriter::new(file), articles)?;
    tracing::info!(path = %path.display(), count = articles.len(), "articles exported");
    Ok(())
}

fn row(id: usize, article: &Article) -> [String; 8] {
    [
        id.to_string(),
        article.title.clone(),
        article.authors.join(LIST_SEPARATOR),
        article.abstract_text.clone().unwrap_or_default(),
        article
            .source_names
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(LIST_SEPARATOR),
        article.primary_url().unwrap_or_default().to_owned(),
        article.year.map(|y| y.to_string()).unwrap_or_default(),
        article.doi.clone().unwrap_or_default(),
    ]
}
