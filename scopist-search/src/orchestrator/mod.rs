//! Collection pipeline: concurrent fetch, normalization, deduplication.
//!
//! [`fetch::FetchOrchestrator`] fans a query out to the selected adapters
//! under one deadline, [`normalize`] maps raw hits to articles, and
//! [`dedup::Deduplicator`] folds them into a set of distinct papers.

pub mod dedup;
pub mod fetch;
pub mod normalize;

pub use dedup::{DedupStats, Deduplicator};
pub use fetch::{FetchOrchestrator, FetchReport, RunEvent, SourceOutcome};
pub use normalize::{normalize, normalize_doi};
