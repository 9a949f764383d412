//! Scopist: literature collection for systematic reviews.
//!
//! This crate is the host around the [`scopist_search`] engine. It owns the
//! settings file, the data directories, logging and CSV export; the engine
//! does the searching, merging and persisting.

pub mod config;
pub mod dirs;
pub mod error;
pub mod export;
pub mod logging;

pub use config::{EngineSettings, ScopistConfig, SourceSettings};
pub use error::{Result, ScopistError};
pub use export::{export_csv, write_csv};
pub use scopist_search;
