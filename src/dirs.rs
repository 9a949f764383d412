//! Centralized application directory paths for Scopist.
//!
//! Uses the [`dirs`] crate for platform-appropriate directory resolution.
//!
//! # Directory Layout
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | Data | `~/Library/Application Support/scopist/` | `~/.local/share/scopist/` |
//! | Config | `~/Library/Application Support/scopist/` | `~/.config/scopist/` |
//!
//! # Environment Overrides
//!
//! - `SCOPIST_DATA_DIR` overrides [`data_dir`]
//! - `SCOPIST_CONFIG` overrides [`config_file`]

use std::path::{Path, PathBuf};

/// Application data root directory.
///
/// Holds one directory per project plus the log files. Resolves to
/// `dirs::data_dir()/scopist/` by default.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("SCOPIST_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("scopist"))
        .unwrap_or_else(|| PathBuf::from("/tmp/scopist-data"))
}

/// Application config directory (`dirs::config_dir()/scopist/`).
#[must_use]
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("scopist"))
        .unwrap_or_else(|| PathBuf::from("/tmp/scopist-config"))
}

/// Main config file path (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    if let Some(path) = std::env::var_os("SCOPIST_CONFIG") {
        return PathBuf::from(path);
    }
    config_dir().join("config.toml")
}

/// Log file directory (`data_dir()/logs/`).
#[must_use]
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Parent of all project directories (`data_dir()/projects/`).
#[must_use]
pub fn projects_dir() -> PathBuf {
    data_dir().join("projects")
}

/// Directory for a project given by name or path.
///
/// A bare name resolves below [`projects_dir`]; anything containing a path
/// separator, or starting with `.`, is taken as a path as-is.
#[must_use]
pub fn project_dir(project: &str) -> PathBuf {
    resolve_project(&projects_dir(), project)
}

fn resolve_project(projects: &Path, project: &str) -> PathBuf {
    let as_path = Path::new(project);
    if as_path.components().count() > 1 || project.starts_with('.') || as_path.is_absolute() {
        as_path.to_path_buf()
    } else {
        projects.join(project)
    }
}
