//! Host settings: the TOML file that configures the collection engine.
//!
//! ```toml
//! [engine]
//! query_timeout_seconds = 60
//! similarity_threshold = 0.9
//!
//! [sources.core]
//! api_key = "..."
//!
//! [sources.google_scholar]
//! enabled = false
//! ```
//!
//! API keys may also come from the environment, which wins over the file.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use scopist_search::{EngineConfig, SourceConfig, SourceKind};

use crate::error::{Result, ScopistError};

/// Environment variables holding API keys, by source.
pub const API_KEY_ENV: &[(SourceKind, &str)] = &[
    (SourceKind::PubMed, "NCBI_API_KEY"),
    (SourceKind::SemanticScholar, "SEMANTIC_SCHOLAR_API_KEY"),
    (SourceKind::Core, "CORE_API_KEY"),
];

/// Top-level settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopistConfig {
    /// Engine-wide settings.
    pub engine: EngineSettings,
    /// Per-source settings keyed by source key (`pubmed`, `semantic_scholar`, ...).
    pub sources: BTreeMap<String, SourceSettings>,
}

impl Default for ScopistConfig {
    fn default() -> Self {
        Self {
            engine: EngineSettings::default(),
            sources: SourceKind::all()
                .iter()
                .map(|kind| (kind.key().to_owned(), SourceSettings::default()))
                .collect(),
        }
    }
}

/// Engine-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Upper bound on results per source per query.
    pub max_results_ceiling: usize,
    /// Results requested per source when the CLI does not say.
    pub default_max_results: usize,
    /// Overall budget for one query.
    pub query_timeout_seconds: u64,
    /// Budget for a single HTTP request.
    pub request_timeout_seconds: u64,
    /// Title similarity needed for the fuzzy duplicate rule.
    pub similarity_threshold: f64,
    /// Fixed User-Agent instead of the rotating browser set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            max_results_ceiling: engine.max_results_ceiling,
            default_max_results: 25,
            query_timeout_seconds: engine.query_timeout_seconds,
            request_timeout_seconds: engine.request_timeout_seconds,
            similarity_threshold: engine.similarity_threshold,
            user_agent: engine.user_agent,
        }
    }
}

/// Settings for one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    /// Include this source in collection runs.
    pub enabled: bool,
    /// API key, where the source accepts one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Override of the minimum spacing between calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_interval_ms: Option<u64>,
    /// Override of the endpoint base URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Source tag recorded on articles instead of the default name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            min_interval_ms: None,
            base_url: None,
            display_name: None,
        }
    }
}

impl ScopistConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| ScopistError::Config(e.to_string()))
    }

    /// Load the file at `path` if it exists, otherwise the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| ScopistError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> PathBuf {
        crate::dirs::config_file()
    }

    /// Fill API keys from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|name| std::env::var(name).ok());
    }

    /// Fill API keys from `lookup`. Non-blank values win over the file.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for (kind, var) in API_KEY_ENV {
            let Some(value) = lookup(var).filter(|v| !v.trim().is_empty()) else {
                continue;
            };
            tracing::debug!(source = kind.key(), var, "API key taken from environment");
            self.sources
                .entry(kind.key().to_owned())
                .or_default()
                .api_key = Some(value.trim().to_owned());
        }
    }

    /// Settings for `kind`, or the defaults when the file has no section.
    pub fn source(&self, kind: SourceKind) -> SourceSettings {
        self.sources.get(kind.key()).cloned().unwrap_or_default()
    }

    /// Translate into the engine's configuration.
    ///
    /// Every known source appears once, in a fixed order. Sections with
    /// unknown keys are rejected rather than silently ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ScopistError::Config`] for unknown source sections, or when
    /// the resulting engine configuration fails validation.
    pub fn to_engine_config(&self) -> Result<EngineConfig> {
        if let Some(unknown) = self
            .sources
            .keys()
            .find(|key| key.parse::<SourceKind>().is_err())
        {
            return Err(ScopistError::Config(format!(
                "unknown source section [sources.{unknown}]; known: {}",
                SourceKind::all()
                    .iter()
                    .map(SourceKind::key)
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }

        let sources = SourceKind::all()
            .iter()
            .map(|&kind| {
                let settings = self.source(kind);
                SourceConfig {
                    display_name: settings.display_name,
                    api_key: settings.api_key,
                    min_interval_ms: settings.min_interval_ms,
                    base_url: settings.base_url,
                    enabled: settings.enabled,
                    ..SourceConfig::new(kind)
                }
            })
            .collect();

        let engine = EngineConfig {
            max_results_ceiling: self.engine.max_results_ceiling,
            query_timeout_seconds: self.engine.query_timeout_seconds,
            request_timeout_seconds: self.engine.request_timeout_seconds,
            similarity_threshold: self.engine.similarity_threshold,
            user_agent: self.engine.user_agent.clone(),
            sources,
        };
        engine
            .validate()
            .map_err(|e| ScopistError::Config(e.to_string()))?;
        Ok(engine)
    }
}
