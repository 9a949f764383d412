//! Concurrent fan-out over the selected source adapters.
//!
//! One tokio task per adapter, all racing a single per-query deadline.
//! A failed, panicking or late adapter contributes no hits and one failure
//! entry; it never affects its siblings. After fan-in the hits are
//! normalized and deduplicated on the calling task.

use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinSet;
use tokio::time::Instant;

use super::dedup::{DedupStats, Deduplicator};
use super::normalize::normalize_hits;
use crate::adapter::SourceAdapter;
use crate::config::EngineConfig;
use crate::error::{FailureKind, SourceError};
use crate::types::{Article, Query, RawHit, SourceFailure};

/// Progress notifications emitted during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// A unit of work was dispatched for this source.
    SourceStarted {
        /// Adapter name.
        source: String,
    },
    /// The source returned hits.
    SourceFinished {
        /// Adapter name.
        source: String,
        /// Raw hits returned.
        hits: usize,
        /// Time from dispatch to completion.
        elapsed: Duration,
    },
    /// The source failed, timed out or panicked.
    SourceFailed(SourceFailure),
    /// Normalized hits were folded into distinct articles.
    Deduplicated(DedupStats),
}

/// How one selected source fared in a run.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceOutcome {
    /// Adapter name.
    pub source: String,
    /// Raw hits returned. Zero on failure.
    pub hits: usize,
    /// Time until the unit finished, or the full budget on timeout.
    pub elapsed: Duration,
    /// Failure category, if the unit did not succeed.
    pub failure: Option<FailureKind>,
}

impl SourceOutcome {
    /// Whether the source returned normally.
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

/// Result of one orchestrator run.
#[derive(Debug, Clone, Default)]
pub struct FetchReport {
    /// Normalized, deduplicated articles from every successful source.
    pub articles: Vec<Article>,
    /// One entry per failed source, in adapter order.
    pub failures: Vec<SourceFailure>,
    /// One entry per selected source, in adapter order.
    pub outcomes: Vec<SourceOutcome>,
    /// Everything that was also sent on the event channel, in emission order.
    pub events: Vec<RunEvent>,
    /// Dedup counts for this run's hits.
    pub dedup: DedupStats,
}

impl FetchReport {
    /// Failures of the given kind.
    pub fn failures_of(&self, kind: FailureKind) -> impl Iterator<Item = &SourceFailure> {
        self.failures.iter().filter(move |f| f.kind == kind)
    }
}

/// Records events and forwards them to an optional subscriber.
struct EventLog<'a> {
    events: Vec<RunEvent>,
    sink: Option<&'a UnboundedSender<RunEvent>>,
}

impl EventLog<'_> {
    fn emit(&mut self, event: RunEvent) {
        if let Some(sink) = self.sink {
            if sink.send(event.clone()).is_err() {
                tracing::trace!("run event receiver dropped");
            }
        }
        self.events.push(event);
    }
}

type UnitResult = (usize, Result<Vec<RawHit>, SourceError>, Duration);

/// Runs one query across a fixed adapter set.
pub struct FetchOrchestrator {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    config: EngineConfig,
    events: Option<UnboundedSender<RunEvent>>,
}

impl FetchOrchestrator {
    /// Creates an orchestrator over `adapters`.
    pub fn new(adapters: Vec<Arc<dyn SourceAdapter>>, config: EngineConfig) -> Self {
        Self {
            adapters,
            config,
            events: None,
        }
    }

    /// Creates an orchestrator with an adapter for every enabled source.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SearchError::Config`] for invalid configuration or
    /// [`crate::SearchError::Http`] if a client cannot be built.
    pub fn from_config(config: EngineConfig) -> crate::Result<Self> {
        let adapters = crate::sources::build_adapters(&config)?;
        Ok(Self::new(adapters, config))
    }

    /// Forward run events to `sender` as they happen.
    #[must_use]
    pub fn with_events(mut self, sender: UnboundedSender<RunEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    /// The configured adapters.
    pub fn adapters(&self) -> &[Arc<dyn SourceAdapter>] {
        &self.adapters
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Adapters selected by `query`. Requested names matching no adapter
    /// are logged and ignored.
    pub fn select(&self, query: &Query) -> Vec<Arc<dyn SourceAdapter>> {
        for wanted in &query.sources {
            let single = Query::new("").with_sources([wanted.as_str()]);
            if !self.adapters.iter().any(|a| single.selects(a.name(), a.kind())) {
                tracing::warn!(source = %wanted, "unknown source requested, skipping");
            }
        }
        self.adapters
            .iter()
            .filter(|a| query.selects(a.name(), a.kind()))
            .cloned()
            .collect()
    }

    /// Run `query` against every selected adapter and return the merged
    /// article set plus a per-source report. Never fails: adapter errors
    /// are reported, not propagated.
    pub async fn run(&self, query: &Query) -> FetchReport {
        let selected = self.select(query);
        let max_results = self.config.clamp_max_results(query.max_results);
        let budget = query.timeout.unwrap_or_else(|| self.config.query_timeout());
        let dispatched = Instant::now();
        let deadline = dispatched + budget;
        let mut log = EventLog {
            events: Vec::new(),
            sink: self.events.as_ref(),
        };

        tracing::info!(
            sources = selected.len(),
            max_results,
            budget_ms = budget.as_millis() as u64,
            "dispatching query"
        );

        let mut units: JoinSet<UnitResult> = JoinSet::new();
        let mut task_ids: HashMap<tokio::task::Id, usize> = HashMap::new();
        for (idx, adapter) in selected.iter().enumerate() {
            log.emit(RunEvent::SourceStarted {
                source: adapter.name().to_owned(),
            });
            let adapter = Arc::clone(adapter);
            let query = query.clone();
            let handle = units.spawn(async move {
                let started = Instant::now();
                let result = AssertUnwindSafe(adapter.fetch(&query, max_results))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| Err(SourceError::Network(panic_detail(panic.as_ref()))));
                (idx, result, started.elapsed())
            });
            task_ids.insert(handle.id(), idx);
        }

        let mut finished: HashMap<usize, (Result<Vec<RawHit>, SourceError>, Duration)> =
            HashMap::new();
        loop {
            match tokio::time::timeout_at(deadline, units.join_next()).await {
                Ok(Some(Ok((idx, result, elapsed)))) => {
                    let name = selected[idx].name();
                    match &result {
                        Ok(hits) => {
                            tracing::debug!(source = %name, hits = hits.len(), ?elapsed, "source finished");
                            log.emit(RunEvent::SourceFinished {
                                source: name.to_owned(),
                                hits: hits.len(),
                                elapsed,
                            });
                        }
                        Err(err) => log.emit(RunEvent::SourceFailed(failure(name, err))),
                    }
                    finished.insert(idx, (result, elapsed));
                }
                Ok(Some(Err(join_err))) => {
                    tracing::warn!(error = %join_err, "source task ended abnormally");
                    if let Some(&idx) = task_ids.get(&join_err.id()) {
                        let err = join_failure(&join_err);
                        log.emit(RunEvent::SourceFailed(failure(selected[idx].name(), &err)));
                        finished.insert(idx, (Err(err), dispatched.elapsed()));
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    units.abort_all();
                    break;
                }
            }
        }

        let mut hits: Vec<RawHit> = Vec::new();
        let mut failures = Vec::new();
        let mut outcomes = Vec::with_capacity(selected.len());
        for (idx, adapter) in selected.iter().enumerate() {
            let name = adapter.name();
            let (result, elapsed) = finished.remove(&idx).unwrap_or_else(|| {
                let err = SourceError::Timeout(format!(
                    "no response within the {}s query budget",
                    budget.as_secs_f64()
                ));
                log.emit(RunEvent::SourceFailed(failure(name, &err)));
                (Err(err), budget)
            });
            match result {
                Ok(source_hits) => {
                    outcomes.push(SourceOutcome {
                        source: name.to_owned(),
                        hits: source_hits.len(),
                        elapsed,
                        failure: None,
                    });
                    hits.extend(source_hits);
                }
                Err(err) => {
                    let entry = failure(name, &err);
                    tracing::warn!(
                        source = %entry.source,
                        kind = %entry.kind,
                        detail = %entry.detail,
                        "source failed"
                    );
                    outcomes.push(SourceOutcome {
                        source: name.to_owned(),
                        hits: 0,
                        elapsed,
                        failure: Some(entry.kind),
                    });
                    failures.push(entry);
                }
            }
        }

        let normalized = normalize_hits(&hits);
        let (articles, dedup) =
            Deduplicator::new(self.config.similarity_threshold).merge_into(Vec::new(), normalized);
        log.emit(RunEvent::Deduplicated(dedup));

        tracing::info!(
            raw_hits = hits.len(),
            articles = articles.len(),
            failed_sources = failures.len(),
            elapsed_ms = dispatched.elapsed().as_millis() as u64,
            "query complete"
        );

        FetchReport {
            articles,
            failures,
            outcomes,
            events: log.events,
            dedup,
        }
    }
}

fn failure(source: &str, err: &SourceError) -> SourceFailure {
    SourceFailure {
        source: source.to_owned(),
        kind: err.kind(),
        detail: err.detail().to_owned(),
    }
}

/// A unit whose task was cancelled or died outside the adapter call.
fn join_failure(join_err: &tokio::task::JoinError) -> SourceError {
    SourceError::Network(format!("source task failed: {join_err}"))
}

fn panic_detail(panic: &(dyn std::any::Any + Send)) -> String {
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned());
    format!("adapter panicked: {message}")
}
