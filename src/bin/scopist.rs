//! CLI binary for scopist.

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;

use scopist::{ScopistConfig, dirs, export_csv, logging};
use scopist_search::{CollectionReport, CollectionStore, FetchOrchestrator, Query, SourceKind};

/// Scopist: collect and deduplicate literature for systematic reviews.
#[derive(Parser, Debug)]
#[command(name = "scopist", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log at debug level.
    #[arg(short, long)]
    verbose: bool,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Command,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Search the configured sources and merge the results into a project.
    Collect {
        /// Project name (under the data directory) or path.
        #[arg(short, long)]
        project: String,
        /// Research question.
        #[arg(short, long)]
        query: String,
        /// Search keyword; repeat for several.
        #[arg(short, long = "keyword")]
        keywords: Vec<String>,
        /// Restrict to these sources (key or name); repeat for several.
        #[arg(short, long = "source")]
        sources: Vec<String>,
        /// Results requested per source.
        #[arg(short = 'n', long)]
        max_results: Option<usize>,
        /// Overall budget for the run, in seconds.
        #[arg(short, long)]
        timeout: Option<u64>,
    },

    /// Print the articles stored for a project.
    List {
        /// Project name or path.
        #[arg(short, long)]
        project: String,
        /// Emit the articles as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Write a project's articles to a CSV file.
    Export {
        /// Project name or path.
        #[arg(short, long)]
        project: String,
        /// Destination file.
        #[arg(short, long)]
        output: PathBuf,
    },

    /// List the known sources and how they are configured.
    Sources,

    /// Write the default configuration file if none exists.
    InitConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = logging::init(&dirs::logs_dir(), cli.verbose);

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(ScopistConfig::default_config_path);

    match cli.command {
        Command::InitConfig => init_config(&config_path),
        Command::Sources => list_sources(&load_config(&config_path)?),
        Command::List { project, json } => list_articles(&project, json),
        Command::Export { project, output } => export(&project, &output),
        Command::Collect {
            project,
            query,
            keywords,
            sources,
            max_results,
            timeout,
        } => {
            let config = load_config(&config_path)?;
            let mut q = Query::new(query)
                .with_keywords(keywords)
                .with_sources(sources)
                .with_max_results(max_results.unwrap_or(config.engine.default_max_results));
            if let Some(secs) = timeout {
                q = q.with_timeout(Duration::from_secs(secs));
            }
            run_collect(&config, &project, &q).await
        }
    }
}

fn load_config(path: &Path) -> anyhow::Result<ScopistConfig> {
    let mut config = ScopistConfig::load_or_default(path)
        .with_context(|| format!("loading config from {}", path.display()))?;
    config.apply_env();
    Ok(config)
}

fn init_config(path: &Path) -> anyhow::Result<()> {
    if path.exists() {
        println!("Config already exists at {}", path.display());
        return Ok(());
    }
    ScopistConfig::default()
        .save_to_file(path)
        .with_context(|| format!("writing config to {}", path.display()))?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

fn list_sources(config: &ScopistConfig) -> anyhow::Result<()> {
    let engine = config.to_engine_config()?;
    println!("{:<18} {:<8} {:>10}  API key", "source", "enabled", "interval");
    for source in &engine.sources {
        let key = if source.api_key().is_some() {
            "configured"
        } else if source.source == SourceKind::Core {
            "missing (required)"
        } else {
            "-"
        };
        println!(
            "{:<18} {:<8} {:>8}ms  {}",
            source.source.key(),
            if source.enabled { "yes" } else { "no" },
            source.min_interval().as_millis(),
            key
        );
    }
    Ok(())
}

async fn run_collect(config: &ScopistConfig, project: &str, query: &Query) -> anyhow::Result<()> {
    let engine = config.to_engine_config()?;
    let threshold = engine.similarity_threshold;
    let orchestrator = FetchOrchestrator::from_config(engine)?;
    if orchestrator.select(query).is_empty() {
        bail!("no enabled source matches the requested sources");
    }

    let dir = dirs::project_dir(project);
    let store = CollectionStore::open(&dir)?.with_threshold(threshold);
    tracing::info!(project = %dir.display(), query = %query.text, "collection started");

    let report = scopist_search::collect(query, &orchestrator, &store)
        .await
        .with_context(|| format!("collecting into {}", dir.display()))?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &CollectionReport) {
    for outcome in &report.fetch.outcomes {
        let status = match outcome.failure {
            Some(kind) => kind.to_string(),
            None => "ok".to_owned(),
        };
        println!(
            "{:<18} {:>4} hits  {:>6.1}s  {}",
            outcome.source,
            outcome.hits,
            outcome.elapsed.as_secs_f64(),
            status
        );
    }
    for failure in &report.fetch.failures {
        println!("  {}: {} ({})", failure.source, failure.kind, failure.detail);
    }
    println!(
        "{} new, {} total articles",
        report.added,
        report.articles.len()
    );
}

fn open_existing(project: &str) -> anyhow::Result<CollectionStore> {
    let dir = dirs::project_dir(project);
    if !dir.is_dir() {
        bail!("project {} does not exist", dir.display());
    }
    Ok(CollectionStore::open(dir)?)
}

fn list_articles(project: &str, json: bool) -> anyhow::Result<()> {
    let articles = open_existing(project)?.load()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&articles)?);
        return Ok(());
    }
    for (index, article) in articles.iter().enumerate() {
        let year = article.year.map(|y| y.to_string()).unwrap_or_else(|| "n.d.".into());
        let sources = article
            .source_names
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        println!("{:>4}. {} ({year}) [{sources}]", index + 1, article.title);
        if let Some(doi) = &article.doi {
            println!("      doi:{doi}");
        }
    }
    Ok(())
}

fn export(project: &str, output: &Path) -> anyhow::Result<()> {
    let articles = open_existing(project)?.load()?;
    export_csv(output, &articles)
        .with_context(|| format!("exporting to {}", output.display()))?;
    println!("Exported {} articles to {}", articles.len(), output.display());
    Ok(())
}
