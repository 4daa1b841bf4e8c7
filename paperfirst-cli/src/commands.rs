//! CLI subcommand handlers.

use crate::output;
use crate::{CacheAction, Commands, ConfigAction};
use anyhow::Context;
use paperfirst_core::config::{WORKSPACE_CONFIG_DIR, default_cache_dir, load_validated};
use paperfirst_core::oracle::split_candidates;
use paperfirst_core::{
    CandidateFilter, Citation, DiscoveryOrchestrator, GeminiOracle, GradedCitation,
    PaperFirstConfig, QualityEvaluator, ResultCache, Termination, parse_candidate,
};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Handle a CLI subcommand.
pub async fn handle_command(command: Commands, workspace: &Path) -> anyhow::Result<()> {
    match command {
        Commands::Discover {
            category,
            target,
            max_attempts,
            min_grade,
            accept_partial,
            refresh,
            json,
        } => {
            let mut config = load(workspace)?;
            let d = &mut config.discovery;
            if let Some(target) = target {
                d.target_topic_count = target;
            }
            if let Some(max_attempts) = max_attempts {
                d.max_attempts = max_attempts;
            }
            if let Some(grade) = min_grade {
                d.min_acceptable_grade = grade;
            }
            d.accept_partial |= accept_partial;
            handle_discover(&category, &config, refresh, json).await
        }
        Commands::Evaluate { file, json } => handle_evaluate(&file, json, workspace),
        Commands::Filter { file } => handle_filter(&file, workspace),
        Commands::Cache { action } => handle_cache(action, workspace),
        Commands::Config { action } => handle_config(action, workspace),
    }
}

fn load(workspace: &Path) -> anyhow::Result<PaperFirstConfig> {
    load_validated(Some(workspace)).context("Failed to load config")
}

/// Open the result cache, persisting under the platform cache directory
/// unless the configuration names one.
fn open_cache(config: &PaperFirstConfig) -> ResultCache {
    let mut cache_config = config.cache.clone();
    if cache_config.directory.is_none() {
        cache_config.directory = default_cache_dir();
    }
    ResultCache::new(cache_config)
}

async fn handle_discover(
    category: &str,
    config: &PaperFirstConfig,
    refresh: bool,
    json: bool,
) -> anyhow::Result<()> {
    let oracle = Arc::new(GeminiOracle::new(&config.oracle)?);
    let cache = Arc::new(open_cache(config));
    let orchestrator = DiscoveryOrchestrator::from_config(oracle, cache, config)?;
    if refresh {
        orchestrator.invalidate(category);
    }

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping discovery");
            trigger.cancel();
        }
    });

    let result = orchestrator
        .discover_with_cancel(
            category,
            config.discovery.target_topic_count,
            config.discovery.max_attempts,
            &cancel,
        )
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", output::render_discovery(category, &result));
    }
    if !result.complete && result.termination == Termination::Exhausted && !result.is_empty() {
        eprintln!(
            "Found {} of {} topics. Re-run with --accept-partial to keep this result.",
            result.topics.len(),
            config.discovery.target_topic_count
        );
    }
    Ok(())
}

fn handle_evaluate(file: &Path, json: bool, workspace: &Path) -> anyhow::Result<()> {
    let config = load(workspace)?;
    let evaluator = QualityEvaluator::new(&config.evaluator);
    let records = output::parse_citation_records(&output::read_input(file)?)?;

    let mut assessments = Vec::new();
    let mut graded = Vec::new();
    for (i, record) in records.into_iter().enumerate() {
        let assessed = Citation::try_from(record)
            .and_then(|c| evaluator.assess(&c).map(|assessment| (c, assessment)));
        let (citation, assessment) = match assessed {
            Ok(pair) => pair,
            Err(e) => {
                warn!(index = i + 1, error = %e, "Skipping citation");
                eprintln!("Skipping citation #{}: {e}", i + 1);
                continue;
            }
        };
        graded.push(GradedCitation {
            citation,
            metrics: assessment.metrics.clone(),
        });
        assessments.push(assessment);
    }
    let summary = evaluator.summarize(&graded);

    if json {
        let report = serde_json::json!({
            "citations": graded,
            "assessments": assessments,
            "summary": summary,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", output::render_assessments(&assessments, &summary));
    }
    Ok(())
}

fn handle_filter(file: &Path, workspace: &Path) -> anyhow::Result<()> {
    let config = load(workspace)?;
    let filter = CandidateFilter::new(&config.filter)?;
    let text = output::read_input(file)?;
    for line in filter_report(&filter, &text) {
        println!("{line}");
    }
    Ok(())
}

/// One line per candidate found in `text`, plus what parsing made of the
/// accepted ones.
fn filter_report(filter: &CandidateFilter, text: &str) -> Vec<String> {
    let candidates = split_candidates(text);
    if candidates.is_empty() {
        return vec!["No candidates found.".to_string()];
    }
    let mut lines = Vec::new();
    for (i, raw) in candidates.iter().enumerate() {
        let verdict = filter.classify(raw.as_str());
        lines.push(output::render_verdict(i + 1, &verdict));
        if !verdict.is_accepted() {
            continue;
        }
        match parse_candidate(raw) {
            Ok(draft) => lines.push(format!(
                "    topic \"{}\" with {} citation(s)",
                draft.name,
                draft.citations.len()
            )),
            Err(e) => lines.push(format!("    unparseable: {e}")),
        }
    }
    lines
}

fn handle_cache(action: CacheAction, workspace: &Path) -> anyhow::Result<()> {
    let config = load(workspace)?;
    let cache = open_cache(&config);
    match action {
        CacheAction::Stats => {
            print!(
                "{}",
                output::render_stats(&cache.stats(), cache.config().directory.as_deref())
            );
        }
        CacheAction::Sweep => {
            let removed = cache.sweep_expired();
            println!("Removed {removed} expired entries.");
        }
        CacheAction::Clear => {
            let removed = cache.clear();
            println!("Removed {removed} entries.");
        }
        CacheAction::Invalidate { category } => {
            if cache.invalidate(&DiscoveryOrchestrator::fingerprint(&category)) {
                println!("Removed cached result for '{category}'.");
            } else {
                println!("No cached result for '{category}'.");
            }
        }
    }
    Ok(())
}

fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = init_config(workspace)?;
            println!("Configuration file at: {}", config_path.display());
            Ok(())
        }
        ConfigAction::Show => {
            let config = load(workspace)?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

/// Write the default configuration to the workspace unless one exists.
fn init_config(workspace: &Path) -> anyhow::Result<std::path::PathBuf> {
    let config_dir = workspace.join(WORKSPACE_CONFIG_DIR);
    std::fs::create_dir_all(&config_dir)?;

    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        return Ok(config_path);
    }
    let toml_str = toml::to_string_pretty(&PaperFirstConfig::default())?;
    std::fs::write(&config_path, toml_str)?;
    Ok(config_path)
}
