//! Configuration system for Paper-First.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> CLI args.
//! Configuration is loaded from `~/.config/paperfirst/config.toml` and/or
//! `.paperfirst/config.toml` in the workspace directory. Environment variables use the
//! `PAPERFIRST_` prefix with `__` between sections, e.g. `PAPERFIRST_DISCOVERY__MAX_ATTEMPTS=20`.

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::cache::CacheConfig;
use crate::discovery::DiscoveryConfig;
use crate::error::ConfigError;
use crate::evaluator::EvaluatorConfig;
use crate::filter::{CandidateFilter, FilterConfig};
use crate::oracle::OracleConfig;

/// Name of the workspace-level configuration directory.
pub const WORKSPACE_CONFIG_DIR: &str = ".paperfirst";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperFirstConfig {
    pub discovery: DiscoveryConfig,
    pub filter: FilterConfig,
    pub evaluator: EvaluatorConfig,
    pub cache: CacheConfig,
    pub oracle: OracleConfig,
}

impl PaperFirstConfig {
    /// Check values serde cannot: ranges, cross-field constraints, and that
    /// every filter pattern compiles.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.discovery.validate()?;
        CandidateFilter::new(&self.filter)?;

        if self.filter.paper_presence_signals.is_empty() {
            return Err(ConfigError::Invalid {
                message: "filter.paper_presence_signals must not be empty".into(),
            });
        }

        let w = &self.evaluator.study_type_weights;
        let weights = [
            w.meta_analysis,
            w.systematic_review,
            w.randomized_trial,
            w.review,
            w.original_research,
            w.other,
        ];
        if weights.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(ConfigError::Invalid {
                message: "evaluator.study_type_weights must be finite and non-negative".into(),
            });
        }

        if self.cache.max_entries == 0 {
            return Err(ConfigError::Invalid {
                message: "cache.max_entries must be at least 1".into(),
            });
        }

        if self.oracle.timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                message: "oracle.timeout_secs must be at least 1".into(),
            });
        }
        if !(0.0..=2.0).contains(&self.oracle.temperature) {
            return Err(ConfigError::Invalid {
                message: format!(
                    "oracle.temperature must be between 0.0 and 2.0, got {}",
                    self.oracle.temperature
                ),
            });
        }
        Ok(())
    }
}

/// Platform directories for Paper-First (config, cache, logs).
pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "paperfirst", "paperfirst")
}

/// Default directory for persisted cache entries.
pub fn default_cache_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.cache_dir().join("results"))
}

fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(WORKSPACE_CONFIG_DIR).join("config.toml")
}

/// Load configuration by merging all layers.
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&PaperFirstConfig>,
) -> Result<PaperFirstConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(PaperFirstConfig::default()));

    // User-level config
    if let Some(dirs) = project_dirs() {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    // Workspace-level config
    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // Environment variables (PAPERFIRST_DISCOVERY__MAX_ATTEMPTS, PAPERFIRST_ORACLE__MODEL, etc.)
    figment = figment.merge(Env::prefixed("PAPERFIRST_").split("__"));

    // Explicit overrides
    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

/// Load every layer and validate the merged result.
pub fn load_validated(workspace: Option<&Path>) -> crate::Result<PaperFirstConfig> {
    let config = load_config(workspace, None).map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })?;
    config.validate()?;
    Ok(config)
}

/// Check whether any Paper-First configuration file exists (user-level or workspace-level).
pub fn config_exists(workspace: Option<&Path>) -> bool {
    if project_dirs().is_some_and(|dirs| dirs.config_dir().join("config.toml").exists()) {
        return true;
    }
    workspace.is_some_and(|ws| workspace_config_path(ws).exists())
}
