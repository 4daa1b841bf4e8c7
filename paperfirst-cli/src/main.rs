//! Paper-First CLI: discover citation-grounded topics and grade paper quality.

mod commands;
mod output;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Paper-First: topics backed by real papers, or nothing at all
#[derive(Parser, Debug)]
#[command(name = "paperfirst", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (reads .paperfirst/config.toml from here)
    #[arg(short, long, default_value = ".", global = true)]
    workspace: PathBuf,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Discover graded topics for a category
    Discover {
        /// Category to explore, e.g. "sleep" or "strength training"
        category: String,

        /// Number of topics wanted
        #[arg(short, long)]
        target: Option<usize>,

        /// Oracle calls allowed before giving up
        #[arg(short = 'n', long)]
        max_attempts: Option<usize>,

        /// Lowest citation grade kept (A+, A, B+, B, C)
        #[arg(long)]
        min_grade: Option<paperfirst_core::Grade>,

        /// Accept and cache a result below the target
        #[arg(long)]
        accept_partial: bool,

        /// Skip the cache lookup and run discovery afresh
        #[arg(long)]
        refresh: bool,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Grade citations read from a JSON file ("-" for stdin)
    Evaluate {
        /// File holding a citation object, an array of them, or {"papers": [...]}
        file: PathBuf,

        /// Print the graded citations as JSON
        #[arg(long)]
        json: bool,
    },

    /// Classify raw oracle output as paper-backed or not ("-" for stdin)
    Filter {
        /// File holding raw oracle output
        file: PathBuf,
    },

    /// Inspect and maintain the result cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum CacheAction {
    /// Show cache counters
    Stats,
    /// Remove expired entries
    Sweep,
    /// Remove every entry
    Clear,
    /// Drop the cached result for one category
    Invalidate {
        /// Category whose result should be dropped
        category: String,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Create a default workspace configuration file
    Init,
    /// Show the merged configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn,paperfirst_core=info",
        1 => "debug",
        _ => "trace",
    };

    // Human-readable layer for stderr (RUST_LOG wins when set)
    let stderr_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(stderr_filter);

    // JSON file layer for structured logging
    let log_dir = paperfirst_core::config::project_dirs()
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "paperfirst.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    commands::handle_command(cli.command, &workspace).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_discover_flags() {
        let cli = Cli::parse_from([
            "paperfirst",
            "discover",
            "sleep",
            "--target",
            "3",
            "-n",
            "8",
            "--min-grade",
            "A",
            "--accept-partial",
            "--json",
        ]);
        match cli.command {
            Commands::Discover {
                category,
                target,
                max_attempts,
                min_grade,
                accept_partial,
                refresh,
                json,
            } => {
                assert_eq!(category, "sleep");
                assert_eq!(target, Some(3));
                assert_eq!(max_attempts, Some(8));
                assert_eq!(min_grade, Some(paperfirst_core::Grade::A));
                assert!(accept_partial);
                assert!(!refresh);
                assert!(json);
            }
            other => panic!("Expected Discover, got {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["paperfirst", "cache", "stats", "-vv", "-w", "/tmp"]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.workspace, PathBuf::from("/tmp"));
        assert!(matches!(
            cli.command,
            Commands::Cache {
                action: CacheAction::Stats
            }
        ));
    }

    #[test]
    fn test_invalid_grade_is_rejected() {
        assert!(Cli::try_parse_from(["paperfirst", "discover", "sleep", "--min-grade", "D"]).is_err());
    }
}
