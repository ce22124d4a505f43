//! Bugtrail CLI - labeled defect-prediction datasets from git history and Jira exports

#![deny(warnings)]

// Global invariants enforced:
// - Deterministic output ordering
// - Diagnostics go to stderr; stdout carries only the rendered rows

use anyhow::Context;
use bugtrail_core::config::{self, ResolvedConfig};
use bugtrail_core::diff_cache::{read_diff_cache, write_diff_cache, DiffCache};
use bugtrail_core::export::{render, ReleaseRow, TicketRow};
use bugtrail_core::pipeline::{self, RunContext};
use bugtrail_core::{GitCli, JiraExport};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "bugtrail")]
#[command(about = "Build labeled defect-prediction datasets from git history and issue trackers")]
#[command(version = env!("BUGTRAIL_VERSION"))]
struct Cli {
    /// Only log errors
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Log debug diagnostics
    #[arg(long, short, global = true, conflicts_with = "quiet")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Inputs shared by every pipeline command
#[derive(clap::Args)]
struct SourceArgs {
    /// Path inside the git repository to mine
    #[arg(long, default_value = ".")]
    repo: PathBuf,

    /// Directory holding the Jira export (project.json and issues*.json)
    #[arg(long)]
    tracker: PathBuf,

    /// Path to config file (default: auto-discover in the repository root)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Prefix stripped from tag names before matching tracker versions (overrides config file)
    #[arg(long)]
    tag_prefix: Option<String>,

    /// Output format
    #[arg(long, default_value = "text")]
    format: OutputFormat,

    /// Write output to this file instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the labeled class dataset
    Build {
        #[command(flatten)]
        source: SourceArgs,

        /// Do not read or write the diff cache
        #[arg(long)]
        no_cache: bool,

        /// Export only the oldest fraction of releases (overrides config file)
        #[arg(long)]
        keep_release_fraction: Option<f64>,
    },
    /// List releases present in both the repository and the tracker
    Releases {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// List selected tickets with their injected, opening and fixed versions
    Tickets {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Validate or show a configuration file
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate a config file without running the pipeline
    Validate {
        /// Path to config file (default: auto-discover from current directory)
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Show the resolved configuration (merged defaults + config file)
    Show {
        /// Path to config file (default: auto-discover from current directory)
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
    Jsonl,
}

impl From<OutputFormat> for bugtrail_core::OutputFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Text => bugtrail_core::OutputFormat::Text,
            OutputFormat::Json => bugtrail_core::OutputFormat::Json,
            OutputFormat::Jsonl => bugtrail_core::OutputFormat::Jsonl,
        }
    }
}

/// Everything a pipeline command needs, resolved from the command line
struct Session {
    repo_root: PathBuf,
    vcs: GitCli,
    tracker: JiraExport,
    config: ResolvedConfig,
}

impl Session {
    fn open(source: &SourceArgs) -> anyhow::Result<Self> {
        let repo_path = if source.repo.is_relative() {
            std::env::current_dir()?.join(&source.repo)
        } else {
            source.repo.clone()
        };
        if !repo_path.exists() {
            anyhow::bail!("Path does not exist: {}", repo_path.display());
        }
        let repo_root = find_repo_root(&repo_path)?;

        let mut config = config::load_and_resolve(&repo_root, source.config.as_deref())
            .context("failed to load configuration")?;
        if let Some(config_path) = &config.config_path {
            tracing::info!("using config: {}", config_path.display());
        }
        if let Some(prefix) = &source.tag_prefix {
            config.tag_prefix = prefix.clone();
        }

        let vcs = GitCli::open(&repo_root)?;
        let tracker = JiraExport::from_dir(&source.tracker)
            .with_context(|| format!("failed to open tracker export {}", source.tracker.display()))?;

        Ok(Session {
            repo_root,
            vcs,
            tracker,
            config,
        })
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose)?;

    match cli.command {
        Commands::Build {
            source,
            no_cache,
            keep_release_fraction,
        } => {
            let session = Session::open(&source)?;
            if let Some(fraction) = keep_release_fraction {
                if !(fraction > 0.0 && fraction <= 1.0) {
                    anyhow::bail!("--keep-release-fraction must be in (0, 1] (got {})", fraction);
                }
            }
            let use_cache = session.config.cache && !no_cache;
            let mut cache: DiffCache = if use_cache {
                read_diff_cache(&session.repo_root).unwrap_or_default()
            } else {
                DiffCache::new()
            };

            let bar = replay_progress(cli.quiet);
            let dataset = pipeline::build_dataset(
                &session.vcs,
                &session.tracker,
                &session.config,
                &mut cache,
                |done, total| {
                    bar.set_length(total as u64);
                    bar.set_position(done as u64);
                },
            )?;
            bar.finish_and_clear();

            if use_cache {
                if let Err(e) = write_diff_cache(&session.repo_root, &cache) {
                    tracing::warn!("failed to write diff cache: {e:#}");
                }
            }

            let fraction = keep_release_fraction.or(session.config.keep_release_fraction);
            let rows = dataset.rows(fraction);
            emit(&render(&rows, source.format.into())?, source.output.as_deref())?;
            if !cli.quiet {
                print_summary(&dataset.context, rows.len());
            }
        }
        Commands::Releases { source } => {
            let session = Session::open(&source)?;
            let timeline =
                pipeline::aligned_releases(&session.vcs, &session.tracker, &session.config)?;
            let rows: Vec<ReleaseRow> = timeline.releases().iter().map(ReleaseRow::from).collect();
            emit(&render(&rows, source.format.into())?, source.output.as_deref())?;
        }
        Commands::Tickets { source } => {
            let session = Session::open(&source)?;
            let selection =
                pipeline::select_and_estimate(&session.vcs, &session.tracker, &session.config)?;
            let rows: Vec<TicketRow> = selection
                .tickets
                .iter()
                .map(|t| TicketRow::from_ticket(t, &selection.timeline))
                .collect();
            emit(&render(&rows, source.format.into())?, source.output.as_deref())?;
            if !cli.quiet {
                print_summary(&selection.context, rows.len());
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Validate { path } => {
                let project_root = std::env::current_dir()?;
                let resolved = config::load_and_resolve(&project_root, path.as_deref());

                match resolved {
                    Ok(config) => {
                        if let Some(ref p) = config.config_path {
                            println!("Config valid: {}", p.display());
                        } else {
                            println!("No config file found. Using defaults.");
                        }
                    }
                    Err(e) => {
                        eprintln!("Config validation failed: {:#}", e);
                        std::process::exit(1);
                    }
                }
            }
            ConfigAction::Show { path } => {
                let project_root = std::env::current_dir()?;
                let resolved = config::load_and_resolve(&project_root, path.as_deref())
                    .context("failed to load configuration")?;
                print_config(&resolved);
            }
        },
    }

    Ok(())
}

fn init_tracing(quiet: bool, verbose: bool) -> anyhow::Result<()> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env("BUGTRAIL_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}

fn replay_progress(quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} replaying commits [{bar:40}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar
}

fn print_summary(context: &RunContext, rows: usize) {
    eprintln!("Releases: {}", context.releases);
    eprintln!("Commits: {}", context.commits);
    eprintln!(
        "Tickets: {} fetched, {} unlinked, {} unplaced, {} rejected, {} selected",
        context.tickets_fetched,
        context.tickets_unlinked,
        context.tickets_unplaced,
        context.tickets_rejected,
        context.tickets_selected
    );
    if let Some(proportion) = context.proportion {
        let source = if proportion.is_fallback() {
            "fallback"
        } else {
            "estimated"
        };
        eprintln!(
            "Proportion: p = {} ({}, {} samples), {} injected versions predicted",
            proportion.p, source, proportion.samples, context.iv_predicted
        );
    }
    if context.classes > 0 {
        eprintln!(
            "Classes: {} snapshots, {} buggy, {} labels from {} fix commits",
            context.classes,
            context.buggy_classes,
            context.labeling.labels_applied,
            context.labeling.fix_commits
        );
    }
    eprintln!("Rows: {}", rows);
}

fn print_config(resolved: &ResolvedConfig) {
    println!("Configuration:");
    if let Some(ref p) = resolved.config_path {
        println!("  Source: {}", p.display());
    } else {
        println!("  Source: defaults (no config file found)");
    }
    println!();
    println!("Releases:");
    println!(
        "  project: {}",
        resolved.project.as_deref().unwrap_or("none")
    );
    println!("  tag_prefix: {:?}", resolved.tag_prefix);
    println!(
        "  tag_exclude: {}",
        resolved
            .tag_exclude
            .as_ref()
            .map(|r| r.as_str().to_string())
            .unwrap_or_else(|| "none".to_string())
    );
    println!(
        "  keep_release_fraction: {}",
        resolved
            .keep_release_fraction
            .map(|v| v.to_string())
            .unwrap_or_else(|| "all".to_string())
    );
    println!();
    println!("Proportion:");
    println!("  strategy: {:?}", resolved.strategy);
    println!("  fallback_p: {}", resolved.fallback_p);
    println!();
    println!("Sources:");
    println!("  filter: {}", resolved.filter.describe());
    println!("  diff cache: {}", if resolved.cache { "on" } else { "off" });
}

/// Print to stdout, or write atomically to `output`
fn emit(rendered: &str, output: Option<&Path>) -> anyhow::Result<()> {
    let Some(path) = output else {
        print!("{}", rendered);
        return Ok(());
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let temp_path = path.with_extension("tmp");
    std::fs::write(&temp_path, rendered)
        .with_context(|| format!("Failed to write temporary file: {}", temp_path.display()))?;
    std::fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename temporary file to: {}", path.display()))?;
    eprintln!("Output written to: {}", path.display());
    Ok(())
}

/// Find git repository root by searching up the directory tree
fn find_repo_root(start_path: &Path) -> anyhow::Result<PathBuf> {
    let mut current = if start_path.is_file() {
        start_path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("invalid file path"))?
            .to_path_buf()
    } else {
        start_path.to_path_buf()
    };

    loop {
        if current.join(".git").exists() {
            return Ok(current);
        }
        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => anyhow::bail!("not in a git repository (no .git directory found)"),
        }
    }
}
