//! Configuration file support for bugtrail
//!
//! Loads project-specific configuration from JSON files.
//!
//! Search order:
//! 1. Explicit path (--config CLI flag)
//! 2. `.bugtrailrc.json` in the repository root
//! 3. `bugtrail.config.json` in the repository root
//!
//! All fields are optional. CLI flags take precedence over config file values.

use crate::proportion::ProportionStrategy;
use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Source files tracked when no include pattern is configured
const DEFAULT_INCLUDES: &[&str] = &["**/*.java"];

/// Tags matching this pattern are skipped unless configured otherwise
const DEFAULT_TAG_EXCLUDE: &str = "docker";

/// bugtrail configuration loaded from a JSON config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BugtrailConfig {
    /// Tracker project key (informational, e.g. `BOOKKEEPER`)
    #[serde(default)]
    pub project: Option<String>,

    /// Prefix stripped from tag names before matching tracker versions
    #[serde(default)]
    pub tag_prefix: Option<String>,

    /// Regex of tags that are never releases (default: `docker`, empty disables)
    #[serde(default)]
    pub tag_exclude: Option<String>,

    /// Glob patterns for tracked source files (default: `**/*.java`)
    #[serde(default)]
    pub include: Vec<String>,

    /// Glob patterns for files never tracked
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Proportion estimation settings
    #[serde(default)]
    pub proportion: Option<ProportionConfig>,

    /// Keep only releases before this fraction of the timeline in the dataset
    #[serde(default)]
    pub keep_release_fraction: Option<f64>,

    /// Use the on-disk diff cache (default: true)
    #[serde(default)]
    pub cache: Option<bool>,
}

/// Named Proportion strategy as written in config files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyName {
    Incremental,
    MovingWindow,
}

/// Proportion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProportionConfig {
    /// `incremental` (default) or `moving_window`
    pub strategy: Option<StrategyName>,
    /// Window size for `moving_window`
    pub window: Option<usize>,
    /// Coefficient used when no ticket reports an injected version (default: 0)
    pub fallback_p: Option<i64>,
}

/// Which repository paths count as tracked source files
#[derive(Debug, Clone)]
pub struct SourceFilter {
    include: GlobSet,
    exclude: GlobSet,
    include_patterns: Vec<String>,
    exclude_patterns: Vec<String>,
}

impl SourceFilter {
    /// Compile include and exclude patterns; empty `include` falls back to `**/*.java`
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        if include.is_empty() {
            for pattern in DEFAULT_INCLUDES {
                builder.add(Glob::new(pattern)?);
            }
        } else {
            for pattern in include {
                builder.add(
                    Glob::new(pattern)
                        .with_context(|| format!("invalid include pattern: {}", pattern))?,
                );
            }
        }
        let include_set = builder.build()?;

        let mut builder = GlobSetBuilder::new();
        for pattern in exclude {
            builder.add(
                Glob::new(pattern)
                    .with_context(|| format!("invalid exclude pattern: {}", pattern))?,
            );
        }
        let exclude_set = builder.build()?;

        Ok(SourceFilter {
            include: include_set,
            exclude: exclude_set,
            include_patterns: include.to_vec(),
            exclude_patterns: exclude.to_vec(),
        })
    }

    /// Human-readable summary of the configured patterns
    pub fn describe(&self) -> String {
        if self.include_patterns.is_empty() && self.exclude_patterns.is_empty() {
            return format!("default ({})", DEFAULT_INCLUDES.join(", "));
        }
        let include = if self.include_patterns.is_empty() {
            DEFAULT_INCLUDES.join(", ")
        } else {
            self.include_patterns.join(", ")
        };
        if self.exclude_patterns.is_empty() {
            format!("include {}", include)
        } else {
            format!(
                "include {}; exclude {}",
                include,
                self.exclude_patterns.join(", ")
            )
        }
    }

    /// Check if a repository-relative path is a tracked source file
    pub fn is_tracked(&self, path: &str) -> bool {
        !self.exclude.is_match(path) && self.include.is_match(path)
    }
}

/// Resolved configuration with compiled patterns
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub project: Option<String>,
    pub tag_prefix: String,
    /// Compiled tag exclusion (None when disabled)
    pub tag_exclude: Option<Regex>,
    pub filter: SourceFilter,
    pub strategy: ProportionStrategy,
    pub fallback_p: i64,
    pub keep_release_fraction: Option<f64>,
    pub cache: bool,
    /// Path the config was loaded from (None if defaults)
    pub config_path: Option<PathBuf>,
}

impl BugtrailConfig {
    /// Validate the configuration for logical errors
    pub fn validate(&self) -> Result<()> {
        if let Some(ref p) = self.proportion {
            if p.strategy == Some(StrategyName::MovingWindow) {
                match p.window {
                    Some(0) | None => anyhow::bail!(
                        "proportion.window must be at least 1 for the moving_window strategy"
                    ),
                    Some(_) => {}
                }
            }
            if let Some(fallback) = p.fallback_p {
                if fallback < 0 {
                    anyhow::bail!("proportion.fallback_p must be non-negative (got {})", fallback);
                }
            }
        }

        if let Some(fraction) = self.keep_release_fraction {
            if !(fraction > 0.0 && fraction <= 1.0) {
                anyhow::bail!(
                    "keep_release_fraction must be in (0, 1] (got {})",
                    fraction
                );
            }
        }

        if let Some(ref pattern) = self.tag_exclude {
            Regex::new(pattern)
                .with_context(|| format!("invalid tag_exclude pattern: {}", pattern))?;
        }

        // Validate glob patterns compile
        for pattern in &self.include {
            Glob::new(pattern).with_context(|| format!("invalid include pattern: {}", pattern))?;
        }
        for pattern in &self.exclude {
            Glob::new(pattern).with_context(|| format!("invalid exclude pattern: {}", pattern))?;
        }

        Ok(())
    }

    /// Resolve config into compiled form ready for use
    pub fn resolve(&self) -> Result<ResolvedConfig> {
        self.validate()?;

        let tag_exclude = match self.tag_exclude.as_deref() {
            None => Some(Regex::new(DEFAULT_TAG_EXCLUDE)?),
            Some("") => None,
            Some(pattern) => Some(Regex::new(pattern)?),
        };

        let (strategy, fallback_p) = match &self.proportion {
            Some(p) => {
                let strategy = match (p.strategy, p.window) {
                    (Some(StrategyName::MovingWindow), Some(size)) => {
                        ProportionStrategy::MovingWindow { size }
                    }
                    _ => ProportionStrategy::Incremental,
                };
                (strategy, p.fallback_p.unwrap_or(0))
            }
            None => (ProportionStrategy::Incremental, 0),
        };

        Ok(ResolvedConfig {
            project: self.project.clone(),
            tag_prefix: self.tag_prefix.clone().unwrap_or_default(),
            tag_exclude,
            filter: SourceFilter::new(&self.include, &self.exclude)?,
            strategy,
            fallback_p,
            keep_release_fraction: self.keep_release_fraction,
            cache: self.cache.unwrap_or(true),
            config_path: None,
        })
    }
}

impl ResolvedConfig {
    /// Build a ResolvedConfig with all defaults (no config file)
    pub fn defaults() -> Result<Self> {
        BugtrailConfig::default().resolve()
    }
}

/// Discover and load a config file from the repository root
///
/// Search order:
/// 1. `.bugtrailrc.json`
/// 2. `bugtrail.config.json`
///
/// Returns `None` if no config file is found (use defaults).
pub fn discover_config(repo_root: &Path) -> Result<Option<(BugtrailConfig, PathBuf)>> {
    for name in [".bugtrailrc.json", "bugtrail.config.json"] {
        let path = repo_root.join(name);
        if path.exists() {
            let config = load_config_file(&path)?;
            return Ok(Some((config, path)));
        }
    }
    Ok(None)
}

/// Load config from an explicit file path
pub fn load_config_file(path: &Path) -> Result<BugtrailConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;

    let config: BugtrailConfig = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;

    config
        .validate()
        .with_context(|| format!("invalid config in: {}", path.display()))?;

    Ok(config)
}

/// Load and resolve config for a repository
///
/// If `config_path` is provided, loads from that file.
/// Otherwise, discovers config from the repository root.
/// Returns default config if nothing is found.
pub fn load_and_resolve(repo_root: &Path, config_path: Option<&Path>) -> Result<ResolvedConfig> {
    let (config, source_path) = if let Some(path) = config_path {
        let config = load_config_file(path)?;
        (config, Some(path.to_path_buf()))
    } else {
        match discover_config(repo_root)? {
            Some((config, path)) => (config, Some(path)),
            None => (BugtrailConfig::default(), None),
        }
    };

    let mut resolved = config.resolve()?;
    resolved.config_path = source_path;
    Ok(resolved)
}
