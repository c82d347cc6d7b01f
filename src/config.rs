use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::cli::Cli;

const DEFAULT_DEPTH: usize = 1;
const DEFAULT_QUIET_MS: u64 = 800;
const DEFAULT_WAIT_MS: u64 = 10;

/// Defaults loaded from `watchrun.toml` at the watch root.
#[derive(Debug, Deserialize, Default)]
pub struct FileConfig {
    /// Recursion depth below the root.
    pub depth: Option<usize>,
    /// Glob patterns to ignore.
    pub ignore: Option<Vec<String>>,
    /// Quiet period after command execution, in milliseconds.
    pub quiet_ms: Option<u64>,
    /// Delay between change detection and execution, in milliseconds.
    pub wait_ms: Option<u64>,
}

impl FileConfig {
    /// Load defaults from `watchrun.toml` in the given root directory.
    ///
    /// Returns an empty configuration if the file does not exist or cannot
    /// be parsed.
    pub fn load(root: &Path) -> Self {
        let config_path = root.join("watchrun.toml");

        if !config_path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match toml::from_str::<Self>(&contents) {
                Ok(config) => config,
                Err(err) => {
                    eprintln!("warning: failed to parse watchrun.toml: {err}. Using defaults.");
                    Self::default()
                }
            },
            Err(err) => {
                eprintln!("warning: failed to read watchrun.toml: {err}. Using defaults.");
                Self::default()
            }
        }
    }
}

/// Resolved, immutable configuration for one watch session.
///
/// Constructed once at startup; every component reads it by reference and
/// nothing consults ambient state afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    pub root: PathBuf,
    pub depth: usize,
    pub ignore: Vec<String>,
    pub quiet: Duration,
    pub wait: Duration,
    pub verbose: bool,
    pub clear: bool,
    pub run_on_start: bool,
    pub command: Vec<String>,
}

impl Config {
    /// Merge command-line flags over `watchrun.toml` defaults, flags winning.
    ///
    /// Fails when the watch root cannot be resolved to an existing
    /// directory; nothing is watched in that case.
    pub fn resolve(cli: Cli) -> Result<Self> {
        let root = cli
            .dir
            .canonicalize()
            .with_context(|| format!("cannot resolve watch root {}", cli.dir.display()))?;

        let file = FileConfig::load(&root);

        let ignore = match &cli.ignore {
            Some(raw) => split_patterns(raw),
            None => file.ignore.unwrap_or_default(),
        };

        Ok(Self {
            root,
            depth: cli.depth.or(file.depth).unwrap_or(DEFAULT_DEPTH),
            ignore,
            quiet: Duration::from_millis(cli.quiet_ms.or(file.quiet_ms).unwrap_or(DEFAULT_QUIET_MS)),
            wait: Duration::from_millis(cli.wait_ms.or(file.wait_ms).unwrap_or(DEFAULT_WAIT_MS)),
            verbose: cli.verbose,
            clear: cli.clear,
            run_on_start: cli.run_on_start,
            command: cli.command,
        })
    }
}

/// Split a comma-separated ignore list into individual patterns, dropping
/// empty segments.
fn split_patterns(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}
