use std::path::PathBuf;

use clap::Parser;

/// Watch a directory tree and re-run a command when files change.
///
/// watchrun coalesces bursts of filesystem events into a single trigger,
/// runs the command with inherited standard streams, and guarantees that at
/// most one instance of the command is alive at any time: a new trigger
/// terminates the previous run before starting the next one.
#[derive(Parser, Debug)]
#[command(
    name = "watchrun",
    version,
    about,
    long_about = None,
)]
pub struct Cli {
    /// Directory root to watch.
    #[arg(long = "dir", default_value = ".", value_name = "PATH")]
    pub dir: PathBuf,

    /// Recursion depth below the root (0 watches the root only).
    #[arg(short = 'd', long, value_name = "N")]
    pub depth: Option<usize>,

    /// Comma-separated glob patterns to ignore (e.g. "*.tmp,*.log").
    #[arg(long, value_name = "GLOBS")]
    pub ignore: Option<String>,

    /// Quiet period after command execution in milliseconds; changes seen
    /// during it are discarded so the command's own output cannot re-trigger it.
    #[arg(long, value_name = "MS")]
    pub quiet_ms: Option<u64>,

    /// Time to wait between change detection and execution in milliseconds.
    #[arg(long, value_name = "MS")]
    pub wait_ms: Option<u64>,

    /// Print per-event and per-phase diagnostics to stderr.
    #[arg(short, long)]
    pub verbose: bool,

    /// Clear the terminal before each run.
    #[arg(short, long)]
    pub clear: bool,

    /// Run the command once as soon as the watch is established, before any
    /// real change is observed.
    #[arg(long)]
    pub run_on_start: bool,

    /// Command to execute and its arguments. A single argument containing
    /// shell metacharacters is run through `sh -c`.
    #[arg(
        required = true,
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "COMMAND"
    )]
    pub command: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_is_required() {
        let result = Cli::try_parse_from(["watchrun"]);
        assert!(result.is_err(), "parsing without a command should fail");
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["watchrun", "make"]).unwrap();
        assert_eq!(cli.dir, PathBuf::from("."));
        assert_eq!(cli.depth, None);
        assert_eq!(cli.ignore, None);
        assert!(!cli.verbose);
        assert!(!cli.clear);
        assert!(!cli.run_on_start);
        assert_eq!(cli.command, vec!["make".to_string()]);
    }

    #[test]
    fn test_trailing_command_keeps_flags() {
        let cli = Cli::try_parse_from([
            "watchrun", "--wait-ms", "50", "go", "test", "-v", "./...",
        ])
        .unwrap();
        assert_eq!(cli.wait_ms, Some(50));
        assert_eq!(cli.command, vec!["go", "test", "-v", "./..."]);
    }
}
