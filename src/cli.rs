// src/cli.rs
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Config;

/// ct-sift: Certificate Transparency log scanner
///
/// Verifies each log's signed tree head, walks its entries in order and
/// records certificates whose names end with the search term.
#[derive(Parser, Debug, Clone)]
#[command(name = "ct-sift")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to TOML config file
    #[arg(short = 'c', long = "config", default_value = "config.toml")]
    pub config: PathBuf,

    /// Verbose logging (set log level to debug)
    #[arg(short = 'v', long = "verbose", conflicts_with = "quiet")]
    pub verbose: bool,

    /// Quiet logging (set log level to warn)
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,

    /// Disable progress indicator
    #[arg(long = "no-progress")]
    pub no_progress: bool,

    /// Override the search suffix from config
    #[arg(long = "search")]
    pub search: Option<String>,

    /// Override the artifact directory from config
    #[arg(long = "output-dir")]
    pub output_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Scan logs for matching certificates (default)
    Scan {
        /// Start at this index instead of the stored checkpoint
        #[arg(long = "start")]
        start: Option<u64>,

        /// Only scan the log with this URL
        #[arg(long = "log")]
        log: Option<String>,
    },
    /// Fetch, verify and print each log's tree head
    Head,
    /// Store the public log list in the database
    SyncLogs,
}

impl Cli {
    /// Subcommand to run, `scan` when none was given
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Scan {
            start: None,
            log: None,
        })
    }

    /// Log level forced by flags, if any
    pub fn log_level_override(&self) -> Option<&'static str> {
        if self.verbose {
            Some("debug")
        } else if self.quiet {
            Some("warn")
        } else {
            None
        }
    }

    /// Progress is drawn only on an interactive stderr
    pub fn should_show_progress(&self, stderr_is_terminal: bool) -> bool {
        !self.no_progress && stderr_is_terminal
    }

    /// Apply flag overrides to a loaded config
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(ref term) = self.search {
            config.search.term = term.clone();
        }
        if let Some(ref dir) = self.output_dir {
            config.output.dir = dir.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_path() {
        let cli = Cli::parse_from(["ct-sift"]);
        assert_eq!(cli.config, PathBuf::from("config.toml"));
    }

    #[test]
    fn test_default_command_is_scan() {
        let cli = Cli::parse_from(["ct-sift"]);
        assert_eq!(
            cli.command(),
            Command::Scan {
                start: None,
                log: None
            }
        );
    }

    #[test]
    fn test_scan_arguments() {
        let cli = Cli::parse_from([
            "ct-sift",
            "-c",
            "test.toml",
            "scan",
            "--start",
            "4000",
            "--log",
            "https://ct.example.com/",
        ]);
        assert_eq!(cli.config, PathBuf::from("test.toml"));
        assert_eq!(
            cli.command(),
            Command::Scan {
                start: Some(4000),
                log: Some("https://ct.example.com/".to_string())
            }
        );
    }

    #[test]
    fn test_subcommands() {
        assert_eq!(Cli::parse_from(["ct-sift", "head"]).command(), Command::Head);
        assert_eq!(
            Cli::parse_from(["ct-sift", "sync-logs"]).command(),
            Command::SyncLogs
        );
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["ct-sift", "-v", "-q"]).is_err());
    }

    #[test]
    fn test_log_level_override() {
        assert_eq!(Cli::parse_from(["ct-sift", "-v"]).log_level_override(), Some("debug"));
        assert_eq!(Cli::parse_from(["ct-sift", "-q"]).log_level_override(), Some("warn"));
        assert_eq!(Cli::parse_from(["ct-sift"]).log_level_override(), None);
    }

    #[test]
    fn test_progress_needs_terminal() {
        let cli = Cli::parse_from(["ct-sift"]);
        assert!(cli.should_show_progress(true));
        assert!(!cli.should_show_progress(false));

        let cli = Cli::parse_from(["ct-sift", "--no-progress"]);
        assert!(!cli.should_show_progress(true));
    }

    #[test]
    fn test_overrides_applied() {
        let cli = Cli::parse_from(["ct-sift", "--search", ".net", "--output-dir", "/tmp/pems"]);
        let mut config = Config::default();
        cli.apply_overrides(&mut config);

        assert_eq!(config.search.term, ".net");
        assert_eq!(config.output.dir, PathBuf::from("/tmp/pems"));
    }
}
