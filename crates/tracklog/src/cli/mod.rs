//! Command-line interface for tracklog.
//!
//! This module provides the CLI structure for the `tracklog` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    ConfigCommand, DeleteCommand, ExportCommand, ListCommand, RecordCommand, ShowCommand,
};

/// tracklog - Record GPS tracks and export them as GPX
///
/// Records positions from a JSON-lines feed, keeps named tracks in a local
/// database and writes them out as GPX 1.1 files.
#[derive(Debug, Parser)]
#[command(name = "tracklog")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Record a track from a position feed
    Record(RecordCommand),

    /// List saved tracks, newest first
    List(ListCommand),

    /// Show one saved track
    Show(ShowCommand),

    /// Export a saved track as GPX
    Export(ExportCommand),

    /// Delete a saved track
    Delete(DeleteCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        crate::logging::Verbosity::from_flags(self.quiet, self.verbose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::Verbosity;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_cli_name() {
        let cli = Cli::command();
        assert_eq!(cli.get_name(), "tracklog");
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_verbosity() {
        assert_eq!(parse(&["tracklog", "-q", "list"]).verbosity(), Verbosity::Quiet);
        assert_eq!(parse(&["tracklog", "list"]).verbosity(), Verbosity::Normal);
        assert_eq!(parse(&["tracklog", "-v", "list"]).verbosity(), Verbosity::Verbose);
        assert_eq!(parse(&["tracklog", "-vv", "list"]).verbosity(), Verbosity::Trace);
    }

    #[test]
    fn test_parse_record_defaults() {
        let cli = parse(&["tracklog", "record"]);
        let Command::Record(cmd) = cli.command else {
            panic!("expected record");
        };
        assert!(cmd.reads_stdin());
        assert!(cmd.name.is_none());
        assert!(!cmd.realtime);
    }

    #[test]
    fn test_parse_record_with_options() {
        let cli = parse(&[
            "tracklog",
            "record",
            "--input",
            "walk.jsonl",
            "--name",
            "Morning Run",
            "--realtime",
        ]);
        let Command::Record(cmd) = cli.command else {
            panic!("expected record");
        };
        assert_eq!(cmd.input, PathBuf::from("walk.jsonl"));
        assert_eq!(cmd.name.as_deref(), Some("Morning Run"));
        assert!(cmd.realtime);
    }

    #[test]
    fn test_parse_list_json() {
        let cli = parse(&["tracklog", "list", "--json"]);
        assert!(matches!(cli.command, Command::List(ListCommand { json: true })));
    }

    #[test]
    fn test_parse_show() {
        let cli = parse(&["tracklog", "show", "1700000000000"]);
        assert!(matches!(
            cli.command,
            Command::Show(ShowCommand {
                id: 1_700_000_000_000,
                json: false
            })
        ));
    }

    #[test]
    fn test_parse_export_with_output() {
        let cli = parse(&["tracklog", "export", "42", "-o", "/tmp/gpx"]);
        let Command::Export(cmd) = cli.command else {
            panic!("expected export");
        };
        assert_eq!(cmd.id, 42);
        assert_eq!(cmd.output, Some(PathBuf::from("/tmp/gpx")));
    }

    #[test]
    fn test_parse_delete() {
        let cli = parse(&["tracklog", "delete", "42"]);
        assert!(matches!(cli.command, Command::Delete(DeleteCommand { id: 42 })));
    }

    #[test]
    fn test_parse_config_validate() {
        let cli = parse(&["tracklog", "config", "validate", "--file", "x.toml"]);
        assert!(matches!(
            cli.command,
            Command::Config(ConfigCommand::Validate { file: Some(_) })
        ));
    }

    #[test]
    fn test_parse_with_config() {
        let cli = parse(&["tracklog", "-c", "/custom/config.toml", "list"]);
        assert_eq!(cli.config, Some(PathBuf::from("/custom/config.toml")));
    }

    #[test]
    fn test_rejects_non_numeric_id() {
        assert!(Cli::try_parse_from(["tracklog", "show", "abc"]).is_err());
    }
}
