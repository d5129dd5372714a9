//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};

use crate::geolocation::Pacing;

/// Record command arguments.
#[derive(Debug, Args)]
pub struct RecordCommand {
    /// JSON-lines position feed to record from ("-" for stdin)
    #[arg(short, long, value_name = "FILE", default_value = "-")]
    pub input: PathBuf,

    /// Save the track under this name when recording ends
    #[arg(short, long)]
    pub name: Option<String>,

    /// Replay the feed at the pace of its timestamps
    #[arg(long)]
    pub realtime: bool,
}

impl RecordCommand {
    /// Whether positions come from standard input.
    #[must_use]
    pub fn reads_stdin(&self) -> bool {
        self.input == Path::new("-")
    }

    /// How the feed is replayed.
    #[must_use]
    pub fn pacing(&self) -> Pacing {
        if self.realtime {
            Pacing::RealTime
        } else {
            Pacing::Instant
        }
    }
}

/// List command arguments.
#[derive(Debug, Args)]
pub struct ListCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Show command arguments.
#[derive(Debug, Args)]
pub struct ShowCommand {
    /// Track id
    pub id: i64,

    /// Output as JSON (the stored record layout)
    #[arg(short, long)]
    pub json: bool,
}

/// Export command arguments.
#[derive(Debug, Args)]
pub struct ExportCommand {
    /// Track id
    pub id: i64,

    /// Directory to write the GPX file to (defaults to the configured one)
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,
}

/// Delete command arguments.
#[derive(Debug, Args)]
pub struct DeleteCommand {
    /// Track id
    pub id: i64,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}
