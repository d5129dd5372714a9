//! `tracklog` - CLI for the track recorder
//!
//! Records tracks from a position feed and manages the saved ones.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};

use tracklog::cli::{Cli, Command, ConfigCommand, ExportCommand, RecordCommand, ShowCommand};
use tracklog::geolocation::GeolocationSource;
use tracklog::track::format_instant;
use tracklog::{
    init_logging, Config, DirectoryExporter, Error, JsonLinesSource, Pacing, Recorder,
    RecorderSettings, SessionState, SqliteTrackStore, TerminalUi, TrackStore,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(err.downcast_ref::<Error>().map_or(1, Error::exit_code))
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Command::Config(config_cmd) = cli.command {
        return handle_config(cli.config, config_cmd);
    }

    // Load configuration
    let config = Config::load_from(cli.config.clone())?;

    match cli.command {
        Command::Record(cmd) => handle_record(&config, cmd).await,
        Command::List(cmd) => handle_list(&config, cmd.json).await,
        Command::Show(cmd) => handle_show(&config, &cmd).await,
        Command::Export(cmd) => handle_export(&config, cmd).await,
        Command::Delete(cmd) => {
            let mut recorder = open_library(&config, &config.output_dir())?;
            recorder.delete_track(cmd.id).await?;
            println!("Deleted track {}", cmd.id);
            Ok(())
        }
        Command::Config(_) => Ok(()),
    }
}

fn open_store(config: &Config) -> anyhow::Result<SqliteTrackStore> {
    let path = config.database_path();
    SqliteTrackStore::open(&path)
        .with_context(|| format!("cannot open track database {}", path.display()))
}

/// A recorder with no position feed, for the commands that only manage saved
/// tracks.
fn open_library(config: &Config, output_dir: &Path) -> anyhow::Result<Recorder> {
    let store = open_store(config)?;
    Ok(Recorder::new(
        RecorderSettings::from_config(config),
        Box::new(JsonLinesSource::from_reader(
            tokio::io::empty(),
            Pacing::Instant,
            "<none>",
        )),
        Some(Box::new(store)),
        Box::new(TerminalUi::new()),
        Box::new(DirectoryExporter::new(output_dir)),
    ))
}

async fn handle_record(config: &Config, cmd: RecordCommand) -> anyhow::Result<()> {
    let source: Box<dyn GeolocationSource> = if cmd.reads_stdin() {
        Box::new(JsonLinesSource::from_stdin(cmd.pacing()))
    } else {
        Box::new(JsonLinesSource::from_path(&cmd.input, cmd.pacing())?)
    };

    // Recording goes ahead without a store; saving will fail later.
    let store: Option<Box<dyn TrackStore>> = match SqliteTrackStore::open(config.database_path())
    {
        Ok(store) => Some(Box::new(store)),
        Err(err) => {
            error!(%err, "Track store unavailable");
            None
        }
    };

    let mut recorder = Recorder::new(
        RecorderSettings::from_config(config),
        source,
        store,
        Box::new(TerminalUi::new()),
        Box::new(DirectoryExporter::new(config.output_dir())),
    );
    recorder.initialize().await;
    recorder.start().await?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        let event = tokio::select! {
            event = recorder.next_event() => event,
            _ = &mut ctrl_c => {
                info!("Interrupted");
                None
            }
        };
        match event {
            Some(event) => {
                recorder.process_event(event);
            }
            None => break,
        }
    }
    recorder.stop();

    let points = recorder.session().points().len();
    match cmd.name {
        Some(name) if recorder.state() == SessionState::Stopped && points > 0 => {
            recorder.set_name(&name);
            match recorder.save().await? {
                Some(track) => println!(
                    "Saved track {} \"{}\" with {} points",
                    track.id,
                    track.name,
                    track.len()
                ),
                None => warn!("Track name is blank; nothing saved"),
            }
        }
        Some(_) => warn!("No points recorded; nothing saved"),
        None => {
            if points > 0 {
                warn!(points, "No --name given; discarding recorded points");
            }
            recorder.discard()?;
        }
    }
    Ok(())
}

async fn handle_list(config: &Config, json: bool) -> anyhow::Result<()> {
    let mut recorder = open_library(config, &config.output_dir())?;
    let summaries = recorder.refresh_tracks().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    if summaries.is_empty() {
        println!("No saved tracks.");
        return Ok(());
    }
    for summary in &summaries {
        println!(
            "{:<15} {:<26} {:>6} pts  {}",
            summary.id,
            format_instant(&summary.created_at),
            summary.point_count,
            summary.name
        );
    }
    Ok(())
}

async fn handle_show(config: &Config, cmd: &ShowCommand) -> anyhow::Result<()> {
    let mut recorder = open_library(config, &config.output_dir())?;
    let track = recorder.load_track(cmd.id).await?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&track)?);
        return Ok(());
    }

    println!("Track {}", track.id);
    println!("  Name:    {}", track.name);
    println!("  Saved:   {}", format_instant(&track.created_at));
    println!("  Points:  {}", track.len());
    println!();
    for point in &track.points {
        println!(
            "  {}  {:.6}, {:.6}  {} m",
            format_instant(&point.timestamp),
            point.latitude,
            point.longitude,
            point.elevation
        );
    }
    Ok(())
}

async fn handle_export(config: &Config, cmd: ExportCommand) -> anyhow::Result<()> {
    let dir = cmd.output.unwrap_or_else(|| config.output_dir());
    let mut recorder = open_library(config, &dir)?;
    let filename = recorder.download(cmd.id).await?;

    println!("{}", dir.join(filename).display());
    Ok(())
}

fn handle_config(config_path: Option<PathBuf>, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            let config = Config::load_from(config_path)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Recorder]");
                println!("  Min interval (ms):  {}", config.recorder.min_interval_ms);
                println!("  High accuracy:      {}", config.recorder.high_accuracy);
                println!("  Maximum age (ms):   {}", config.recorder.maximum_age_ms);
                println!("  Timeout (ms):       {}", config.recorder.timeout_ms);
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!();
                println!("[Export]");
                println!("  Output directory:   {}", config.output_dir().display());
                println!("  Creator:            {}", config.export.creator);
            }
        }
        ConfigCommand::Path => {
            let path = config_path.unwrap_or_else(Config::default_config_path);
            println!("{}", path.display());
        }
        ConfigCommand::Validate { file } => {
            let path = file
                .or(config_path)
                .unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
