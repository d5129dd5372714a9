//! `tracklog` - Record GPS tracks, keep them locally and export them as GPX
//!
//! This library provides the recording core: the sample filter that turns a
//! live position stream into track points, the session state machine around
//! it, the track store and the GPX 1.1 writer.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod filter;
pub mod geolocation;
pub mod gpx;
pub mod logging;
pub mod recorder;
pub mod session;
pub mod storage;
pub mod track;
pub mod ui;

pub use config::Config;
pub use error::{Error, Result};
pub use export::{DirectoryExporter, FileExporter};
pub use filter::{FilterDecision, SampleFilter};
pub use geolocation::{GeolocationSource, JsonLinesSource, Pacing, Position, Sample};
pub use logging::init_logging;
pub use recorder::{Recorder, RecorderSettings};
pub use session::{ControlState, SessionState, TrackSession};
pub use storage::{MemoryTrackStore, SqliteTrackStore, TrackStore};
pub use track::{Track, TrackPoint, TrackSummary};
pub use ui::{TerminalUi, UiController};
