//! Presentation boundary.
//!
//! The recorder reports everything a user sees through [`UiController`]:
//! status line, control state, latest coordinates and the saved-tracks list.
//! [`TerminalUi`] renders these as log lines for the command-line tool.

use tracing::{debug, info, warn};

use crate::session::ControlState;
use crate::track::{TrackPoint, TrackSummary};

/// Status shown while recording.
pub const STATUS_RECORDING: &str = "Status: Tracking...";
/// Status shown after stopping.
pub const STATUS_STOPPED: &str = "Status: Tracking stopped";
/// Status shown after discarding the unsaved track.
pub const STATUS_DISCARDED: &str = "Status: Track deleted";
/// Status shown when no location source exists.
pub const STATUS_UNSUPPORTED: &str = "Geolocation is not supported";
/// Status shown when the track store could not be opened.
pub const STATUS_STORAGE_INIT_FAILED: &str = "Error initializing storage";
/// Status shown when a save fails.
pub const STATUS_SAVE_FAILED: &str = "Error saving track";
/// Status shown when the track list cannot be loaded.
pub const STATUS_LOAD_FAILED: &str = "Error loading tracks";
/// Status shown when deleting a stored track fails.
pub const STATUS_DELETE_FAILED: &str = "Error deleting track";

/// Receiver of everything the recorder wants shown.
pub trait UiController: Send {
    /// Replace the status line.
    fn show_status(&mut self, status: &str);

    /// Apply control visibility and enablement.
    fn show_controls(&mut self, controls: &ControlState);

    /// Show the latest accepted point, or that there is none.
    fn show_coordinates(&mut self, point: Option<&TrackPoint>);

    /// Show the stored tracks.
    fn show_tracks(&mut self, tracks: &[TrackSummary]);
}

/// Status line for a failed location request.
#[must_use]
pub fn error_status(message: &str) -> String {
    format!("Error: {message}")
}

/// Coordinates line, six decimals.
#[must_use]
pub fn format_coordinates(point: Option<&TrackPoint>) -> String {
    match point {
        Some(p) => format!("Latest coordinates: {:.6}, {:.6}", p.latitude, p.longitude),
        None => "Latest coordinates: None".to_string(),
    }
}

/// Sort tracks newest first, for display.
pub fn sort_newest_first(tracks: &mut [TrackSummary]) {
    tracks.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
}

/// UI for the command line: everything goes to the log.
#[derive(Debug, Default)]
pub struct TerminalUi {
    last_status: Option<String>,
}

impl TerminalUi {
    /// Create a terminal UI.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The last status shown.
    #[must_use]
    pub fn last_status(&self) -> Option<&str> {
        self.last_status.as_deref()
    }
}

impl UiController for TerminalUi {
    fn show_status(&mut self, status: &str) {
        if status.starts_with("Error") || status == STATUS_UNSUPPORTED {
            warn!("{status}");
        } else {
            info!("{status}");
        }
        self.last_status = Some(status.to_string());
    }

    fn show_controls(&mut self, controls: &ControlState) {
        debug!(?controls, "Controls updated");
    }

    fn show_coordinates(&mut self, point: Option<&TrackPoint>) {
        info!("{}", format_coordinates(point));
    }

    fn show_tracks(&mut self, tracks: &[TrackSummary]) {
        debug!(count = tracks.len(), "Saved tracks refreshed");
    }
}
