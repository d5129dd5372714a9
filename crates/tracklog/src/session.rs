//! The recording session state machine.
//!
//! ```text
//!            start                 stop / error
//!   Idle ─────────────► Recording ───────────────► Stopped
//!    ▲                                               │ │
//!    │          save (name + points) / delete        │ │ start
//!    └───────────────────────────────────────────────┘ └──────► Recording
//! ```
//!
//! The session owns the point buffer; nothing else mutates it. It performs no
//! I/O: the recorder drives it and talks to the location source and the store.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::filter::{FilterDecision, SampleFilter};
use crate::geolocation::{Sample, SubscriptionHandle};
use crate::track::{Track, TrackPoint};

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// Nothing recorded or everything saved/discarded.
    #[default]
    Idle,
    /// Accepting samples from the location source.
    Recording,
    /// Recording ended; the buffer may hold unsaved points.
    Stopped,
}

impl SessionState {
    fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Recording => "recording",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Visibility and enablement of the recording controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct ControlState {
    /// The start control is shown.
    pub start_visible: bool,
    /// The start control can be used.
    pub start_enabled: bool,
    /// The stop control is shown.
    pub stop_visible: bool,
    /// The name input and save control are shown.
    pub save_controls_visible: bool,
    /// The save control can be used.
    pub save_enabled: bool,
    /// The delete control is shown.
    pub delete_visible: bool,
}

/// The single in-progress recording.
#[derive(Debug)]
pub struct TrackSession {
    state: SessionState,
    points: Vec<TrackPoint>,
    name: String,
    filter: SampleFilter,
    subscription: Option<SubscriptionHandle>,
}

impl Default for TrackSession {
    fn default() -> Self {
        Self::new(crate::filter::DEFAULT_MIN_INTERVAL)
    }
}

impl TrackSession {
    /// Create an idle session with the given sampling interval.
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            state: SessionState::Idle,
            points: Vec::new(),
            name: String::new(),
            filter: SampleFilter::new(min_interval),
            subscription: None,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Buffered points, oldest first.
    #[must_use]
    pub fn points(&self) -> &[TrackPoint] {
        &self.points
    }

    /// Most recently accepted point.
    #[must_use]
    pub fn latest_point(&self) -> Option<&TrackPoint> {
        self.points.last()
    }

    /// The pending track name, as typed.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The active subscription, while recording.
    #[must_use]
    pub fn subscription(&self) -> Option<SubscriptionHandle> {
        self.subscription
    }

    /// Begin a new recording, dropping any unsaved points and name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] if already recording.
    pub fn start(&mut self) -> Result<()> {
        if self.state == SessionState::Recording {
            return Err(Error::InvalidTransition {
                from: self.state.as_str(),
                action: "start",
            });
        }

        if !self.points.is_empty() {
            debug!(points = self.points.len(), "Dropping unsaved points");
        }
        self.clear();
        self.state = SessionState::Recording;
        info!("Recording started");
        Ok(())
    }

    /// Remember the subscription feeding this recording.
    pub fn attach_subscription(&mut self, handle: SubscriptionHandle) {
        self.subscription = Some(handle);
    }

    /// Offer a sample to the filter.
    ///
    /// Returns `None` when not recording; late samples are dropped.
    pub fn offer(&mut self, sample: &Sample) -> Option<FilterDecision> {
        if self.state != SessionState::Recording {
            debug!(state = %self.state, "Ignoring sample outside of recording");
            return None;
        }
        Some(self.filter.offer(&mut self.points, sample))
    }

    /// Stop recording and keep the buffer.
    ///
    /// Returns the subscription to cancel, if any. Calling this when not
    /// recording does nothing.
    pub fn stop(&mut self) -> Option<SubscriptionHandle> {
        if self.state != SessionState::Recording {
            return None;
        }

        self.state = SessionState::Stopped;
        info!(points = self.points.len(), "Recording stopped");
        self.subscription.take()
    }

    /// Set the name the track will be saved under.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Whether a save would go through right now.
    #[must_use]
    pub fn can_save(&self) -> bool {
        self.state == SessionState::Stopped
            && !self.points.is_empty()
            && !self.name.trim().is_empty()
    }

    /// Build the track a save would persist, without changing the session.
    ///
    /// `None` when [`can_save`](Self::can_save) is false.
    #[must_use]
    pub fn pending_track(&self, id: i64, created_at: DateTime<Utc>) -> Option<Track> {
        if !self.can_save() {
            return None;
        }
        Track::new(id, &self.name, self.points.clone(), created_at)
    }

    /// Mark the pending track as persisted: clear everything, back to idle.
    pub fn finish_save(&mut self) {
        self.clear();
        self.state = SessionState::Idle;
    }

    /// Throw away a stopped recording without saving it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] while recording.
    pub fn discard(&mut self) -> Result<()> {
        match self.state {
            SessionState::Recording => Err(Error::InvalidTransition {
                from: self.state.as_str(),
                action: "delete",
            }),
            SessionState::Idle => Ok(()),
            SessionState::Stopped => {
                info!(points = self.points.len(), "Discarding unsaved track");
                self.clear();
                self.state = SessionState::Idle;
                Ok(())
            }
        }
    }

    /// Controls as they should currently appear.
    #[must_use]
    pub fn controls(&self) -> ControlState {
        let unsaved = self.state == SessionState::Stopped && !self.points.is_empty();
        ControlState {
            start_visible: self.state != SessionState::Recording,
            start_enabled: true,
            stop_visible: self.state == SessionState::Recording,
            save_controls_visible: unsaved,
            save_enabled: self.can_save(),
            delete_visible: unsaved,
        }
    }

    fn clear(&mut self) {
        self.points.clear();
        self.name.clear();
        self.filter.reset();
        self.subscription = None;
    }
}
