//! The recorder: drives a [`TrackSession`] from a location source and
//! persists finished tracks.
//!
//! [`Recorder`] is the one place where the session meets its collaborators.
//! Position events arrive on the subscription channel and are processed one
//! at a time; store operations are awaited in the order they are issued, so a
//! save followed by a list refresh always sees the saved track.
//!
//! Failures never retry. A location error stops the recording and keeps the
//! buffered points; a store error is logged and shown as a generic message.

use std::fmt;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::export::FileExporter;
use crate::filter::{FilterDecision, DEFAULT_MIN_INTERVAL};
use crate::geolocation::{
    GeolocationError, GeolocationSource, PositionEvent, PositionOptions, Sample,
};
use crate::gpx::{self, GPX_MIME_TYPE};
use crate::session::{ControlState, SessionState, TrackSession};
use crate::storage::TrackStore;
use crate::track::{Track, TrackIdGenerator, TrackSummary};
use crate::ui::{self, UiController};

/// Recorder tuning, usually taken from [`Config`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecorderSettings {
    /// Minimum time between accepted points.
    pub min_interval: Duration,
    /// Options sent with every position request.
    pub options: PositionOptions,
    /// `creator` attribute of exported GPX files.
    pub creator: String,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            min_interval: DEFAULT_MIN_INTERVAL,
            options: PositionOptions::default(),
            creator: gpx::DEFAULT_CREATOR.to_string(),
        }
    }
}

impl RecorderSettings {
    /// Settings from the loaded configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_interval: config.min_interval(),
            options: config.position_options(),
            creator: config.export.creator.clone(),
        }
    }
}

/// Application controller for one recording session.
pub struct Recorder {
    session: TrackSession,
    source: Box<dyn GeolocationSource>,
    store: Option<Box<dyn TrackStore>>,
    ui: Box<dyn UiController>,
    exporter: Box<dyn FileExporter>,
    options: PositionOptions,
    creator: String,
    ids: TrackIdGenerator,
    events: Option<mpsc::Receiver<PositionEvent>>,
    available: bool,
}

impl fmt::Debug for Recorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recorder")
            .field("state", &self.session.state())
            .field("points", &self.session.points().len())
            .field("source", &self.source.name())
            .field("store", &self.store.as_ref().map(|s| s.name()))
            .field("available", &self.available)
            .finish_non_exhaustive()
    }
}

impl Recorder {
    /// Create a recorder.
    ///
    /// `store` is `None` when the track store failed to initialize; recording
    /// still works but every store operation fails with
    /// [`Error::StoreUnavailable`].
    #[must_use]
    pub fn new(
        settings: RecorderSettings,
        source: Box<dyn GeolocationSource>,
        store: Option<Box<dyn TrackStore>>,
        ui: Box<dyn UiController>,
        exporter: Box<dyn FileExporter>,
    ) -> Self {
        let available = source.is_available();
        Self {
            session: TrackSession::new(settings.min_interval),
            source,
            store,
            ui,
            exporter,
            options: settings.options,
            creator: settings.creator,
            ids: TrackIdGenerator::new(),
            events: None,
            available,
        }
    }

    /// The current session.
    #[must_use]
    pub fn session(&self) -> &TrackSession {
        &self.session
    }

    /// Current session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Whether the location source can provide positions.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.available
    }

    /// Controls as they should currently appear.
    #[must_use]
    pub fn controls(&self) -> ControlState {
        ControlState {
            start_enabled: self.available,
            ..self.session.controls()
        }
    }

    /// Report startup problems, render the controls and load the track list.
    pub async fn initialize(&mut self) {
        if !self.available {
            warn!(source = self.source.name(), "Location source unavailable");
            self.ui.show_status(ui::STATUS_UNSUPPORTED);
        }
        self.render();

        if self.store.is_none() {
            self.ui.show_status(ui::STATUS_STORAGE_INIT_FAILED);
            return;
        }
        if let Err(err) = self.refresh_tracks().await {
            debug!(%err, "Initial track list not loaded");
        }
    }

    /// Start recording.
    ///
    /// Requests one immediate fix, then subscribes for updates. A location
    /// failure on either step stops the session and shows the provider's
    /// message; it is not returned as an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GeolocationUnavailable`] if there is no location
    /// source, or [`Error::InvalidTransition`] if already recording.
    pub async fn start(&mut self) -> Result<()> {
        if !self.available {
            self.ui.show_status(ui::STATUS_UNSUPPORTED);
            return Err(Error::GeolocationUnavailable);
        }

        self.session.start()?;
        self.events = None;
        self.ui.show_status(ui::STATUS_RECORDING);
        self.render();

        let options = self.options;
        let first = tokio::time::timeout(options.timeout, self.source.request_once(&options))
            .await
            .unwrap_or_else(|_| Err(GeolocationError::timeout()));
        match first {
            Ok(sample) => {
                self.accept(&sample);
            }
            Err(err) => {
                self.fail(&err);
                return Ok(());
            }
        }

        match self.source.subscribe(&options) {
            Ok(subscription) => {
                debug!(handle = subscription.handle.raw(), "Subscribed to positions");
                self.session.attach_subscription(subscription.handle);
                self.events = Some(subscription.events);
            }
            Err(err) => self.fail(&err),
        }
        Ok(())
    }

    /// Wait for the next event on the active subscription.
    ///
    /// Returns `None` when there is no subscription or the source has
    /// closed it.
    pub async fn next_event(&mut self) -> Option<PositionEvent> {
        let events = self.events.as_mut()?;
        let event = events.recv().await;
        if event.is_none() {
            debug!("Position subscription closed by source");
            self.events = None;
        }
        event
    }

    /// Handle one subscription event.
    ///
    /// Returns the filter decision for a position, or `None` if the sample
    /// was ignored or the event was an error.
    pub fn process_event(&mut self, event: PositionEvent) -> Option<FilterDecision> {
        match event {
            PositionEvent::Position(sample) => self.accept(&sample),
            PositionEvent::Error(err) => {
                self.fail(&err);
                None
            }
        }
    }

    /// Process events until the subscription ends.
    pub async fn run(&mut self) {
        while let Some(event) = self.next_event().await {
            self.process_event(event);
        }
    }

    /// Stop recording, keeping the buffered points.
    ///
    /// Does nothing unless recording.
    pub fn stop(&mut self) {
        if self.session.state() != SessionState::Recording {
            return;
        }

        if let Some(handle) = self.session.stop() {
            self.source.cancel(handle);
        }
        self.events = None;
        self.ui.show_status(ui::STATUS_STOPPED);
        self.render();
    }

    /// Set the name the pending track will be saved under.
    pub fn set_name(&mut self, name: &str) {
        self.session.set_name(name);
        self.render();
    }

    /// Save the stopped recording.
    ///
    /// Returns `Ok(None)` without touching the store when there is nothing to
    /// save: not stopped, no points, or a blank name.
    ///
    /// # Errors
    ///
    /// Returns the store error if the track could not be added. The session
    /// keeps its points so the save can be retried.
    pub async fn save(&mut self) -> Result<Option<Track>> {
        if !self.session.can_save() {
            debug!(state = %self.session.state(), "Nothing to save");
            return Ok(None);
        }

        let Some(store) = self.store.as_deref() else {
            error!("Cannot save track: store unavailable");
            self.ui.show_status(ui::STATUS_SAVE_FAILED);
            return Err(Error::StoreUnavailable);
        };

        let now = Utc::now();
        let id = self.ids.next_id(now);
        let Some(track) = self.session.pending_track(id, now) else {
            return Ok(None);
        };

        if let Err(err) = store.add(&track).await {
            error!(%err, id, "Failed to save track");
            self.ui.show_status(ui::STATUS_SAVE_FAILED);
            return Err(err);
        }

        info!(id, name = %track.name, points = track.len(), "Track saved");
        self.session.finish_save();
        self.render();
        if let Err(err) = self.refresh_tracks().await {
            debug!(%err, "Track list not refreshed after save");
        }
        Ok(Some(track))
    }

    /// Throw away the stopped recording.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] while recording.
    pub fn discard(&mut self) -> Result<()> {
        let was_stopped = self.session.state() == SessionState::Stopped;
        self.session.discard()?;
        if was_stopped {
            self.ui.show_status(ui::STATUS_DISCARDED);
            self.render();
        }
        Ok(())
    }

    /// Reload the stored tracks into the UI, newest first.
    ///
    /// # Errors
    ///
    /// Returns the store error if the tracks could not be read.
    pub async fn refresh_tracks(&mut self) -> Result<Vec<TrackSummary>> {
        let result = match self.store.as_deref() {
            Some(store) => store.get_all().await,
            None => Err(Error::StoreUnavailable),
        };

        let tracks = match result {
            Ok(tracks) => tracks,
            Err(err) => {
                error!(%err, "Failed to load tracks");
                self.ui.show_status(ui::STATUS_LOAD_FAILED);
                return Err(err);
            }
        };

        let mut summaries: Vec<_> = tracks.iter().map(Track::summary).collect();
        ui::sort_newest_first(&mut summaries);
        self.ui.show_tracks(&summaries);
        Ok(summaries)
    }

    /// Fetch one stored track.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TrackNotFound`] for an unknown id, or the store error.
    pub async fn load_track(&mut self, id: i64) -> Result<Track> {
        let result = match self.store.as_deref() {
            Some(store) => store.get(id).await,
            None => Err(Error::StoreUnavailable),
        };

        match result {
            Ok(Some(track)) => Ok(track),
            Ok(None) => {
                warn!(id, "Track not found");
                Err(Error::TrackNotFound { id })
            }
            Err(err) => {
                error!(%err, id, "Failed to load track");
                self.ui.show_status(ui::STATUS_LOAD_FAILED);
                Err(err)
            }
        }
    }

    /// Export a stored track as GPX through the file exporter.
    ///
    /// Returns the file name used.
    ///
    /// # Errors
    ///
    /// Returns an error if the track cannot be loaded, rendered or delivered.
    pub async fn download(&mut self, id: i64) -> Result<String> {
        let track = self.load_track(id).await?;
        let document = gpx::to_gpx(&track, &self.creator)?;
        let filename = gpx::export_filename(&track.name);

        if let Err(err) = self.exporter.export(&filename, &document, GPX_MIME_TYPE) {
            error!(%err, id, filename = %filename, "Failed to export track");
            return Err(err);
        }
        info!(id, filename = %filename, points = track.len(), "Track exported");
        Ok(filename)
    }

    /// Remove a stored track and refresh the list.
    ///
    /// # Errors
    ///
    /// Returns the store error if the track could not be deleted.
    pub async fn delete_track(&mut self, id: i64) -> Result<()> {
        let result = match self.store.as_deref() {
            Some(store) => store.delete(id).await,
            None => Err(Error::StoreUnavailable),
        };

        if let Err(err) = result {
            error!(%err, id, "Failed to delete track");
            self.ui.show_status(ui::STATUS_DELETE_FAILED);
            return Err(err);
        }

        info!(id, "Track deleted");
        if let Err(err) = self.refresh_tracks().await {
            debug!(%err, "Track list not refreshed after delete");
        }
        Ok(())
    }

    fn accept(&mut self, sample: &Sample) -> Option<FilterDecision> {
        let decision = self.session.offer(sample)?;
        trace!(
            latitude = sample.position.latitude,
            longitude = sample.position.longitude,
            ?decision,
            "Sample offered"
        );
        if decision.is_accepted() {
            self.ui.show_coordinates(self.session.latest_point());
        }
        Some(decision)
    }

    fn fail(&mut self, err: &GeolocationError) {
        warn!(code = %err.code, "Location error: {}", err.message);
        if let Some(handle) = self.session.stop() {
            self.source.cancel(handle);
        }
        self.events = None;
        self.ui.show_status(&ui::error_status(&err.message));
        self.render();
    }

    fn render(&mut self) {
        let controls = self.controls();
        self.ui.show_controls(&controls);
        self.ui.show_coordinates(self.session.latest_point());
    }
}
