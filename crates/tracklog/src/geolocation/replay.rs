//! Replay of recorded positions from newline-delimited JSON.
//!
//! Each non-blank line is one [`Position`] object, for example
//! `{"lat": 48.2, "lon": 16.37, "ele": 170.0, "time": "2024-05-01T06:30:00Z"}`.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::{
    GeolocationError, GeolocationSource, Position, PositionEvent, PositionOptions, Sample,
    Subscription, SubscriptionHandle,
};
use crate::error::{Error, GeolocationErrorCode, Result};

/// Events buffered between the replay task and the recorder.
const SUBSCRIPTION_BUFFER: usize = 64;

type LineReader = Lines<BufReader<Box<dyn AsyncRead + Send + Unpin>>>;

/// How replayed positions are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pacing {
    /// Deliver immediately; each fix arrives at its own timestamp.
    #[default]
    Instant,
    /// Sleep between fixes by their timestamp gaps; arrival is the wall clock.
    RealTime,
}

impl Pacing {
    fn stamp(self, position: Position) -> Sample {
        match self {
            Self::Instant => Sample {
                position,
                received_at: position.timestamp,
            },
            Self::RealTime => Sample::received_now(position),
        }
    }
}

/// Location source replaying JSON lines from a file, stdin or any reader.
///
/// The input can be consumed once. A position read by
/// [`request_once`](GeolocationSource::request_once) is delivered again as the
/// first event of the next subscription.
pub struct JsonLinesSource {
    label: String,
    reader: Option<LineReader>,
    line_no: usize,
    pacing: Pacing,
    pending: Option<Position>,
    next_handle: u64,
    tasks: HashMap<SubscriptionHandle, JoinHandle<()>>,
}

impl fmt::Debug for JsonLinesSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonLinesSource")
            .field("label", &self.label)
            .field("line_no", &self.line_no)
            .field("pacing", &self.pacing)
            .field("exhausted", &self.reader.is_none())
            .field("subscriptions", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

impl JsonLinesSource {
    /// Replay positions from any async reader.
    pub fn from_reader<R>(reader: R, pacing: Pacing, label: impl Into<String>) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let boxed: Box<dyn AsyncRead + Send + Unpin> = Box::new(reader);
        Self {
            label: label.into(),
            reader: Some(BufReader::new(boxed).lines()),
            line_no: 0,
            pacing,
            pending: None,
            next_handle: 1,
            tasks: HashMap::new(),
        }
    }

    /// Replay positions from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn from_path(path: impl AsRef<Path>, pacing: Pacing) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(Error::Io)?;
        Ok(Self::from_reader(
            tokio::fs::File::from_std(file),
            pacing,
            path.display().to_string(),
        ))
    }

    /// Replay positions piped on stdin.
    #[must_use]
    pub fn from_stdin(pacing: Pacing) -> Self {
        Self::from_reader(tokio::io::stdin(), pacing, "<stdin>")
    }
}

impl Drop for JsonLinesSource {
    fn drop(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }
}

#[async_trait::async_trait]
impl GeolocationSource for JsonLinesSource {
    fn name(&self) -> &'static str {
        "json-lines"
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn request_once(
        &mut self,
        _options: &PositionOptions,
    ) -> std::result::Result<Sample, GeolocationError> {
        if let Some(position) = self.pending {
            return Ok(self.pacing.stamp(position));
        }

        let Some(reader) = self.reader.as_mut() else {
            return Err(input_consumed());
        };

        match next_position(reader, &mut self.line_no).await? {
            Some(position) => {
                self.pending = Some(position);
                Ok(self.pacing.stamp(position))
            }
            None => Err(GeolocationError::new(
                GeolocationErrorCode::PositionUnavailable,
                format!("no position available from {}", self.label),
            )),
        }
    }

    fn subscribe(
        &mut self,
        _options: &PositionOptions,
    ) -> std::result::Result<Subscription, GeolocationError> {
        let Some(reader) = self.reader.take() else {
            return Err(input_consumed());
        };

        let handle = SubscriptionHandle::new(self.next_handle);
        self.next_handle += 1;

        let (tx, events) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let task = tokio::spawn(replay(
            reader,
            self.line_no,
            self.pending.take(),
            self.pacing,
            tx,
        ));
        self.tasks.insert(handle, task);

        debug!(source = %self.label, handle = handle.raw(), "Subscribed to positions");
        Ok(Subscription { handle, events })
    }

    fn cancel(&mut self, handle: SubscriptionHandle) {
        if let Some(task) = self.tasks.remove(&handle) {
            task.abort();
            debug!(handle = handle.raw(), "Cancelled position subscription");
        }
    }
}

fn input_consumed() -> GeolocationError {
    GeolocationError::new(
        GeolocationErrorCode::PositionUnavailable,
        "position input already consumed",
    )
}

/// Read the next position, skipping blank lines.
async fn next_position(
    reader: &mut LineReader,
    line_no: &mut usize,
) -> std::result::Result<Option<Position>, GeolocationError> {
    loop {
        let line = reader.next_line().await.map_err(|e| {
            GeolocationError::new(GeolocationErrorCode::PositionUnavailable, e.to_string())
        })?;
        let Some(line) = line else {
            return Ok(None);
        };
        *line_no += 1;

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        return serde_json::from_str(line).map(Some).map_err(|e| {
            GeolocationError::new(
                GeolocationErrorCode::PositionUnavailable,
                format!("invalid position on line {line_no}: {e}"),
            )
        });
    }
}

async fn replay(
    mut reader: LineReader,
    mut line_no: usize,
    pending: Option<Position>,
    pacing: Pacing,
    tx: mpsc::Sender<PositionEvent>,
) {
    let mut previous: Option<DateTime<Utc>> = None;

    if let Some(position) = pending {
        if !emit(&tx, position, pacing, &mut previous).await {
            return;
        }
    }

    loop {
        match next_position(&mut reader, &mut line_no).await {
            Ok(Some(position)) => {
                if !emit(&tx, position, pacing, &mut previous).await {
                    return;
                }
            }
            Ok(None) => {
                debug!(lines = line_no, "Position input exhausted");
                return;
            }
            Err(err) => {
                let _ = tx.send(PositionEvent::Error(err)).await;
                return;
            }
        }
    }
}

/// Send one fix, pacing it first. Returns `false` once the receiver is gone.
async fn emit(
    tx: &mpsc::Sender<PositionEvent>,
    position: Position,
    pacing: Pacing,
    previous: &mut Option<DateTime<Utc>>,
) -> bool {
    if pacing == Pacing::RealTime {
        if let Some(prev) = *previous {
            let gap = (position.timestamp - prev).to_std().unwrap_or_default();
            tokio::time::sleep(gap).await;
        }
    }
    *previous = Some(position.timestamp);

    trace!(
        lat = position.latitude,
        lon = position.longitude,
        "Replaying position"
    );
    tx.send(PositionEvent::Position(pacing.stamp(position)))
        .await
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const TWO_FIXES: &str = concat!(
        r#"{"lat": 1.0, "lon": 1.0, "time": "2024-01-01T00:00:00Z"}"#,
        "\n\n",
        r#"{"latitude": 2.0, "longitude": 2.0, "altitude": 5.0, "timestamp": "2024-01-01T00:00:02Z"}"#,
        "\n",
    );

    fn source(input: &str) -> JsonLinesSource {
        JsonLinesSource::from_reader(
            Cursor::new(input.as_bytes().to_vec()),
            Pacing::Instant,
            "test",
        )
    }

    async fn drain(mut subscription: Subscription) -> Vec<PositionEvent> {
        let mut events = Vec::new();
        while let Some(event) = subscription.events.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_subscription_replays_all_lines() {
        let mut source = source(TWO_FIXES);
        let subscription = source.subscribe(&PositionOptions::default()).unwrap();
        let events = drain(subscription).await;

        assert_eq!(events.len(), 2);
        match &events[1] {
            PositionEvent::Position(sample) => {
                assert_eq!(sample.position.altitude, Some(5.0));
                assert_eq!(sample.received_at, sample.position.timestamp);
            }
            PositionEvent::Error(err) => panic!("unexpected error: {err}"),
        }
    }

    #[tokio::test]
    async fn test_request_once_is_replayed_on_subscribe() {
        let mut source = source(TWO_FIXES);
        let options = PositionOptions::default();

        let first = source.request_once(&options).await.unwrap();
        assert!((first.position.latitude - 1.0).abs() < f64::EPSILON);
        // Asking again before subscribing returns the same fix.
        let again = source.request_once(&options).await.unwrap();
        assert_eq!(first, again);

        let events = drain(source.subscribe(&options).unwrap()).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], PositionEvent::Position(first));
    }

    #[tokio::test]
    async fn test_malformed_line_ends_with_error() {
        let input = format!("{}\nnot json\n", TWO_FIXES.lines().next().unwrap());
        let mut source = source(&input);
        let events = drain(source.subscribe(&PositionOptions::default()).unwrap()).await;

        assert_eq!(events.len(), 2);
        match &events[1] {
            PositionEvent::Error(err) => {
                assert_eq!(err.code, GeolocationErrorCode::PositionUnavailable);
                assert!(err.message.contains("line 2"));
            }
            PositionEvent::Position(_) => panic!("expected an error event"),
        }
    }

    #[tokio::test]
    async fn test_request_once_on_empty_input() {
        let mut source = source("");
        let err = source
            .request_once(&PositionOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, GeolocationErrorCode::PositionUnavailable);
    }

    #[tokio::test]
    async fn test_second_subscribe_fails() {
        let mut source = source(TWO_FIXES);
        let options = PositionOptions::default();
        let _first = source.subscribe(&options).unwrap();
        assert!(source.subscribe(&options).is_err());
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let mut source = source(TWO_FIXES);
        let subscription = source.subscribe(&PositionOptions::default()).unwrap();
        source.cancel(subscription.handle);
        source.cancel(subscription.handle);
        source.cancel(SubscriptionHandle::new(99));
    }

    #[tokio::test]
    async fn test_from_path_missing_file() {
        let result = JsonLinesSource::from_path("/nonexistent/positions.jsonl", Pacing::Instant);
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn test_realtime_pacing_stamps_wall_clock() {
        let input = concat!(
            r#"{"lat": 1.0, "lon": 1.0, "time": "2024-01-01T00:00:00.000Z"}"#,
            "\n",
            r#"{"lat": 2.0, "lon": 2.0, "time": "2024-01-01T00:00:00.050Z"}"#,
            "\n",
        );
        let mut source = JsonLinesSource::from_reader(
            Cursor::new(input.as_bytes().to_vec()),
            Pacing::RealTime,
            "test",
        );
        let events = drain(source.subscribe(&PositionOptions::default()).unwrap()).await;
        assert_eq!(events.len(), 2);
        if let PositionEvent::Position(sample) = &events[0] {
            assert_ne!(sample.received_at, sample.position.timestamp);
        }
    }
}
