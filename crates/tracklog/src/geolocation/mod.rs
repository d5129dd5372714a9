//! Location source abstraction.
//!
//! A [`GeolocationSource`] answers one-shot position requests and hands out
//! long-lived subscriptions. A subscription is a channel of
//! [`PositionEvent`]s that may yield any number of fixes or errors until it is
//! cancelled or the source runs dry.
//!
//! - [`JsonLinesSource`]: replays newline-delimited JSON positions from a file
//!   or stdin, either as fast as possible or paced in real time.

mod replay;

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{Error, GeolocationErrorCode};

pub use replay::{JsonLinesSource, Pacing};

/// A raw reading from the location source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Latitude in decimal degrees.
    #[serde(alias = "lat")]
    pub latitude: f64,

    /// Longitude in decimal degrees.
    #[serde(alias = "lon")]
    pub longitude: f64,

    /// Altitude in meters, if the fix has one.
    #[serde(default, alias = "alt", alias = "ele")]
    pub altitude: Option<f64>,

    /// When the fix was taken.
    #[serde(alias = "time")]
    pub timestamp: DateTime<Utc>,
}

/// A position together with the instant it reached the recorder.
///
/// The sampling rate limit runs on `received_at`, not on the fix time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// The reading.
    pub position: Position,
    /// Arrival time.
    pub received_at: DateTime<Utc>,
}

impl Sample {
    /// Stamp a position with the current wall clock.
    #[must_use]
    pub fn received_now(position: Position) -> Self {
        Self {
            position,
            received_at: Utc::now(),
        }
    }
}

/// Options sent with every position request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionOptions {
    /// Ask for the most accurate fix available.
    pub high_accuracy: bool,
    /// Oldest cached fix that may be returned. Zero means always fresh.
    pub maximum_age: Duration,
    /// Upper bound on a single request.
    pub timeout: Duration,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            maximum_age: Duration::ZERO,
            timeout: Duration::from_millis(5000),
        }
    }
}

/// A failure reported by the location source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeolocationError {
    /// Failure kind.
    pub code: GeolocationErrorCode,
    /// Human-readable message from the provider.
    pub message: String,
}

impl GeolocationError {
    /// Create a new error.
    #[must_use]
    pub fn new(code: GeolocationErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// The error used when a request outlives its timeout.
    #[must_use]
    pub fn timeout() -> Self {
        Self::new(GeolocationErrorCode::Timeout, "Timeout expired")
    }
}

impl fmt::Display for GeolocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for GeolocationError {}

impl From<GeolocationError> for Error {
    fn from(err: GeolocationError) -> Self {
        Self::Geolocation {
            code: err.code,
            message: err.message,
        }
    }
}

/// One delivery on a subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum PositionEvent {
    /// A new fix.
    Position(Sample),
    /// The provider failed.
    Error(GeolocationError),
}

/// Identifies a subscription for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

impl SubscriptionHandle {
    /// Wrap a raw handle number.
    #[must_use]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw handle number.
    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// A live subscription: its handle plus the event stream.
#[derive(Debug)]
pub struct Subscription {
    /// Handle passed back to [`GeolocationSource::cancel`].
    pub handle: SubscriptionHandle,
    /// Events in the order the source emits them.
    pub events: mpsc::Receiver<PositionEvent>,
}

/// A provider of device positions.
///
/// Implementors feed fixes into the recorder. A one-shot request resolves
/// once; a subscription keeps delivering until cancelled.
#[async_trait::async_trait]
pub trait GeolocationSource: Send {
    /// The name of this source (for logging).
    fn name(&self) -> &'static str;

    /// Whether this host can provide positions at all.
    fn is_available(&self) -> bool;

    /// Request a single fresh position.
    ///
    /// # Errors
    ///
    /// Returns the provider's error if no position can be produced.
    async fn request_once(
        &mut self,
        options: &PositionOptions,
    ) -> std::result::Result<Sample, GeolocationError>;

    /// Start an ongoing subscription.
    ///
    /// # Errors
    ///
    /// Returns the provider's error if the subscription cannot be set up.
    fn subscribe(
        &mut self,
        options: &PositionOptions,
    ) -> std::result::Result<Subscription, GeolocationError>;

    /// Cancel a subscription. Unknown or already cancelled handles are ignored.
    fn cancel(&mut self, handle: SubscriptionHandle);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_deserialize_long_names() {
        let json = r#"{"latitude": 1.5, "longitude": 2.5, "altitude": 10.0, "timestamp": "2024-01-01T00:00:00Z"}"#;
        let position: Position = serde_json::from_str(json).unwrap();
        assert!((position.latitude - 1.5).abs() < f64::EPSILON);
        assert_eq!(position.altitude, Some(10.0));
    }

    #[test]
    fn test_position_deserialize_short_names() {
        let json = r#"{"lat": 1.5, "lon": 2.5, "time": "2024-01-01T00:00:00.250Z"}"#;
        let position: Position = serde_json::from_str(json).unwrap();
        assert!((position.longitude - 2.5).abs() < f64::EPSILON);
        assert!(position.altitude.is_none());
        assert_eq!(position.timestamp.timestamp_subsec_millis(), 250);
    }

    #[test]
    fn test_position_options_default() {
        let options = PositionOptions::default();
        assert!(options.high_accuracy);
        assert_eq!(options.maximum_age, Duration::ZERO);
        assert_eq!(options.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_geolocation_error_into_crate_error() {
        let err: Error = GeolocationError::new(
            GeolocationErrorCode::PermissionDenied,
            "User denied Geolocation",
        )
        .into();
        assert!(matches!(
            err,
            Error::Geolocation {
                code: GeolocationErrorCode::PermissionDenied,
                ..
            }
        ));
        assert_eq!(err.to_string(), "User denied Geolocation");
    }

    #[test]
    fn test_timeout_error() {
        let err = GeolocationError::timeout();
        assert_eq!(err.code, GeolocationErrorCode::Timeout);
        assert_eq!(err.to_string(), "Timeout expired");
    }

    #[test]
    fn test_subscription_handle_raw() {
        assert_eq!(SubscriptionHandle::new(7).raw(), 7);
    }
}
