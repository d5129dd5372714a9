//! Sample filter for the live position stream.
//!
//! Decides which raw samples become track points. Two rules apply, in order:
//!
//! 1. **Rate limit**: a sample arriving less than `min_interval` after the
//!    last *accepted* sample is dropped. Nothing has been accepted yet on a
//!    fresh filter, so the first sample always passes this rule.
//! 2. **Duplicate fix**: a sample whose latitude and longitude are exactly
//!    equal to the last buffered point is dropped. There is no distance
//!    threshold; this only removes repeated identical fixes.
//!
//! Rejected samples leave the filter untouched, so a run of duplicates does
//! not push the rate-limit window forward.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::trace;

use crate::geolocation::Sample;
use crate::track::TrackPoint;

/// Default minimum time between two accepted points.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(1000);

/// Outcome of offering a sample to the filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    /// The sample was appended to the buffer.
    Accepted,
    /// The sample arrived too soon after the last accepted one.
    RateLimited,
    /// The sample repeats the last buffered coordinates.
    Duplicate,
}

impl FilterDecision {
    /// Whether the sample made it into the buffer.
    #[must_use]
    pub fn is_accepted(self) -> bool {
        self == Self::Accepted
    }
}

/// Rate-limiting, deduplicating filter in front of the point buffer.
#[derive(Debug, Clone)]
pub struct SampleFilter {
    min_interval: Duration,
    last_accepted_at: Option<DateTime<Utc>>,
}

impl Default for SampleFilter {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_INTERVAL)
    }
}

impl SampleFilter {
    /// Create a filter with the given minimum interval.
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_accepted_at: None,
        }
    }

    /// The configured minimum interval.
    #[must_use]
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Arrival time of the last accepted sample, if any.
    #[must_use]
    pub fn last_accepted_at(&self) -> Option<DateTime<Utc>> {
        self.last_accepted_at
    }

    /// Forget the last accepted instant.
    pub fn reset(&mut self) {
        self.last_accepted_at = None;
    }

    /// Offer a sample; on acceptance the point is appended to `buffer`.
    pub fn offer(&mut self, buffer: &mut Vec<TrackPoint>, sample: &Sample) -> FilterDecision {
        let now = sample.received_at;

        if self.within_interval(now) {
            trace!(%now, "Sample rate limited");
            return FilterDecision::RateLimited;
        }

        let position = &sample.position;
        if let Some(last) = buffer.last() {
            if last.same_coordinates(position.latitude, position.longitude) {
                trace!(
                    lat = position.latitude,
                    lon = position.longitude,
                    "Duplicate fix dropped"
                );
                return FilterDecision::Duplicate;
            }
        }

        buffer.push(TrackPoint::from_position(position));
        self.last_accepted_at = Some(now);
        FilterDecision::Accepted
    }

    fn within_interval(&self, now: DateTime<Utc>) -> bool {
        let Some(last) = self.last_accepted_at else {
            return false;
        };
        // A clock that stepped backwards counts as zero elapsed time.
        let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
        elapsed < self.min_interval
    }
}
