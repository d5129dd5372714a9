//! Core track types for tracklog.
//!
//! A [`TrackPoint`] is one accepted fix; a [`Track`] is a named, persisted
//! sequence of them. The serde layout is the persisted record layout:
//! `{ id, name, points: [{lat, lon, ele, time}], date }`.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::geolocation::Position;

/// Format an instant the way every persisted and exported timestamp is written:
/// RFC 3339, millisecond precision, `Z` suffix.
#[must_use]
pub fn format_instant(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Serde adapter writing instants with [`format_instant`].
pub(crate) mod iso8601 {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        instant: &DateTime<Utc>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_instant(instant))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let text = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&text)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// A single recorded position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    /// Latitude in decimal degrees.
    #[serde(rename = "lat")]
    pub latitude: f64,

    /// Longitude in decimal degrees.
    #[serde(rename = "lon")]
    pub longitude: f64,

    /// Elevation in meters, 0 when the source had no altitude.
    #[serde(rename = "ele")]
    pub elevation: f64,

    /// When the fix was taken.
    #[serde(rename = "time", with = "iso8601")]
    pub timestamp: DateTime<Utc>,
}

impl TrackPoint {
    /// Create a point. The timestamp is truncated to whole milliseconds.
    #[must_use]
    pub fn new(latitude: f64, longitude: f64, elevation: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            latitude,
            longitude,
            elevation,
            timestamp: timestamp.trunc_subsecs(3),
        }
    }

    /// Build a point from a raw position; missing altitude becomes 0.
    #[must_use]
    pub fn from_position(position: &Position) -> Self {
        Self::new(
            position.latitude,
            position.longitude,
            position.altitude.unwrap_or(0.0),
            position.timestamp,
        )
    }

    /// Exact coordinate equality, elevation and time ignored.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn same_coordinates(&self, latitude: f64, longitude: f64) -> bool {
        self.latitude == latitude && self.longitude == longitude
    }
}

/// A named, persisted track.
///
/// Always holds at least one point and a non-blank, trimmed name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Creation-time identifier (milliseconds since the Unix epoch).
    pub id: i64,

    /// User-supplied name.
    pub name: String,

    /// Points in chronological order.
    pub points: Vec<TrackPoint>,

    /// When the track was saved.
    #[serde(rename = "date", with = "iso8601")]
    pub created_at: DateTime<Utc>,
}

impl Track {
    /// Create a track, or `None` when the name is blank or there are no points.
    #[must_use]
    pub fn new(
        id: i64,
        name: &str,
        points: Vec<TrackPoint>,
        created_at: DateTime<Utc>,
    ) -> Option<Self> {
        let name = name.trim();
        if name.is_empty() || points.is_empty() {
            return None;
        }

        Some(Self {
            id,
            name: name.to_string(),
            points,
            created_at: created_at.trunc_subsecs(3),
        })
    }

    /// Check the stored-track invariant: a trimmed, non-blank name and at
    /// least one point.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTrack`] naming the broken rule.
    pub fn validate(&self) -> Result<()> {
        let reason = if self.points.is_empty() {
            "no points"
        } else if self.name.trim().is_empty() {
            "blank name"
        } else if self.name.trim() != self.name {
            "name is not trimmed"
        } else {
            return Ok(());
        };
        Err(Error::InvalidTrack {
            id: self.id,
            reason,
        })
    }

    /// Number of points in the track.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the track has no points. Never true for a stored track.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Listing view of this track.
    #[must_use]
    pub fn summary(&self) -> TrackSummary {
        TrackSummary {
            id: self.id,
            name: self.name.clone(),
            created_at: self.created_at,
            point_count: self.points.len(),
        }
    }
}

/// What the saved-tracks list shows for each track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackSummary {
    /// Track id.
    pub id: i64,
    /// Track name.
    pub name: String,
    /// When the track was saved.
    #[serde(rename = "date", with = "iso8601")]
    pub created_at: DateTime<Utc>,
    /// Number of recorded points.
    pub point_count: usize,
}

/// Hands out track ids from the wall clock.
///
/// Ids are the save time in epoch milliseconds, bumped by one when two saves
/// land in the same millisecond so they stay strictly increasing.
#[derive(Debug, Default)]
pub struct TrackIdGenerator {
    last: Option<i64>,
}

impl TrackIdGenerator {
    /// Create a generator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Next id for a track saved at `now`.
    pub fn next_id(&mut self, now: DateTime<Utc>) -> i64 {
        let candidate = now.timestamp_millis();
        let id = match self.last {
            Some(last) if candidate <= last => last + 1,
            _ => candidate,
        };
        self.last = Some(id);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at_millis(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    fn point(lat: f64, lon: f64) -> TrackPoint {
        TrackPoint::new(lat, lon, 0.0, at_millis(1_700_000_000_000))
    }

    #[test]
    fn test_format_instant_uses_millis_and_z() {
        let instant = Utc.with_ymd_and_hms(2024, 5, 1, 6, 30, 0).unwrap();
        assert_eq!(format_instant(&instant), "2024-05-01T06:30:00.000Z");
    }

    #[test]
    fn test_point_from_position_defaults_elevation() {
        let position = Position {
            latitude: 51.5,
            longitude: -0.12,
            altitude: None,
            timestamp: at_millis(1_000),
        };
        let point = TrackPoint::from_position(&position);
        assert!(point.elevation.abs() < f64::EPSILON);
        assert!(point.same_coordinates(51.5, -0.12));
    }

    #[test]
    fn test_point_keeps_altitude() {
        let position = Position {
            latitude: 1.0,
            longitude: 2.0,
            altitude: Some(123.5),
            timestamp: at_millis(1_000),
        };
        let point = TrackPoint::from_position(&position);
        assert!((point.elevation - 123.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_point_truncates_to_millis() {
        let instant = Utc.timestamp_opt(10, 123_456_789).unwrap();
        let point = TrackPoint::new(0.0, 0.0, 0.0, instant);
        assert_eq!(point.timestamp.timestamp_subsec_nanos(), 123_000_000);
    }

    #[test]
    fn test_same_coordinates_is_exact() {
        let p = point(1.0, 1.0);
        assert!(p.same_coordinates(1.0, 1.0));
        assert!(!p.same_coordinates(1.000_000_1, 1.0));
    }

    #[test]
    fn test_track_new_trims_name() {
        let track = Track::new(1, "  Morning Run ", vec![point(1.0, 1.0)], at_millis(5)).unwrap();
        assert_eq!(track.name, "Morning Run");
        assert_eq!(track.len(), 1);
        assert!(!track.is_empty());
    }

    #[test]
    fn test_track_new_rejects_blank_name() {
        assert!(Track::new(1, "   ", vec![point(1.0, 1.0)], at_millis(5)).is_none());
        assert!(Track::new(1, "", vec![point(1.0, 1.0)], at_millis(5)).is_none());
    }

    #[test]
    fn test_validate() {
        let track = Track::new(1, "Run", vec![point(1.0, 1.0)], at_millis(5)).unwrap();
        assert!(track.validate().is_ok());

        let mut empty = track.clone();
        empty.points.clear();
        assert!(matches!(
            empty.validate(),
            Err(Error::InvalidTrack { id: 1, reason: "no points" })
        ));

        let mut blank = track.clone();
        blank.name = "   ".to_string();
        assert!(matches!(
            blank.validate(),
            Err(Error::InvalidTrack { reason: "blank name", .. })
        ));

        let mut padded = track;
        padded.name = " Run ".to_string();
        assert!(padded.validate().is_err());
    }

    #[test]
    fn test_track_new_rejects_empty_points() {
        assert!(Track::new(1, "Run", Vec::new(), at_millis(5)).is_none());
    }

    #[test]
    fn test_track_serializes_to_record_layout() {
        let track = Track::new(42, "Run", vec![point(1.5, 2.5)], at_millis(0)).unwrap();
        let value = serde_json::to_value(&track).unwrap();

        assert_eq!(value["id"], 42);
        assert_eq!(value["name"], "Run");
        assert_eq!(value["date"], "1970-01-01T00:00:00.000Z");
        assert_eq!(value["points"][0]["lat"], 1.5);
        assert_eq!(value["points"][0]["lon"], 2.5);
        assert_eq!(value["points"][0]["ele"], 0.0);
        assert_eq!(value["points"][0]["time"], "2023-11-14T22:13:20.000Z");
    }

    #[test]
    fn test_track_deserializes_from_record_layout() {
        let json = r#"{
            "id": 7,
            "name": "Walk",
            "points": [{"lat": 10.0, "lon": 20.0, "ele": 3.0, "time": "2024-01-01T00:00:00.000Z"}],
            "date": "2024-01-01T00:05:00.000Z"
        }"#;
        let track: Track = serde_json::from_str(json).unwrap();
        assert_eq!(track.id, 7);
        assert_eq!(track.points.len(), 1);
        assert_eq!(
            track.created_at,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 5, 0).unwrap()
        );
    }

    #[test]
    fn test_summary() {
        let track = Track::new(
            3,
            "Loop",
            vec![point(1.0, 1.0), point(2.0, 2.0)],
            at_millis(9),
        )
        .unwrap();
        let summary = track.summary();
        assert_eq!(summary.id, 3);
        assert_eq!(summary.name, "Loop");
        assert_eq!(summary.point_count, 2);
    }

    #[test]
    fn test_id_generator_uses_epoch_millis() {
        let mut ids = TrackIdGenerator::new();
        assert_eq!(ids.next_id(at_millis(1_000)), 1_000);
        assert_eq!(ids.next_id(at_millis(2_000)), 2_000);
    }

    #[test]
    fn test_id_generator_is_strictly_increasing() {
        let mut ids = TrackIdGenerator::new();
        assert_eq!(ids.next_id(at_millis(1_000)), 1_000);
        assert_eq!(ids.next_id(at_millis(1_000)), 1_001);
        // Clock stepped backwards.
        assert_eq!(ids.next_id(at_millis(500)), 1_002);
    }
}
