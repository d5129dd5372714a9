//! `SQLite` schema definitions for tracklog.
//!
//! Tracks and their points live in separate tables; a point row is keyed by
//! its track id and its position in the track.

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// SQL statement to create the tracks table.
pub const CREATE_TRACKS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS tracks (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL
)
";

/// SQL statement to create the track points table.
pub const CREATE_POINTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS track_points (
    track_id INTEGER NOT NULL REFERENCES tracks(id),
    seq INTEGER NOT NULL,
    lat REAL NOT NULL,
    lon REAL NOT NULL,
    ele REAL NOT NULL,
    time TEXT NOT NULL,
    PRIMARY KEY (track_id, seq)
)
";

/// SQL statement to create an index on `created_at` for listing.
pub const CREATE_CREATED_AT_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_tracks_created_at ON tracks(created_at DESC)
";

/// Statements for schema version 1.
pub const V1_STATEMENTS: &[&str] = &[CREATE_TRACKS_TABLE, CREATE_POINTS_TABLE];

/// Statements for schema version 2.
pub const V2_STATEMENTS: &[&str] = &[CREATE_CREATED_AT_INDEX];
