//! Track storage for tracklog.
//!
//! [`TrackStore`] is the persistence contract the recorder depends on: a
//! mapping from track id to [`Track`] with add, get, get-all and delete.
//! Two implementations ship with the crate:
//!
//! - [`SqliteTrackStore`]: the persistent store, one `SQLite` file.
//! - [`MemoryTrackStore`]: an in-process map for tests and embedding.

mod memory;
pub mod migrations;
pub mod schema;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::track::{format_instant, Track, TrackPoint};

pub use memory::MemoryTrackStore;

/// Persistent mapping from track id to track.
///
/// Store operations are awaited one at a time by the recorder, so a save
/// followed by a listing observes the saved track.
///
/// Implementations may block the calling thread: [`SqliteTrackStore`] runs
/// its queries inline on the caller's task. Tracks that fail
/// [`Track::validate`] are rejected by `add`.
#[async_trait::async_trait]
pub trait TrackStore: Send + Sync {
    /// The name of this store (for logging).
    fn name(&self) -> &'static str;

    /// Add a new track.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTrack`] for a track with no points or a blank
    /// name, [`Error::DuplicateId`] if a track with the same id exists, or
    /// the underlying storage error.
    async fn add(&self, track: &Track) -> Result<()>;

    /// All stored tracks, in no particular order.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be read.
    async fn get_all(&self) -> Result<Vec<Track>>;

    /// The track with the given id, or `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be read.
    async fn get(&self, id: i64) -> Result<Option<Track>>;

    /// Remove a track. Removing a missing id succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be written.
    async fn delete(&self, id: i64) -> Result<()>;

    /// Number of stored tracks.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage cannot be read.
    async fn count(&self) -> Result<usize>;
}

/// `SQLite`-backed track store.
///
/// Writes are serialized through a single connection.
#[derive(Debug)]
pub struct SqliteTrackStore {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Mutex<Connection>,
}

impl SqliteTrackStore {
    /// Open or create a track database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist,
    /// then brings the schema up to date.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening track database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::StorageInit {
            path: path.clone(),
            source,
        })?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;

        let store = Self::with_connection(path, conn)?;
        info!("Track database opened at {}", store.path.display());
        Ok(store)
    }

    /// Create an in-memory store.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::StorageInit {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Self::with_connection(PathBuf::from(":memory:"), conn)
    }

    fn with_connection(path: PathBuf, mut conn: Connection) -> Result<Self> {
        migrations::initialize_schema(&mut conn)?;
        Ok(Self {
            path,
            conn: Mutex::new(conn),
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::internal("track database lock poisoned"))
    }

    fn insert(conn: &mut Connection, track: &Track) -> Result<()> {
        track.validate()?;
        let tx = conn.transaction()?;

        let exists: Option<i64> = tx
            .query_row("SELECT id FROM tracks WHERE id = ?1", [track.id], |row| {
                row.get(0)
            })
            .optional()?;
        if exists.is_some() {
            return Err(Error::DuplicateId { id: track.id });
        }

        tx.execute(
            "INSERT INTO tracks (id, name, created_at) VALUES (?1, ?2, ?3)",
            params![track.id, track.name, format_instant(&track.created_at)],
        )?;
        {
            let mut stmt = tx.prepare(
                r"
                INSERT INTO track_points (track_id, seq, lat, lon, ele, time)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ",
            )?;
            for (seq, point) in track.points.iter().enumerate() {
                stmt.execute(params![
                    track.id,
                    i64::try_from(seq).unwrap_or(i64::MAX),
                    point.latitude,
                    point.longitude,
                    point.elevation,
                    format_instant(&point.timestamp),
                ])?;
            }
        }
        tx.commit()?;

        debug!(id = track.id, points = track.points.len(), "Inserted track");
        Ok(())
    }

    fn select_one(conn: &Connection, id: i64) -> Result<Option<Track>> {
        let header: Option<(String, String)> = conn
            .query_row(
                "SELECT name, created_at FROM tracks WHERE id = ?1",
                [id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((name, created_at)) = header else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            r"
            SELECT lat, lon, ele, time FROM track_points
            WHERE track_id = ?1 ORDER BY seq
            ",
        )?;
        let rows = stmt
            .query_map([id], Self::row_to_raw_point)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let points = rows
            .into_iter()
            .map(RawPoint::into_point)
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(Track {
            id,
            name,
            points,
            created_at: parse_instant(&created_at)?,
        }))
    }

    fn select_all(conn: &Connection) -> Result<Vec<Track>> {
        let mut stmt = conn.prepare("SELECT id, name, created_at FROM tracks")?;
        let headers = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut points: HashMap<i64, Vec<TrackPoint>> = HashMap::new();
        let mut stmt = conn.prepare(
            "SELECT track_id, lat, lon, ele, time FROM track_points ORDER BY track_id, seq",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    RawPoint {
                        lat: row.get(1)?,
                        lon: row.get(2)?,
                        ele: row.get(3)?,
                        time: row.get(4)?,
                    },
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        for (track_id, raw) in rows {
            points.entry(track_id).or_default().push(raw.into_point()?);
        }

        headers
            .into_iter()
            .map(|(id, name, created_at)| {
                Ok(Track {
                    id,
                    name,
                    points: points.remove(&id).unwrap_or_default(),
                    created_at: parse_instant(&created_at)?,
                })
            })
            .collect()
    }

    fn remove(conn: &mut Connection, id: i64) -> Result<bool> {
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM track_points WHERE track_id = ?1", [id])?;
        let affected = tx.execute("DELETE FROM tracks WHERE id = ?1", [id])?;
        tx.commit()?;
        Ok(affected > 0)
    }

    fn row_to_raw_point(row: &rusqlite::Row) -> rusqlite::Result<RawPoint> {
        Ok(RawPoint {
            lat: row.get(0)?,
            lon: row.get(1)?,
            ele: row.get(2)?,
            time: row.get(3)?,
        })
    }
}

#[async_trait::async_trait]
impl TrackStore for SqliteTrackStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn add(&self, track: &Track) -> Result<()> {
        let mut conn = self.lock()?;
        Self::insert(&mut conn, track)
    }

    async fn get_all(&self) -> Result<Vec<Track>> {
        let conn = self.lock()?;
        Self::select_all(&conn)
    }

    async fn get(&self, id: i64) -> Result<Option<Track>> {
        let conn = self.lock()?;
        Self::select_one(&conn, id)
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let mut conn = self.lock()?;
        if Self::remove(&mut conn, id)? {
            debug!(id, "Deleted track");
        } else {
            debug!(id, "Delete of missing track ignored");
        }
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM tracks", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

/// A point row before its timestamp is parsed.
struct RawPoint {
    lat: f64,
    lon: f64,
    ele: f64,
    time: String,
}

impl RawPoint {
    fn into_point(self) -> Result<TrackPoint> {
        Ok(TrackPoint::new(
            self.lat,
            self.lon,
            self.ele,
            parse_instant(&self.time)?,
        ))
    }
}

fn parse_instant(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|source| Error::Timestamp {
            value: value.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn create_test_store() -> SqliteTrackStore {
        SqliteTrackStore::open_in_memory().expect("failed to create test store")
    }

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_714_545_000_000 + ms).unwrap()
    }

    fn create_test_track(id: i64, name: &str, n: u32) -> Track {
        let points = (0..n)
            .map(|i| {
                let step = f64::from(i);
                TrackPoint::new(48.2 + step * 0.001, 16.37, 170.0 + step, at(i64::from(i) * 1000))
            })
            .collect();
        Track::new(id, name, points, at(60_000)).unwrap()
    }

    #[tokio::test]
    async fn test_add_and_get() {
        let store = create_test_store();
        let track = create_test_track(1, "Morning Run", 3);

        store.add(&track).await.unwrap();
        let loaded = store.get(1).await.unwrap().expect("track should exist");

        assert_eq!(loaded, track);
    }

    #[tokio::test]
    async fn test_add_rejects_invalid_track() {
        let store = create_test_store();
        let invalid = Track {
            id: 7,
            name: "   ".to_string(),
            points: Vec::new(),
            created_at: at(0),
        };

        let err = store.add(&invalid).await.unwrap_err();
        assert!(matches!(err, Error::InvalidTrack { id: 7, .. }));
        assert!(store.get(7).await.unwrap().is_none());
        assert_eq!(store.count().await.unwrap(), 0);

        let mut unnamed = create_test_track(8, "Walk", 2);
        unnamed.name = String::new();
        assert!(store.add(&unnamed).await.is_err());
    }

    #[tokio::test]
    async fn test_add_duplicate_id() {
        let store = create_test_store();
        store.add(&create_test_track(5, "A", 1)).await.unwrap();

        let err = store.add(&create_test_track(5, "B", 2)).await.unwrap_err();
        assert!(matches!(err, Error::DuplicateId { id: 5 }));
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.get(5).await.unwrap().unwrap().name, "A");
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let store = create_test_store();
        assert!(store.get(99_999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_all() {
        let store = create_test_store();
        store.add(&create_test_track(1, "One", 2)).await.unwrap();
        store.add(&create_test_track(2, "Two", 4)).await.unwrap();

        let mut tracks = store.get_all().await.unwrap();
        tracks.sort_by_key(|t| t.id);

        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].points.len(), 2);
        assert_eq!(tracks[1].points.len(), 4);
        assert_eq!(tracks[1], create_test_track(2, "Two", 4));
    }

    #[tokio::test]
    async fn test_get_all_empty() {
        let store = create_test_store();
        assert!(store.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_points_keep_insertion_order() {
        let store = create_test_store();
        let track = create_test_track(1, "Ordered", 12);
        store.add(&track).await.unwrap();

        let loaded = store.get(1).await.unwrap().unwrap();
        let times: Vec<_> = loaded.points.iter().map(|p| p.timestamp).collect();
        let mut sorted = times.clone();
        sorted.sort();
        assert_eq!(times, sorted);
    }

    #[tokio::test]
    async fn test_delete() {
        let store = create_test_store();
        store.add(&create_test_track(1, "Gone", 2)).await.unwrap();

        store.delete(1).await.unwrap();
        assert!(store.get(1).await.unwrap().is_none());
        assert_eq!(store.count().await.unwrap(), 0);

        let orphans: i64 = store
            .lock()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM track_points", [], |row| row.get(0))
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[tokio::test]
    async fn test_delete_nonexistent_succeeds() {
        let store = create_test_store();
        assert!(store.delete(99_999).await.is_ok());
    }

    #[tokio::test]
    async fn test_raw_coordinate_precision_survives() {
        let store = create_test_store();
        let point = TrackPoint::new(48.208_174_912_345_67, 16.373_819_1, 0.0, at(0));
        let track = Track::new(9, "Precise", vec![point], at(1)).unwrap();
        store.add(&track).await.unwrap();

        let loaded = store.get(9).await.unwrap().unwrap();
        assert_eq!(loaded.points[0], point);
    }

    #[tokio::test]
    async fn test_open_file_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("tracks.db");

        {
            let store = SqliteTrackStore::open(&path).unwrap();
            assert_eq!(store.path(), path.as_path());
            store.add(&create_test_track(1, "Kept", 2)).await.unwrap();
        }

        let reopened = SqliteTrackStore::open(&path).unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
    }

    #[test]
    fn test_open_unwritable_path() {
        let result = SqliteTrackStore::open("/proc/tracklog-test/tracks.db");
        assert!(result.is_err());
    }

    #[test]
    fn test_path_in_memory() {
        let store = create_test_store();
        assert_eq!(store.path().to_string_lossy(), ":memory:");
    }
}
