//! Schema versioning for the track database.
//!
//! The version lives in the `metadata` table. Each migration runs inside its
//! own transaction together with the version bump, so a failed step leaves the
//! database at the previous version.

use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use crate::error::{Error, Result};

use super::schema::{CREATE_METADATA_TABLE, V1_STATEMENTS, V2_STATEMENTS};

/// Key used to store the schema version in the metadata table.
const VERSION_KEY: &str = "schema_version";

/// Ordered migration steps. Step `n` brings the schema to version `n + 1`.
const MIGRATIONS: &[&[&str]] = &[V1_STATEMENTS, V2_STATEMENTS];

/// The schema version this build writes.
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub const CURRENT_VERSION: i32 = MIGRATIONS.len() as i32;

/// Bring the schema up to [`CURRENT_VERSION`].
///
/// # Errors
///
/// Returns an error if the database was written by a newer build or a
/// migration step fails.
pub fn initialize_schema(conn: &mut Connection) -> Result<()> {
    conn.execute(CREATE_METADATA_TABLE, [])?;

    let version = schema_version(conn)?;
    if version > CURRENT_VERSION {
        return Err(Error::DatabaseMigration {
            message: format!(
                "database schema version {version} is newer than supported version {CURRENT_VERSION}"
            ),
        });
    }

    for target in (version + 1)..=CURRENT_VERSION {
        migrate_to(conn, target)?;
    }

    Ok(())
}

/// Read the schema version; 0 for a fresh database.
pub fn schema_version(conn: &Connection) -> Result<i32> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM metadata WHERE key = ?1",
            [VERSION_KEY],
            |row| row.get(0),
        )
        .optional()?;

    match value {
        None => Ok(0),
        Some(value) => value.parse().map_err(|_| Error::DatabaseMigration {
            message: format!("invalid schema version: {value}"),
        }),
    }
}

fn migrate_to(conn: &mut Connection, target: i32) -> Result<()> {
    let statements = usize::try_from(target - 1)
        .ok()
        .and_then(|idx| MIGRATIONS.get(idx))
        .ok_or_else(|| Error::DatabaseMigration {
            message: format!("unknown migration version: {target}"),
        })?;

    let tx = conn.transaction()?;
    for statement in *statements {
        tx.execute(statement, [])?;
    }
    tx.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
        (VERSION_KEY, target.to_string()),
    )?;
    tx.commit()?;

    info!(version = target, "Migrated track database");
    Ok(())
}
