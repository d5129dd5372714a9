//! Error types for tracklog.
//!
//! This module defines all error types used throughout the tracklog crate,
//! covering the location source, the track store, configuration and export.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Failure codes reported by a location provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeolocationErrorCode {
    /// The user or the platform refused access to the position.
    PermissionDenied,
    /// No fix could be obtained.
    PositionUnavailable,
    /// No fix arrived within the requested timeout.
    Timeout,
}

impl fmt::Display for GeolocationErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PermissionDenied => write!(f, "permission_denied"),
            Self::PositionUnavailable => write!(f, "position_unavailable"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// The main error type for tracklog operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Geolocation Errors ===
    /// No location source is available on this host.
    #[error("geolocation is not supported")]
    GeolocationUnavailable,

    /// A one-shot request or a subscription failed at runtime.
    #[error("{message}")]
    Geolocation {
        /// Kind of failure reported by the provider.
        code: GeolocationErrorCode,
        /// Provider message, shown to the user as-is.
        message: String,
    },

    // === Session Errors ===
    /// A session action was issued in a state that does not allow it.
    #[error("cannot {action} while {from}")]
    InvalidTransition {
        /// State the session was in.
        from: &'static str,
        /// The rejected action.
        action: &'static str,
    },

    // === Storage Errors ===
    /// Failed to open or create the track database.
    #[error("failed to open track store at {path}: {source}")]
    StorageInit {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A track store operation failed.
    #[error("track store operation failed: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    /// The track store failed to initialize earlier and cannot be used.
    #[error("track store is not available")]
    StoreUnavailable,

    /// A track with this id is already stored.
    #[error("track {id} already exists")]
    DuplicateId {
        /// The conflicting id.
        id: i64,
    },

    /// A track breaks the stored-track invariant.
    #[error("invalid track {id}: {reason}")]
    InvalidTrack {
        /// The offending id.
        id: i64,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// No track with this id is stored.
    #[error("track {id} not found")]
    TrackNotFound {
        /// The missing id.
        id: i64,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Writing a GPX document failed.
    #[error("failed to write GPX: {message}")]
    Gpx {
        /// Description of what went wrong.
        message: String,
    },

    /// A stored timestamp could not be parsed.
    #[error("invalid timestamp '{value}': {source}")]
    Timestamp {
        /// The offending text.
        value: String,
        /// The underlying error.
        #[source]
        source: chrono::ParseError,
    },

    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for tracklog operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this error came from the location source.
    #[must_use]
    pub fn is_geolocation_error(&self) -> bool {
        matches!(
            self,
            Self::Geolocation { .. } | Self::GeolocationUnavailable
        )
    }

    /// Check if this error came from the track store.
    #[must_use]
    pub fn is_storage_error(&self) -> bool {
        matches!(
            self,
            Self::StorageInit { .. }
                | Self::StoreUnavailable
                | Self::Storage(_)
                | Self::DatabaseMigration { .. }
                | Self::DuplicateId { .. }
                | Self::InvalidTrack { .. }
                | Self::TrackNotFound { .. }
        )
    }

    /// Process exit status for this error.
    ///
    /// Location source failures exit with 3, track store failures with 4,
    /// everything else with 1.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        if self.is_geolocation_error() {
            3
        } else if self.is_storage_error() {
            4
        } else {
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::GeolocationUnavailable;
        assert_eq!(err.to_string(), "geolocation is not supported");

        let err = Error::internal("test error");
        assert_eq!(err.to_string(), "internal error: test error");
    }

    #[test]
    fn test_geolocation_error_shows_provider_message() {
        let err = Error::from(crate::geolocation::GeolocationError::timeout());
        assert_eq!(err.to_string(), "Timeout expired");
        assert!(err.is_geolocation_error());
        assert!(!err.is_storage_error());
    }

    #[test]
    fn test_geolocation_error_code_display() {
        assert_eq!(
            GeolocationErrorCode::PermissionDenied.to_string(),
            "permission_denied"
        );
        assert_eq!(
            GeolocationErrorCode::PositionUnavailable.to_string(),
            "position_unavailable"
        );
        assert_eq!(GeolocationErrorCode::Timeout.to_string(), "timeout");
    }

    #[test]
    fn test_invalid_transition_display() {
        let err = Error::InvalidTransition {
            from: "recording",
            action: "start",
        };
        assert_eq!(err.to_string(), "cannot start while recording");
    }

    #[test]
    fn test_storage_predicates() {
        assert!(Error::DuplicateId { id: 1 }.is_storage_error());
        assert!(Error::TrackNotFound { id: 1 }.is_storage_error());
        assert!(!Error::GeolocationUnavailable.is_storage_error());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(Error::GeolocationUnavailable.exit_code(), 3);
        assert_eq!(Error::StoreUnavailable.exit_code(), 4);
        assert_eq!(
            Error::InvalidTrack {
                id: 7,
                reason: "no points"
            }
            .exit_code(),
            4
        );
        assert_eq!(Error::internal("bug").exit_code(), 1);
    }

    #[test]
    fn test_invalid_track_display() {
        let err = Error::InvalidTrack {
            id: 7,
            reason: "blank name",
        };
        assert_eq!(err.to_string(), "invalid track 7: blank name");
    }

    #[test]
    fn test_duplicate_id_display() {
        let err = Error::DuplicateId { id: 1_700_000_000_000 };
        assert_eq!(err.to_string(), "track 1700000000000 already exists");
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_rusqlite_error() {
        let result = rusqlite::Connection::open_with_flags(
            "/nonexistent/path/db.sqlite",
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        );
        if let Err(sqlite_err) = result {
            let err: Error = sqlite_err.into();
            assert!(matches!(err, Error::Storage(_)));
        }
    }

    #[test]
    fn test_from_json_error() {
        let json_result: std::result::Result<i32, serde_json::Error> =
            serde_json::from_str("not valid json");
        if let Err(json_err) = json_result {
            let err: Error = json_err.into();
            assert!(matches!(err, Error::Json(_)));
        }
    }

    #[test]
    fn test_config_validation_error_display() {
        let err = Error::ConfigValidation {
            message: "timeout_ms must be greater than 0".to_string(),
        };
        assert!(err.to_string().contains("timeout_ms"));
    }

    #[test]
    fn test_storage_init_error_display() {
        let result = rusqlite::Connection::open_with_flags(
            "/nonexistent/path/db.sqlite",
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        );
        if let Err(sqlite_err) = result {
            let err = Error::StorageInit {
                path: PathBuf::from("/nonexistent/path/db.sqlite"),
                source: sqlite_err,
            };
            assert!(err.to_string().contains("/nonexistent/path/db.sqlite"));
            assert!(err.is_storage_error());
        }
    }
}
