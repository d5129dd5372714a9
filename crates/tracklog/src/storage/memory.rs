//! In-process track store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::TrackStore;
use crate::error::{Error, Result};
use crate::track::Track;

/// Track store kept in memory. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryTrackStore {
    tracks: Arc<Mutex<HashMap<i64, Track>>>,
}

impl MemoryTrackStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<i64, Track>>> {
        self.tracks
            .lock()
            .map_err(|_| Error::internal("memory track store lock poisoned"))
    }
}

#[async_trait::async_trait]
impl TrackStore for MemoryTrackStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn add(&self, track: &Track) -> Result<()> {
        track.validate()?;
        let mut tracks = self.lock()?;
        if tracks.contains_key(&track.id) {
            return Err(Error::DuplicateId { id: track.id });
        }
        tracks.insert(track.id, track.clone());
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<Track>> {
        Ok(self.lock()?.values().cloned().collect())
    }

    async fn get(&self, id: i64) -> Result<Option<Track>> {
        Ok(self.lock()?.get(&id).cloned())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        self.lock()?.remove(&id);
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }
}
