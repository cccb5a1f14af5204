//! Durable favorites, deduplicated by image content.
//!
//! All reads and writes of the favorites key go through [`FavoritesStore`].
//! The collection behaves as a set keyed by payload bytes: favoriting an image
//! that is already present removes it instead.

use crate::events::{AppEvent, EventBus};
use crate::payload::base64_bytes;
use crate::storage::{KeyValueStore, StorageError, FAVORITES_KEY};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteRecord {
    pub id: String,
    #[serde(with = "base64_bytes")]
    pub image_data: Vec<u8>,
    #[serde(rename = "timestamp", with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToggleOutcome {
    Added,
    Removed,
}

#[derive(Debug, Error)]
pub enum FavoriteError {
    #[error("could not save favorites: {0}")]
    Storage(#[from] StorageError),
    #[error("favorite not found: {0}")]
    NotFound(String),
}

pub struct FavoritesStore {
    store: Arc<dyn KeyValueStore>,
    bus: EventBus,
    records: Mutex<Vec<FavoriteRecord>>,
}

impl FavoritesStore {
    /// Opens the store and loads whatever is currently persisted.
    pub fn new(store: Arc<dyn KeyValueStore>, bus: EventBus) -> Self {
        let records = read_persisted(store.as_ref());
        Self {
            store,
            bus,
            records: Mutex::new(records),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<FavoriteRecord>>, FavoriteError> {
        self.records.lock().map_err(|_| {
            FavoriteError::Storage(StorageError::Backend(
                "favorites lock poisoned".to_string(),
            ))
        })
    }

    /// Favorites sorted newest first.
    pub fn list(&self) -> Vec<FavoriteRecord> {
        let mut records = self.lock().map(|records| records.clone()).unwrap_or_default();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records
    }

    pub fn len(&self) -> usize {
        self.lock().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_favorite(&self, payload: &[u8]) -> bool {
        self.lock()
            .map(|records| records.iter().any(|record| record.image_data == payload))
            .unwrap_or(false)
    }

    /// Adds the image if absent from the persisted collection, removes it if
    /// present.
    ///
    /// When saving an addition fails, the new record is dropped and the
    /// previous collection is written back once. The caller gets the error
    /// either way.
    pub fn toggle_favorite(&self, payload: &[u8]) -> Result<ToggleOutcome, FavoriteError> {
        let mut records = self.lock()?;
        *records = read_persisted(self.store.as_ref());

        if let Some(position) = records.iter().position(|record| record.image_data == payload) {
            let mut updated = records.clone();
            let removed = updated.remove(position);
            self.write(&updated)?;
            *records = updated;
            drop(records);
            log::info!("Removed favorite {}", removed.id);
            self.bus.publish(AppEvent::FavoritesChanged);
            return Ok(ToggleOutcome::Removed);
        }

        let record = FavoriteRecord {
            id: uuid::Uuid::new_v4().to_string(),
            image_data: payload.to_vec(),
            created_at: Utc::now().trunc_subsecs(3),
        };
        let mut updated = records.clone();
        updated.push(record);

        if let Err(error) = self.write(&updated) {
            let evicted = updated.pop();
            log::warn!(
                "Saving favorite {} failed ({}); evicting it and retrying",
                evicted.as_ref().map(|r| r.id.as_str()).unwrap_or("?"),
                error
            );
            match self.write(&updated) {
                Ok(()) => *records = updated,
                Err(retry_error) => {
                    log::warn!("Retry without the new favorite also failed: {}", retry_error);
                    *records = read_persisted(self.store.as_ref());
                }
            }
            return Err(FavoriteError::Storage(error));
        }

        *records = updated;
        drop(records);
        log::info!("Added favorite ({} bytes)", payload.len());
        self.bus.publish(AppEvent::FavoritesChanged);
        Ok(ToggleOutcome::Added)
    }

    pub fn remove_favorite(&self, id: &str) -> Result<FavoriteRecord, FavoriteError> {
        self.remove_where(|record| record.id == id)
            .and_then(|removed| removed.ok_or_else(|| FavoriteError::NotFound(id.to_string())))
    }

    /// Removes the favorite holding this exact image, if any.
    pub fn remove_by_payload(&self, payload: &[u8]) -> Result<Option<FavoriteRecord>, FavoriteError> {
        self.remove_where(|record| record.image_data == payload)
    }

    fn remove_where(
        &self,
        predicate: impl Fn(&FavoriteRecord) -> bool,
    ) -> Result<Option<FavoriteRecord>, FavoriteError> {
        let mut records = self.lock()?;
        *records = read_persisted(self.store.as_ref());
        let Some(position) = records.iter().position(|record| predicate(record)) else {
            return Ok(None);
        };

        let mut updated = records.clone();
        let removed = updated.remove(position);
        if let Err(error) = self.write(&updated) {
            *records = read_persisted(self.store.as_ref());
            return Err(error.into());
        }
        *records = updated;
        drop(records);

        self.bus.publish(AppEvent::FavoritesChanged);
        Ok(Some(removed))
    }

    pub fn clear_all(&self) -> Result<(), FavoriteError> {
        let mut records = self.lock()?;
        *records = read_persisted(self.store.as_ref());
        if let Err(error) = self.write(&[]) {
            *records = read_persisted(self.store.as_ref());
            return Err(error.into());
        }
        records.clear();
        drop(records);

        log::info!("Cleared all favorites");
        self.bus.publish(AppEvent::FavoritesChanged);
        Ok(())
    }

    /// Replaces the in-memory copy with what is persisted now.
    pub fn reload(&self) -> Result<(), FavoriteError> {
        let fresh = read_persisted(self.store.as_ref());
        *self.lock()? = fresh;
        Ok(())
    }

    /// Reloads when another instance changed the favorites key. Returns
    /// whether the event was relevant.
    pub fn handle_storage_change(&self, key: &str) -> bool {
        if key != FAVORITES_KEY {
            return false;
        }
        match self.reload() {
            Ok(()) => {
                log::debug!("Reloaded favorites after external change");
                self.bus.publish(AppEvent::FavoritesChanged);
            }
            Err(error) => log::warn!("Failed to reload favorites: {}", error),
        }
        true
    }

    fn write(&self, records: &[FavoriteRecord]) -> Result<(), StorageError> {
        let json = serde_json::to_string(records)
            .map_err(|error| StorageError::Serialization(error.to_string()))?;
        self.store.set(FAVORITES_KEY, &json)
    }
}

/// Keeps `favorites` in step with writes made by other instances.
pub fn spawn_sync(favorites: Arc<FavoritesStore>) -> tokio::task::JoinHandle<()> {
    let mut rx = favorites.bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(AppEvent::StorageChanged { key }) => {
                    favorites.handle_storage_change(&key);
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("Favorites sync lagged by {} events; reloading", skipped);
                    favorites.handle_storage_change(FAVORITES_KEY);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Absent, empty, `null`, and unreadable values all read as no favorites.
/// Unreadable values are removed so they do not linger.
fn read_persisted(store: &dyn KeyValueStore) -> Vec<FavoriteRecord> {
    let raw = match store.get(FAVORITES_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Vec::new(),
        Err(error) => {
            log::warn!("Failed to read favorites: {}", error);
            return Vec::new();
        }
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Vec::new();
    }

    match serde_json::from_str::<Option<Vec<FavoriteRecord>>>(trimmed) {
        Ok(records) => records.unwrap_or_default(),
        Err(error) => {
            log::warn!("Discarding corrupt favorites value: {}", error);
            if let Err(error) = store.remove(FAVORITES_KEY) {
                log::warn!("Failed to clear corrupt favorites value: {}", error);
            }
            Vec::new()
        }
    }
}
