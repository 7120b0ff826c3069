//! Client-side cache of room data keyed by room id.

use crate::api::ApiClient;
use crate::error::ApiError;
use crate::model::ApiRoom;
use crate::store::Store;
use async_trait::async_trait;
use log::{debug, error, info};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

#[async_trait]
pub trait RoomFetcher: Send + Sync {
    async fn fetch_room(&self, room_id: &str) -> Result<ApiRoom, ApiError>;
}

#[async_trait]
impl RoomFetcher for ApiClient {
    async fn fetch_room(&self, room_id: &str) -> Result<ApiRoom, ApiError> {
        ApiClient::fetch_room(self, room_id).await
    }
}

/// Receiver of "this room's cached data is stale" signals.
pub trait RoomInvalidator: Send + Sync {
    fn invalidate_room(&self, room_id: &str);
}

#[derive(Clone)]
struct CacheEntry {
    room: Store<Option<ApiRoom>>,
    generation: Arc<AtomicU64>,
}

pub struct RoomDataCache {
    fetcher: Arc<dyn RoomFetcher>,
    entries: Mutex<HashMap<String, CacheEntry>>,
    refetches: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl RoomDataCache {
    pub fn new(fetcher: Arc<dyn RoomFetcher>) -> Arc<Self> {
        Arc::new(RoomDataCache {
            fetcher,
            entries: Mutex::new(HashMap::new()),
            refetches: Mutex::new(HashMap::new()),
        })
    }

    fn cache_entry(&self, room_id: &str) -> CacheEntry {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .entry(room_id.to_string())
            .or_insert_with(|| CacheEntry {
                room: Store::new("room", None),
                generation: Arc::new(AtomicU64::new(0)),
            })
            .clone()
    }

    /// Store holding the room's data, `None` until the first fetch lands.
    pub fn entry(&self, room_id: &str) -> Store<Option<ApiRoom>> {
        self.cache_entry(room_id).room
    }

    /// Fetches the room and publishes the result, unless a later fetch or
    /// insert for the same room started meanwhile. On failure the previous
    /// value is kept.
    pub async fn fetch(&self, room_id: &str) -> Result<ApiRoom, ApiError> {
        let entry = self.cache_entry(room_id);
        let generation = entry.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let room = self.fetcher.fetch_room(room_id).await?;

        // Compared under the store's write lock so a newer result that
        // already landed is never overwritten.
        let published = entry.room.update_if(|current| {
            if entry.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            *current = Some(room.clone());
            true
        });
        if !published {
            debug!("Dropping superseded fetch of room {}", room_id);
        }
        Ok(room)
    }

    /// Seeds the entry without a round trip. Supersedes fetches in flight.
    pub fn insert(&self, room_id: &str, room: ApiRoom) {
        let entry = self.cache_entry(room_id);
        entry.generation.fetch_add(1, Ordering::SeqCst);
        entry.room.set(Some(room));
    }
}

impl RoomInvalidator for Arc<RoomDataCache> {
    fn invalidate_room(&self, room_id: &str) {
        info!("Room {} invalidated, refetching", room_id);

        let cache = Arc::clone(self);
        let id = room_id.to_string();
        let refetch = tokio::spawn(async move {
            if let Err(e) = cache.fetch(&id).await {
                error!("Failed to refetch room {}: {}", id, e);
            }
        });

        let mut refetches = self.refetches.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = refetches.insert(room_id.to_string(), refetch) {
            previous.abort();
        }
    }
}
