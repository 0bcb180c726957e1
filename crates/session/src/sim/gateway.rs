use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use shadow_core::clip::Clip;
use shadow_core::gateway::{GatewayError, SessionGateway};
use shadow_core::recording::{storage_key, AudioBlob, Recording};
use shadow_core::types::{DbId, Timestamp};
use tokio::sync::Mutex;

/// One row of practice history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PracticeEntry {
    pub user_id: DbId,
    pub clip_id: DbId,
    pub at: Timestamp,
}

#[derive(Debug, Default)]
struct Store {
    clips: HashMap<DbId, Clip>,
    /// Keyed by storage path, so a second save overwrites the first.
    recordings: HashMap<String, (Recording, AudioBlob)>,
    history: Vec<PracticeEntry>,
    streaks: HashMap<DbId, u32>,
    favorites: HashSet<(DbId, DbId)>,
    failing_saves: u32,
    unreachable: bool,
    urls_issued: u32,
}

/// Gateway backed by in-memory maps.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    store: Mutex<Store>,
}

impl MemoryGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn insert_clip(&self, clip: Clip) {
        self.store.lock().await.clips.insert(clip.id, clip);
    }

    /// Fail the next `count` uploads with a network error.
    pub async fn fail_next_saves(&self, count: u32) {
        self.store.lock().await.failing_saves = count;
    }

    /// Fail every call until switched back.
    pub async fn set_unreachable(&self, unreachable: bool) {
        self.store.lock().await.unreachable = unreachable;
    }

    pub async fn recording_count(&self) -> usize {
        self.store.lock().await.recordings.len()
    }

    pub async fn stored_recording(&self, user_id: DbId, clip_id: DbId) -> Option<(Recording, AudioBlob)> {
        self.store
            .lock()
            .await
            .recordings
            .get(&storage_key(user_id, clip_id))
            .cloned()
    }

    pub async fn history(&self) -> Vec<PracticeEntry> {
        self.store.lock().await.history.clone()
    }

    pub async fn streak(&self, user_id: DbId) -> u32 {
        self.store.lock().await.streaks.get(&user_id).copied().unwrap_or(0)
    }

    pub async fn is_favorite(&self, user_id: DbId, clip_id: DbId) -> bool {
        self.store.lock().await.favorites.contains(&(user_id, clip_id))
    }

    pub async fn urls_issued(&self) -> u32 {
        self.store.lock().await.urls_issued
    }
}

fn check_reachable(store: &Store) -> Result<(), GatewayError> {
    if store.unreachable {
        return Err(GatewayError::Network("gateway unreachable".to_string()));
    }
    Ok(())
}

#[async_trait]
impl SessionGateway for MemoryGateway {
    async fn get_clip(&self, clip_id: DbId) -> Result<Clip, GatewayError> {
        let store = self.store.lock().await;
        check_reachable(&store)?;
        store
            .clips
            .get(&clip_id)
            .cloned()
            .ok_or(GatewayError::NotFound {
                entity: "clip",
                id: clip_id,
            })
    }

    async fn get_recording(
        &self,
        user_id: DbId,
        clip_id: DbId,
    ) -> Result<Option<Recording>, GatewayError> {
        let store = self.store.lock().await;
        check_reachable(&store)?;
        Ok(store
            .recordings
            .get(&storage_key(user_id, clip_id))
            .map(|(recording, _)| recording.clone()))
    }

    async fn save_recording(
        &self,
        user_id: DbId,
        clip_id: DbId,
        audio: AudioBlob,
    ) -> Result<Recording, GatewayError> {
        let mut store = self.store.lock().await;
        check_reachable(&store)?;
        if store.failing_saves > 0 {
            store.failing_saves -= 1;
            return Err(GatewayError::Network("upload interrupted".to_string()));
        }
        let storage_path = storage_key(user_id, clip_id);
        let recording = Recording {
            user_id,
            clip_id,
            storage_path: storage_path.clone(),
            created_at: Utc::now(),
        };
        store
            .recordings
            .insert(storage_path, (recording.clone(), audio));
        Ok(recording)
    }

    async fn delete_recording(&self, user_id: DbId, clip_id: DbId) -> Result<(), GatewayError> {
        let mut store = self.store.lock().await;
        check_reachable(&store)?;
        store.recordings.remove(&storage_key(user_id, clip_id));
        Ok(())
    }

    async fn signed_playback_url(
        &self,
        storage_path: &str,
        ttl_secs: u64,
    ) -> Result<String, GatewayError> {
        let mut store = self.store.lock().await;
        check_reachable(&store)?;
        store.urls_issued += 1;
        Ok(format!(
            "memory://recordings/{storage_path}?expires_in={ttl_secs}&sig={}",
            store.urls_issued
        ))
    }

    async fn record_practice_event(
        &self,
        user_id: DbId,
        clip_id: DbId,
        at: Timestamp,
    ) -> Result<(), GatewayError> {
        let mut store = self.store.lock().await;
        check_reachable(&store)?;
        store.history.push(PracticeEntry {
            user_id,
            clip_id,
            at,
        });
        Ok(())
    }

    async fn update_streak(&self, user_id: DbId) -> Result<(), GatewayError> {
        let mut store = self.store.lock().await;
        check_reachable(&store)?;
        *store.streaks.entry(user_id).or_insert(0) += 1;
        Ok(())
    }

    async fn add_favorite(&self, user_id: DbId, clip_id: DbId) -> Result<(), GatewayError> {
        let mut store = self.store.lock().await;
        check_reachable(&store)?;
        store.favorites.insert((user_id, clip_id));
        Ok(())
    }

    async fn remove_favorite(&self, user_id: DbId, clip_id: DbId) -> Result<(), GatewayError> {
        let mut store = self.store.lock().await;
        check_reachable(&store)?;
        store.favorites.remove(&(user_id, clip_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use shadow_core::recording::DEFAULT_AUDIO_MIME;

    fn blob(len: usize) -> AudioBlob {
        AudioBlob::new(vec![1; len], DEFAULT_AUDIO_MIME, 1000)
    }

    #[tokio::test]
    async fn second_save_overwrites_first() {
        let gateway = MemoryGateway::new();
        gateway.save_recording(1, 2, blob(3)).await.unwrap();
        let second = gateway.save_recording(1, 2, blob(5)).await.unwrap();

        assert_eq!(gateway.recording_count().await, 1);
        let (stored, audio) = gateway.stored_recording(1, 2).await.unwrap();
        assert_eq!(stored, second);
        assert_eq!(audio.len(), 5);
        assert_eq!(stored.storage_path, "1/2");
    }

    #[tokio::test]
    async fn injected_save_failures_run_out() {
        let gateway = MemoryGateway::new();
        gateway.fail_next_saves(1).await;
        assert_matches!(
            gateway.save_recording(1, 2, blob(1)).await,
            Err(GatewayError::Network(_))
        );
        assert!(gateway.save_recording(1, 2, blob(1)).await.is_ok());
    }

    #[tokio::test]
    async fn missing_clip_is_not_found() {
        let gateway = MemoryGateway::new();
        assert_matches!(
            gateway.get_clip(9).await,
            Err(GatewayError::NotFound { entity: "clip", id: 9 })
        );
    }

    #[tokio::test]
    async fn unreachable_fails_everything() {
        let gateway = MemoryGateway::new();
        gateway.set_unreachable(true).await;
        assert!(gateway.update_streak(1).await.is_err());
        assert!(gateway.add_favorite(1, 2).await.is_err());
        gateway.set_unreachable(false).await;
        gateway.add_favorite(1, 2).await.unwrap();
        assert!(gateway.is_favorite(1, 2).await);
    }
}
