//! Persistence gateway contract consumed by the practice session.
//!
//! The implementation (database, object storage, HTTP transport) lives
//! outside this workspace. Calls are treated as remote and may fail with a
//! transient [`GatewayError::Network`].

use async_trait::async_trait;

use crate::clip::Clip;
use crate::recording::{AudioBlob, Recording};
use crate::types::{DbId, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Network error: {0}")]
    Network(String),
}

#[async_trait]
pub trait SessionGateway: Send + Sync {
    async fn get_clip(&self, clip_id: DbId) -> Result<Clip, GatewayError>;

    async fn get_recording(
        &self,
        user_id: DbId,
        clip_id: DbId,
    ) -> Result<Option<Recording>, GatewayError>;

    /// Upsert the audio under the fixed `{user_id}/{clip_id}` key.
    async fn save_recording(
        &self,
        user_id: DbId,
        clip_id: DbId,
        audio: AudioBlob,
    ) -> Result<Recording, GatewayError>;

    async fn delete_recording(&self, user_id: DbId, clip_id: DbId) -> Result<(), GatewayError>;

    /// Issue a time-limited URL for playing back a stored recording.
    async fn signed_playback_url(
        &self,
        storage_path: &str,
        ttl_secs: u64,
    ) -> Result<String, GatewayError>;

    async fn record_practice_event(
        &self,
        user_id: DbId,
        clip_id: DbId,
        at: Timestamp,
    ) -> Result<(), GatewayError>;

    /// Bump the per-day practice streak counter.
    async fn update_streak(&self, user_id: DbId) -> Result<(), GatewayError>;

    async fn add_favorite(&self, user_id: DbId, clip_id: DbId) -> Result<(), GatewayError>;

    async fn remove_favorite(&self, user_id: DbId, clip_id: DbId) -> Result<(), GatewayError>;
}
