// Repository pattern - isolates all storage side effects behind traits
pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

use crate::db::models::{
    BucketItem, ItemFields, MatchRecord, MatchRecordUpdate, MatchStatus, Message, NewMatchRecord,
    NewMessage, UserProfile,
};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Owner-scoped bucket list items.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Items owned by `owner_id`, newest first
    async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<BucketItem>, RepositoryError>;

    /// Every item not owned by `owner_id`
    async fn list_excluding_owner(&self, owner_id: &str)
        -> Result<Vec<BucketItem>, RepositoryError>;

    async fn get(&self, id: &str) -> Result<Option<BucketItem>, RepositoryError>;

    async fn create(&self, owner_id: &str, fields: &ItemFields)
        -> Result<BucketItem, RepositoryError>;

    async fn update(&self, id: &str, fields: &ItemFields) -> Result<BucketItem, RepositoryError>;

    /// Returns false when nothing was deleted
    async fn delete(&self, id: &str) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Profiles for the given ids. Unknown ids are skipped.
    async fn get_profiles(&self, ids: &[String]) -> Result<Vec<UserProfile>, RepositoryError>;

    async fn get(&self, id: &str) -> Result<Option<UserProfile>, RepositoryError>;

    /// Insert or replace the profile with `profile.id`
    async fn upsert(&self, profile: &UserProfile) -> Result<UserProfile, RepositoryError>;

    async fn update_details(
        &self,
        id: &str,
        name: Option<&str>,
        city: Option<&str>,
    ) -> Result<UserProfile, RepositoryError>;
}

/// Match records keyed by the canonical `(user1_id, user2_id)` pair.
#[async_trait]
pub trait MatchRecordStore: Send + Sync {
    /// Expects the pair already in canonical order
    async fn find_by_pair(
        &self,
        user1_id: &str,
        user2_id: &str,
    ) -> Result<Option<MatchRecord>, RepositoryError>;

    async fn insert(&self, record: &NewMatchRecord) -> Result<MatchRecord, RepositoryError>;

    async fn update(
        &self,
        id: &str,
        update: &MatchRecordUpdate,
    ) -> Result<MatchRecord, RepositoryError>;

    async fn get(&self, id: &str) -> Result<Option<MatchRecord>, RepositoryError>;

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<MatchRecord>, RepositoryError>;

    async fn set_status(
        &self,
        id: &str,
        status: MatchStatus,
    ) -> Result<MatchRecord, RepositoryError>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn insert(&self, message: &NewMessage) -> Result<Message, RepositoryError>;

    /// Conversation between two users, oldest first
    async fn list_between(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> Result<Vec<Message>, RepositoryError>;
}
