// In-memory stores for tests and local experiments
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::{ItemStore, MatchRecordStore, MessageStore, ProfileStore, RepositoryError};
use crate::db::models::{
    BucketItem, ItemFields, MatchRecord, MatchRecordUpdate, MatchStatus, Message, NewMatchRecord,
    NewMessage, UserProfile,
};

#[derive(Default)]
struct Tables {
    profiles: Vec<UserProfile>,
    items: Vec<BucketItem>,
    matches: Vec<MatchRecord>,
    messages: Vec<Message>,
}

/// Implements every store over plain vectors.
///
/// Reads and writes can be switched to fail so callers' error policies can
/// be exercised.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    excluding_owner_calls: AtomicUsize,
}

fn now() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn new_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_read(&self) -> Result<(), RepositoryError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("reads disabled".into()));
        }
        Ok(())
    }

    fn check_write(&self) -> Result<(), RepositoryError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("writes disabled".into()));
        }
        Ok(())
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// How many times `list_excluding_owner` has been called
    pub fn excluding_owner_calls(&self) -> usize {
        self.excluding_owner_calls.load(Ordering::SeqCst)
    }

    pub fn add_profile(&self, profile: UserProfile) {
        let mut tables = self.tables();
        tables.profiles.retain(|p| p.id != profile.id);
        tables.profiles.push(profile);
    }

    /// Seed an item with a caller-chosen id
    pub fn add_item(&self, item: BucketItem) {
        self.tables().items.push(item);
    }

    pub fn match_records(&self) -> Vec<MatchRecord> {
        self.tables().matches.clone()
    }
}

#[async_trait]
impl ItemStore for MemoryStore {
    async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<BucketItem>, RepositoryError> {
        self.check_read()?;
        Ok(self
            .tables()
            .items
            .iter()
            .rev()
            .filter(|item| item.user_id == owner_id)
            .cloned()
            .collect())
    }

    async fn list_excluding_owner(
        &self,
        owner_id: &str,
    ) -> Result<Vec<BucketItem>, RepositoryError> {
        self.excluding_owner_calls.fetch_add(1, Ordering::SeqCst);
        self.check_read()?;
        Ok(self
            .tables()
            .items
            .iter()
            .filter(|item| item.user_id != owner_id)
            .cloned()
            .collect())
    }

    async fn get(&self, id: &str) -> Result<Option<BucketItem>, RepositoryError> {
        self.check_read()?;
        Ok(self.tables().items.iter().find(|i| i.id == id).cloned())
    }

    async fn create(
        &self,
        owner_id: &str,
        fields: &ItemFields,
    ) -> Result<BucketItem, RepositoryError> {
        self.check_write()?;
        let timestamp = now();
        let item = BucketItem {
            id: new_id(),
            user_id: owner_id.to_string(),
            title: fields.title.clone(),
            category: fields.category.clone(),
            location: fields.location.clone(),
            timeframe: fields.timeframe.clone(),
            created_at: timestamp.clone(),
            updated_at: timestamp,
        };
        self.tables().items.push(item.clone());
        Ok(item)
    }

    async fn update(&self, id: &str, fields: &ItemFields) -> Result<BucketItem, RepositoryError> {
        self.check_write()?;
        let mut tables = self.tables();
        let item = tables
            .items
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        item.title = fields.title.clone();
        item.category = fields.category.clone();
        item.location = fields.location.clone();
        item.timeframe = fields.timeframe.clone();
        item.updated_at = now();
        Ok(item.clone())
    }

    async fn delete(&self, id: &str) -> Result<bool, RepositoryError> {
        self.check_write()?;
        let mut tables = self.tables();
        let before = tables.items.len();
        tables.items.retain(|i| i.id != id);
        Ok(tables.items.len() < before)
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn get_profiles(&self, ids: &[String]) -> Result<Vec<UserProfile>, RepositoryError> {
        self.check_read()?;
        Ok(self
            .tables()
            .profiles
            .iter()
            .filter(|p| ids.contains(&p.id))
            .cloned()
            .collect())
    }

    async fn get(&self, id: &str) -> Result<Option<UserProfile>, RepositoryError> {
        self.check_read()?;
        Ok(self.tables().profiles.iter().find(|p| p.id == id).cloned())
    }

    async fn upsert(&self, profile: &UserProfile) -> Result<UserProfile, RepositoryError> {
        self.check_write()?;
        self.add_profile(profile.clone());
        Ok(profile.clone())
    }

    async fn update_details(
        &self,
        id: &str,
        name: Option<&str>,
        city: Option<&str>,
    ) -> Result<UserProfile, RepositoryError> {
        self.check_write()?;
        let mut tables = self.tables();
        let profile = tables
            .profiles
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        profile.name = name.map(str::to_string);
        profile.city = city.map(str::to_string);
        Ok(profile.clone())
    }
}

#[async_trait]
impl MatchRecordStore for MemoryStore {
    async fn find_by_pair(
        &self,
        user1_id: &str,
        user2_id: &str,
    ) -> Result<Option<MatchRecord>, RepositoryError> {
        self.check_read()?;
        Ok(self
            .tables()
            .matches
            .iter()
            .find(|m| m.user1_id == user1_id && m.user2_id == user2_id)
            .cloned())
    }

    async fn insert(&self, record: &NewMatchRecord) -> Result<MatchRecord, RepositoryError> {
        self.check_write()?;
        if record.user1_id >= record.user2_id {
            return Err(RepositoryError::Conflict(format!(
                "pair {}:{} is not in canonical order",
                record.user1_id, record.user2_id
            )));
        }

        let mut tables = self.tables();
        let exists = tables
            .matches
            .iter()
            .any(|m| m.user1_id == record.user1_id && m.user2_id == record.user2_id);
        if exists {
            return Err(RepositoryError::Conflict(format!(
                "match {}:{} already exists",
                record.user1_id, record.user2_id
            )));
        }

        let timestamp = now();
        let stored = MatchRecord {
            id: new_id(),
            user1_id: record.user1_id.clone(),
            user2_id: record.user2_id.clone(),
            shared_items_count: record.shared_items_count,
            status: record.status,
            created_at: timestamp.clone(),
            updated_at: timestamp,
        };
        tables.matches.push(stored.clone());
        Ok(stored)
    }

    async fn update(
        &self,
        id: &str,
        update: &MatchRecordUpdate,
    ) -> Result<MatchRecord, RepositoryError> {
        self.check_write()?;
        let mut tables = self.tables();
        let record = tables
            .matches
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        record.shared_items_count = update.shared_items_count;
        if let Some(status) = update.status {
            record.status = status;
        }
        record.updated_at = now();
        Ok(record.clone())
    }

    async fn get(&self, id: &str) -> Result<Option<MatchRecord>, RepositoryError> {
        self.check_read()?;
        Ok(self.tables().matches.iter().find(|m| m.id == id).cloned())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<MatchRecord>, RepositoryError> {
        self.check_read()?;
        let mut records: Vec<MatchRecord> = self
            .tables()
            .matches
            .iter()
            .filter(|m| m.involves(user_id))
            .cloned()
            .collect();
        records.sort_by(|a, b| {
            b.shared_items_count
                .cmp(&a.shared_items_count)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(records)
    }

    async fn set_status(
        &self,
        id: &str,
        status: MatchStatus,
    ) -> Result<MatchRecord, RepositoryError> {
        self.check_write()?;
        let mut tables = self.tables();
        let record = tables
            .matches
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        record.status = status;
        record.updated_at = now();
        Ok(record.clone())
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn insert(&self, message: &NewMessage) -> Result<Message, RepositoryError> {
        self.check_write()?;
        let stored = Message {
            id: new_id(),
            sender_id: message.sender_id.clone(),
            receiver_id: message.receiver_id.clone(),
            match_id: message.match_id.clone(),
            content: message.content.clone(),
            created_at: now(),
        };
        self.tables().messages.push(stored.clone());
        Ok(stored)
    }

    async fn list_between(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> Result<Vec<Message>, RepositoryError> {
        self.check_read()?;
        Ok(self
            .tables()
            .messages
            .iter()
            .filter(|m| {
                (m.sender_id == user_a && m.receiver_id == user_b)
                    || (m.sender_id == user_b && m.receiver_id == user_a)
            })
            .cloned()
            .collect())
    }
}
