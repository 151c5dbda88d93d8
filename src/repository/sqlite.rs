use async_trait::async_trait;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row};

use super::{ItemStore, MatchRecordStore, MessageStore, ProfileStore, RepositoryError};
use crate::db::models::{
    BucketItem, ItemFields, MatchRecord, MatchRecordUpdate, MatchStatus, Message, NewMatchRecord,
    NewMessage, UserProfile,
};
use crate::state::DbPool;

const ITEM_COLUMNS: &str =
    "id, user_id, title, category, location, timeframe, created_at, updated_at";
const PROFILE_COLUMNS: &str = "id, name, email, image, city";
const MATCH_COLUMNS: &str =
    "id, user1_id, user2_id, shared_items_count, status, created_at, updated_at";
const MESSAGE_COLUMNS: &str = "id, sender_id, receiver_id, match_id, content, created_at";

impl ToSql for MatchStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for MatchStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: String| FromSqlError::Other(e.into()))
    }
}

/// SQLite implementation of every store
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<BucketItem> {
    Ok(BucketItem {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        category: row.get(3)?,
        location: row.get(4)?,
        timeframe: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn profile_from_row(row: &Row<'_>) -> rusqlite::Result<UserProfile> {
    Ok(UserProfile {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        image: row.get(3)?,
        city: row.get(4)?,
    })
}

fn match_from_row(row: &Row<'_>) -> rusqlite::Result<MatchRecord> {
    Ok(MatchRecord {
        id: row.get(0)?,
        user1_id: row.get(1)?,
        user2_id: row.get(2)?,
        shared_items_count: row.get(3)?,
        status: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        match_id: row.get(3)?,
        content: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn load_item(conn: &Connection, id: &str) -> Result<Option<BucketItem>, RepositoryError> {
    let sql = format!("SELECT {} FROM bucket_items WHERE id = ?1", ITEM_COLUMNS);
    Ok(conn.query_row(&sql, params![id], item_from_row).optional()?)
}

fn load_profile(conn: &Connection, id: &str) -> Result<Option<UserProfile>, RepositoryError> {
    let sql = format!("SELECT {} FROM profiles WHERE id = ?1", PROFILE_COLUMNS);
    Ok(conn.query_row(&sql, params![id], profile_from_row).optional()?)
}

fn load_match(conn: &Connection, id: &str) -> Result<Option<MatchRecord>, RepositoryError> {
    let sql = format!("SELECT {} FROM matches WHERE id = ?1", MATCH_COLUMNS);
    Ok(conn.query_row(&sql, params![id], match_from_row).optional()?)
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

#[async_trait]
impl ItemStore for SqliteStore {
    async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<BucketItem>, RepositoryError> {
        let conn = self.pool.get()?;
        let sql = format!(
            "SELECT {} FROM bucket_items WHERE user_id = ?1
             ORDER BY created_at DESC, rowid DESC",
            ITEM_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let items = stmt
            .query_map(params![owner_id], item_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    async fn list_excluding_owner(
        &self,
        owner_id: &str,
    ) -> Result<Vec<BucketItem>, RepositoryError> {
        let conn = self.pool.get()?;
        let sql = format!(
            "SELECT {} FROM bucket_items WHERE user_id != ?1 ORDER BY created_at, rowid",
            ITEM_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let items = stmt
            .query_map(params![owner_id], item_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    async fn get(&self, id: &str) -> Result<Option<BucketItem>, RepositoryError> {
        let conn = self.pool.get()?;
        load_item(&conn, id)
    }

    async fn create(
        &self,
        owner_id: &str,
        fields: &ItemFields,
    ) -> Result<BucketItem, RepositoryError> {
        let conn = self.pool.get()?;
        let id = uuid::Uuid::now_v7().to_string();

        conn.execute(
            "INSERT INTO bucket_items (id, user_id, title, category, location, timeframe)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                owner_id,
                fields.title,
                fields.category,
                fields.location,
                fields.timeframe
            ],
        )?;

        load_item(&conn, &id)?.ok_or_else(|| RepositoryError::NotFound(id))
    }

    async fn update(&self, id: &str, fields: &ItemFields) -> Result<BucketItem, RepositoryError> {
        let conn = self.pool.get()?;

        let rows = conn.execute(
            "UPDATE bucket_items
             SET title = ?2, category = ?3, location = ?4, timeframe = ?5,
                 updated_at = datetime('now')
             WHERE id = ?1",
            params![
                id,
                fields.title,
                fields.category,
                fields.location,
                fields.timeframe
            ],
        )?;
        if rows == 0 {
            return Err(RepositoryError::NotFound(id.to_string()));
        }

        load_item(&conn, id)?.ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    async fn delete(&self, id: &str) -> Result<bool, RepositoryError> {
        let conn = self.pool.get()?;
        let rows = conn.execute("DELETE FROM bucket_items WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }
}

#[async_trait]
impl ProfileStore for SqliteStore {
    async fn get_profiles(&self, ids: &[String]) -> Result<Vec<UserProfile>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.pool.get()?;
        let placeholders = (1..=ids.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {} FROM profiles WHERE id IN ({})",
            PROFILE_COLUMNS, placeholders
        );
        let mut stmt = conn.prepare(&sql)?;
        let profiles = stmt
            .query_map(params_from_iter(ids.iter()), profile_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(profiles)
    }

    async fn get(&self, id: &str) -> Result<Option<UserProfile>, RepositoryError> {
        let conn = self.pool.get()?;
        load_profile(&conn, id)
    }

    async fn upsert(&self, profile: &UserProfile) -> Result<UserProfile, RepositoryError> {
        let conn = self.pool.get()?;

        conn.execute(
            "INSERT INTO profiles (id, name, email, image, city)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
               name = excluded.name,
               email = excluded.email,
               image = excluded.image,
               city = excluded.city,
               updated_at = datetime('now')",
            params![
                profile.id,
                profile.name,
                profile.email,
                profile.image,
                profile.city
            ],
        )?;

        load_profile(&conn, &profile.id)?.ok_or_else(|| RepositoryError::NotFound(profile.id.clone()))
    }

    async fn update_details(
        &self,
        id: &str,
        name: Option<&str>,
        city: Option<&str>,
    ) -> Result<UserProfile, RepositoryError> {
        let conn = self.pool.get()?;

        let rows = conn.execute(
            "UPDATE profiles SET name = ?2, city = ?3, updated_at = datetime('now')
             WHERE id = ?1",
            params![id, name, city],
        )?;
        if rows == 0 {
            return Err(RepositoryError::NotFound(id.to_string()));
        }

        load_profile(&conn, id)?.ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }
}

#[async_trait]
impl MatchRecordStore for SqliteStore {
    async fn find_by_pair(
        &self,
        user1_id: &str,
        user2_id: &str,
    ) -> Result<Option<MatchRecord>, RepositoryError> {
        let conn = self.pool.get()?;
        let sql = format!(
            "SELECT {} FROM matches WHERE user1_id = ?1 AND user2_id = ?2",
            MATCH_COLUMNS
        );
        Ok(conn
            .query_row(&sql, params![user1_id, user2_id], match_from_row)
            .optional()?)
    }

    async fn insert(&self, record: &NewMatchRecord) -> Result<MatchRecord, RepositoryError> {
        let conn = self.pool.get()?;
        let id = uuid::Uuid::now_v7().to_string();

        let result = conn.execute(
            "INSERT INTO matches (id, user1_id, user2_id, shared_items_count, status)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id,
                record.user1_id,
                record.user2_id,
                record.shared_items_count,
                record.status
            ],
        );
        match result {
            Ok(_) => {}
            Err(e) if is_constraint_violation(&e) => {
                return Err(RepositoryError::Conflict(format!(
                    "match {}:{} rejected: {}",
                    record.user1_id, record.user2_id, e
                )));
            }
            Err(e) => return Err(e.into()),
        }

        load_match(&conn, &id)?.ok_or_else(|| RepositoryError::NotFound(id))
    }

    async fn update(
        &self,
        id: &str,
        update: &MatchRecordUpdate,
    ) -> Result<MatchRecord, RepositoryError> {
        let conn = self.pool.get()?;

        let rows = conn.execute(
            "UPDATE matches
             SET shared_items_count = ?2,
                 status = COALESCE(?3, status),
                 updated_at = datetime('now')
             WHERE id = ?1",
            params![id, update.shared_items_count, update.status],
        )?;
        if rows == 0 {
            return Err(RepositoryError::NotFound(id.to_string()));
        }

        load_match(&conn, id)?.ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    async fn get(&self, id: &str) -> Result<Option<MatchRecord>, RepositoryError> {
        let conn = self.pool.get()?;
        load_match(&conn, id)
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<MatchRecord>, RepositoryError> {
        let conn = self.pool.get()?;
        let sql = format!(
            "SELECT {} FROM matches WHERE user1_id = ?1 OR user2_id = ?1
             ORDER BY shared_items_count DESC, id",
            MATCH_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let records = stmt
            .query_map(params![user_id], match_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    async fn set_status(
        &self,
        id: &str,
        status: MatchStatus,
    ) -> Result<MatchRecord, RepositoryError> {
        let conn = self.pool.get()?;

        let rows = conn.execute(
            "UPDATE matches SET status = ?2, updated_at = datetime('now') WHERE id = ?1",
            params![id, status],
        )?;
        if rows == 0 {
            return Err(RepositoryError::NotFound(id.to_string()));
        }

        load_match(&conn, id)?.ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn insert(&self, message: &NewMessage) -> Result<Message, RepositoryError> {
        let conn = self.pool.get()?;
        let id = uuid::Uuid::now_v7().to_string();

        conn.execute(
            "INSERT INTO messages (id, sender_id, receiver_id, match_id, content)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id,
                message.sender_id,
                message.receiver_id,
                message.match_id,
                message.content
            ],
        )?;

        let sql = format!("SELECT {} FROM messages WHERE id = ?1", MESSAGE_COLUMNS);
        Ok(conn.query_row(&sql, params![id], message_from_row)?)
    }

    async fn list_between(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> Result<Vec<Message>, RepositoryError> {
        let conn = self.pool.get()?;
        let sql = format!(
            "SELECT {} FROM messages
             WHERE (sender_id = ?1 AND receiver_id = ?2)
                OR (sender_id = ?2 AND receiver_id = ?1)
             ORDER BY created_at, rowid",
            MESSAGE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let messages = stmt
            .query_map(params![user_a, user_b], message_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn test_store() -> (tempfile::TempDir, SqliteStore) {
        let tmp = tempfile::tempdir().unwrap();
        let pool = db::create_pool(&tmp.path().join("test.db")).unwrap();
        db::run_migrations(&pool).unwrap();
        (tmp, SqliteStore::new(pool))
    }

    fn profile(id: &str) -> UserProfile {
        UserProfile {
            id: id.to_string(),
            name: Some(id.to_uppercase()),
            email: format!("{}@example.com", id),
            image: None,
            city: None,
        }
    }

    fn fields(title: &str, category: &str) -> ItemFields {
        ItemFields {
            title: title.to_string(),
            category: category.to_string(),
            location: None,
            timeframe: "anytime".to_string(),
        }
    }

    #[tokio::test]
    async fn items_are_scoped_by_owner() {
        let (_tmp, store) = test_store();
        store.upsert(&profile("alice")).await.unwrap();
        store.upsert(&profile("bob")).await.unwrap();

        let first = ItemStore::create(&store, "alice", &fields("Visit Japan", "travel"))
            .await
            .unwrap();
        let second = ItemStore::create(&store, "alice", &fields("Learn guitar", "learning"))
            .await
            .unwrap();
        ItemStore::create(&store, "bob", &fields("Bake bread", "social"))
            .await
            .unwrap();

        let mine = store.list_for_owner("alice").await.unwrap();
        let ids: Vec<&str> = mine.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec![second.id.as_str(), first.id.as_str()]);

        let others = store.list_excluding_owner("alice").await.unwrap();
        assert_eq!(others.len(), 1);
        assert_eq!(others[0].user_id, "bob");
    }

    #[tokio::test]
    async fn item_update_and_delete() {
        let (_tmp, store) = test_store();
        store.upsert(&profile("alice")).await.unwrap();
        let item = ItemStore::create(&store, "alice", &fields("Visit Japan", "travel"))
            .await
            .unwrap();

        let updated = ItemStore::update(&store, &item.id, &fields("Visit Kyoto", "travel"))
            .await
            .unwrap();
        assert_eq!(updated.title, "Visit Kyoto");

        assert!(ItemStore::delete(&store, &item.id).await.unwrap());
        assert!(!ItemStore::delete(&store, &item.id).await.unwrap());
        assert!(ItemStore::get(&store, &item.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn get_profiles_skips_unknown_ids() {
        let (_tmp, store) = test_store();
        store.upsert(&profile("alice")).await.unwrap();
        store.upsert(&profile("bob")).await.unwrap();

        let ids = vec!["alice".to_string(), "ghost".to_string(), "bob".to_string()];
        let mut found: Vec<String> = store
            .get_profiles(&ids)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        found.sort();
        assert_eq!(found, vec!["alice", "bob"]);
        assert!(store.get_profiles(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn match_insert_rejects_duplicate_pair() {
        let (_tmp, store) = test_store();
        store.upsert(&profile("alice")).await.unwrap();
        store.upsert(&profile("bob")).await.unwrap();

        let record = NewMatchRecord {
            user1_id: "alice".into(),
            user2_id: "bob".into(),
            shared_items_count: 2,
            status: MatchStatus::Pending,
        };
        let stored = MatchRecordStore::insert(&store, &record).await.unwrap();
        assert_eq!(stored.status, MatchStatus::Pending);

        let err = MatchRecordStore::insert(&store, &record).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn match_update_can_keep_status() {
        let (_tmp, store) = test_store();
        store.upsert(&profile("alice")).await.unwrap();
        store.upsert(&profile("bob")).await.unwrap();

        let stored = MatchRecordStore::insert(
            &store,
            &NewMatchRecord {
                user1_id: "alice".into(),
                user2_id: "bob".into(),
                shared_items_count: 1,
                status: MatchStatus::Pending,
            },
        )
        .await
        .unwrap();
        store
            .set_status(&stored.id, MatchStatus::Accepted)
            .await
            .unwrap();

        let kept = MatchRecordStore::update(
            &store,
            &stored.id,
            &MatchRecordUpdate {
                shared_items_count: 4,
                status: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(kept.shared_items_count, 4);
        assert_eq!(kept.status, MatchStatus::Accepted);

        let found = store.find_by_pair("alice", "bob").await.unwrap().unwrap();
        assert_eq!(found.id, stored.id);
        assert_eq!(store.list_for_user("bob").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn messages_list_both_directions_in_order() {
        let (_tmp, store) = test_store();
        for id in ["alice", "bob", "carol"] {
            store.upsert(&profile(id)).await.unwrap();
        }

        let send = |from: &str, to: &str, content: &str| NewMessage {
            sender_id: from.to_string(),
            receiver_id: to.to_string(),
            match_id: None,
            content: content.to_string(),
        };
        MessageStore::insert(&store, &send("alice", "bob", "hi"))
            .await
            .unwrap();
        MessageStore::insert(&store, &send("carol", "alice", "unrelated"))
            .await
            .unwrap();
        MessageStore::insert(&store, &send("bob", "alice", "hello"))
            .await
            .unwrap();

        let conversation = store.list_between("bob", "alice").await.unwrap();
        let contents: Vec<&str> = conversation.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["hi", "hello"]);
    }
}
