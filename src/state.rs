use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::Config;
use crate::matching::MatchEngine;
use crate::notify::MessageHub;
use crate::repository::{
    ItemStore, MatchRecordStore, MessageStore, ProfileStore, SqliteStore,
};

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub items: Arc<dyn ItemStore>,
    pub profiles: Arc<dyn ProfileStore>,
    pub matches: Arc<dyn MatchRecordStore>,
    pub messages: Arc<dyn MessageStore>,
    pub engine: Arc<MatchEngine>,
    pub hub: MessageHub,
}

impl AppState {
    /// State backed by a single store implementing every repository trait
    pub fn with_store<S>(store: Arc<S>, config: Config) -> Self
    where
        S: ItemStore + ProfileStore + MatchRecordStore + MessageStore + 'static,
    {
        let items: Arc<dyn ItemStore> = store.clone();
        let profiles: Arc<dyn ProfileStore> = store.clone();
        let matches: Arc<dyn MatchRecordStore> = store.clone();
        let messages: Arc<dyn MessageStore> = store;

        let engine = MatchEngine::new(
            items.clone(),
            profiles.clone(),
            matches.clone(),
            config.matching.clone(),
        );

        Self {
            config,
            items,
            profiles,
            matches,
            messages,
            engine: Arc::new(engine),
            hub: MessageHub::default(),
        }
    }

    pub fn from_pool(pool: DbPool, config: Config) -> Self {
        Self::with_store(Arc::new(SqliteStore::new(pool)), config)
    }
}
