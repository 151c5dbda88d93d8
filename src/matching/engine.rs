use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use super::domain::{self, MatchResult};
use crate::config::MatchingConfig;
use crate::db::models::{MatchRecord, MatchRecordUpdate, MatchStatus, NewMatchRecord, UserProfile};
use crate::repository::{ItemStore, MatchRecordStore, ProfileStore, RepositoryError};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Store error: {0}")]
    Store(#[from] RepositoryError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Finds users with overlapping bucket lists and keeps one match record per pair.
pub struct MatchEngine {
    items: Arc<dyn ItemStore>,
    profiles: Arc<dyn ProfileStore>,
    records: Arc<dyn MatchRecordStore>,
    config: MatchingConfig,
}

impl MatchEngine {
    pub fn new(
        items: Arc<dyn ItemStore>,
        profiles: Arc<dyn ProfileStore>,
        records: Arc<dyn MatchRecordStore>,
        config: MatchingConfig,
    ) -> Self {
        Self {
            items,
            profiles,
            records,
            config,
        }
    }

    /// Rank every other user by how many items they share with `user_id`.
    ///
    /// Read-only. With `fail_open` set, a failed read yields an empty list.
    pub async fn find_matches(&self, user_id: &str) -> Result<Vec<MatchResult>, EngineError> {
        match self.compute_matches(user_id).await {
            Ok(results) => Ok(results),
            Err(e) if self.config.fail_open => {
                tracing::warn!("Match lookup for {} failed, reporting none: {}", user_id, e);
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn compute_matches(&self, user_id: &str) -> Result<Vec<MatchResult>, RepositoryError> {
        let mine = self.items.list_for_owner(user_id).await?;
        if mine.is_empty() {
            return Ok(Vec::new());
        }

        let others = self.items.list_excluding_owner(user_id).await?;
        let other_count = others.len();
        let candidates =
            domain::shared_by_candidate(&mine, others, self.config.similarity_threshold);
        if candidates.is_empty() {
            tracing::debug!(
                "No shared items for {} across {} other items",
                user_id,
                other_count
            );
            return Ok(Vec::new());
        }

        let ids: Vec<String> = candidates.iter().map(|(owner, _)| owner.clone()).collect();
        let profiles: HashMap<String, UserProfile> = self
            .profiles
            .get_profiles(&ids)
            .await?
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();

        let results = domain::rank_matches(candidates, &profiles, self.config.tie_break);
        tracing::debug!(
            "Found {} matches for {} ({} own items, {} other items)",
            results.len(),
            user_id,
            mine.len(),
            other_count
        );
        Ok(results)
    }

    /// Create or refresh the record for an unordered user pair.
    ///
    /// An existing record gets the new count and, unless disabled in config,
    /// its status reset to pending. Write failures are returned.
    pub async fn create_match(
        &self,
        user1_id: &str,
        user2_id: &str,
        shared_items_count: usize,
    ) -> Result<MatchRecord, EngineError> {
        if user1_id == user2_id {
            return Err(EngineError::InvalidInput(format!(
                "cannot match user {} with themselves",
                user1_id
            )));
        }
        let count = i64::try_from(shared_items_count)
            .map_err(|_| EngineError::InvalidInput("shared item count too large".into()))?;

        let (first, second) = domain::canonical_pair(user1_id, user2_id);

        let existing = match self.records.find_by_pair(first, second).await? {
            Some(existing) => existing,
            None => {
                let inserted = self
                    .records
                    .insert(&NewMatchRecord {
                        user1_id: first.to_string(),
                        user2_id: second.to_string(),
                        shared_items_count: count,
                        status: MatchStatus::Pending,
                    })
                    .await;
                match inserted {
                    Ok(record) => {
                        tracing::debug!(
                            "Created match {} ({}:{}) with {} shared items",
                            record.id,
                            first,
                            second,
                            count
                        );
                        return Ok(record);
                    }
                    // Another reconciliation inserted the pair first; update theirs
                    Err(RepositoryError::Conflict(reason)) => {
                        tracing::debug!(
                            "Match {}:{} inserted concurrently ({}), updating instead",
                            first,
                            second,
                            reason
                        );
                        self.records
                            .find_by_pair(first, second)
                            .await?
                            .ok_or_else(|| {
                                RepositoryError::Conflict(format!(
                                    "match {}:{} conflicted but is missing",
                                    first, second
                                ))
                            })?
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        };

        let status = self
            .config
            .reset_status_on_refresh
            .then_some(MatchStatus::Pending);
        let record = self
            .records
            .update(
                &existing.id,
                &MatchRecordUpdate {
                    shared_items_count: count,
                    status,
                },
            )
            .await?;
        tracing::debug!(
            "Refreshed match {} ({}:{}) to {} shared items",
            record.id,
            first,
            second,
            count
        );
        Ok(record)
    }

    /// Find matches and persist a record for each of them.
    ///
    /// Stops at the first failed write; records already written stay.
    pub async fn refresh_matches(&self, user_id: &str) -> Result<Vec<MatchResult>, EngineError> {
        let results = self.find_matches(user_id).await?;
        for result in &results {
            self.create_match(user_id, &result.user.id, result.shared_items_count)
                .await?;
        }
        Ok(results)
    }
}
