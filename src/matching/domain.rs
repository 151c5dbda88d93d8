// Domain logic - pure functions over item lists, no I/O
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::db::models::{BucketItem, UserProfile};

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.30;

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "as", "is", "was", "are", "were", "be", "been", "being", "have", "has", "had", "do",
    "does", "did", "will", "would", "should", "could", "may", "might", "must", "can", "this",
    "that", "these", "those", "i", "you", "he", "she", "it", "we", "they",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Exact,
    Category,
}

/// One related pair of items, the first owned by the requester.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedItem {
    pub item1_id: String,
    pub item2_id: String,
    pub title: String,
    pub category: String,
    pub match_type: MatchType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub user: UserProfile,
    pub shared_items_count: usize,
    pub shared_items: Vec<SharedItem>,
}

/// Ordering among candidates with the same shared-item count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Ascending candidate id, reproducible across runs.
    #[default]
    CandidateId,
    /// Order in which candidates first appear in the item listing.
    Encounter,
}

/// Lowercased whitespace-separated tokens longer than two characters, minus stop words.
pub fn extract_keywords(title: &str) -> Vec<String> {
    title
        .to_lowercase()
        .split_whitespace()
        .filter(|word| word.chars().count() > 2 && !STOP_WORDS.contains(word))
        .map(str::to_string)
        .collect()
}

/// Jaccard overlap of the two keyword sets, `None` if either set is empty.
pub fn keyword_overlap(title1: &str, title2: &str) -> Option<f64> {
    let keywords1: HashSet<String> = extract_keywords(title1).into_iter().collect();
    let keywords2: HashSet<String> = extract_keywords(title2).into_iter().collect();

    if keywords1.is_empty() || keywords2.is_empty() {
        return None;
    }

    let intersection = keywords1.intersection(&keywords2).count();
    let union = keywords1.union(&keywords2).count();
    Some(intersection as f64 / union as f64)
}

pub fn are_similar(title1: &str, title2: &str, threshold: f64) -> bool {
    keyword_overlap(title1, title2).is_some_and(|ratio| ratio >= threshold)
}

pub fn normalize_title(title: &str) -> String {
    title.trim().to_lowercase()
}

/// Classify a single pair. Exact title equality wins over the category rule.
pub fn classify(mine: &BucketItem, theirs: &BucketItem, threshold: f64) -> Option<MatchType> {
    if normalize_title(&mine.title) == normalize_title(&theirs.title) {
        return Some(MatchType::Exact);
    }

    if mine.category == theirs.category && are_similar(&mine.title, &theirs.title, threshold) {
        return Some(MatchType::Category);
    }

    None
}

/// Every related pair between two users' lists, requester items outer.
pub fn compare_items(mine: &[BucketItem], theirs: &[BucketItem], threshold: f64) -> Vec<SharedItem> {
    let mut shared = Vec::new();

    for item in mine {
        for other in theirs {
            if let Some(match_type) = classify(item, other, threshold) {
                shared.push(SharedItem {
                    item1_id: item.id.clone(),
                    item2_id: other.id.clone(),
                    title: item.title.clone(),
                    category: item.category.clone(),
                    match_type,
                });
            }
        }
    }

    shared
}

/// Partition items by owner, owners in first-encounter order.
pub fn group_by_owner(items: Vec<BucketItem>) -> Vec<(String, Vec<BucketItem>)> {
    let mut groups: Vec<(String, Vec<BucketItem>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for item in items {
        match index.get(&item.user_id) {
            Some(&i) => groups[i].1.push(item),
            None => {
                index.insert(item.user_id.clone(), groups.len());
                groups.push((item.user_id.clone(), vec![item]));
            }
        }
    }

    groups
}

/// Shared items per candidate, keeping only candidates with at least one.
pub fn shared_by_candidate(
    mine: &[BucketItem],
    others: Vec<BucketItem>,
    threshold: f64,
) -> Vec<(String, Vec<SharedItem>)> {
    group_by_owner(others)
        .into_iter()
        .filter_map(|(owner, items)| {
            let shared = compare_items(mine, &items, threshold);
            (!shared.is_empty()).then_some((owner, shared))
        })
        .collect()
}

/// Attach profiles and rank. Candidates without a profile are dropped.
pub fn rank_matches(
    candidates: Vec<(String, Vec<SharedItem>)>,
    profiles: &HashMap<String, UserProfile>,
    tie_break: TieBreak,
) -> Vec<MatchResult> {
    let mut results: Vec<MatchResult> = candidates
        .into_iter()
        .filter_map(|(owner, shared_items)| {
            let Some(profile) = profiles.get(&owner) else {
                tracing::debug!("Dropping candidate {} without a profile", owner);
                return None;
            };
            Some(MatchResult {
                user: profile.clone(),
                shared_items_count: shared_items.len(),
                shared_items,
            })
        })
        .collect();

    results.sort_by(|a, b| {
        let by_count = b.shared_items_count.cmp(&a.shared_items_count);
        match tie_break {
            TieBreak::CandidateId => by_count.then_with(|| a.user.id.cmp(&b.user.id)),
            TieBreak::Encounter => by_count,
        }
    });

    results
}

/// Order-independent key for a user pair.
pub fn canonical_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}
