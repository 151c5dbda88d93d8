use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const CATEGORIES: &[&str] = &["travel", "adventure", "learning", "fitness", "social", "other"];

pub const TIMEFRAMES: &[&str] = &["anytime", "this year", "specific month"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketItem {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub category: String,
    pub location: Option<String>,
    pub timeframe: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields supplied by the owner when creating or replacing an item.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemFields {
    pub title: String,
    pub category: String,
    pub location: Option<String>,
    pub timeframe: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub name: Option<String>,
    pub email: String,
    pub image: Option<String>,
    pub city: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Pending,
    Accepted,
    Rejected,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("Invalid status: {}", other)),
        }
    }
}

/// Persisted relationship between two users. `user1_id < user2_id` always holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRecord {
    pub id: String,
    pub user1_id: String,
    pub user2_id: String,
    pub shared_items_count: i64,
    pub status: MatchStatus,
    pub created_at: String,
    pub updated_at: String,
}

impl MatchRecord {
    pub fn involves(&self, user_id: &str) -> bool {
        self.user1_id == user_id || self.user2_id == user_id
    }

    /// The participant that is not `user_id`.
    pub fn other_user(&self, user_id: &str) -> &str {
        if self.user1_id == user_id {
            &self.user2_id
        } else {
            &self.user1_id
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewMatchRecord {
    pub user1_id: String,
    pub user2_id: String,
    pub shared_items_count: i64,
    pub status: MatchStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchRecordUpdate {
    pub shared_items_count: i64,
    /// `None` leaves the stored status untouched.
    pub status: Option<MatchStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub match_id: Option<String>,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub sender_id: String,
    pub receiver_id: String,
    pub match_id: Option<String>,
    pub content: String,
}
