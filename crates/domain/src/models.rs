use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A discussion comment as seen by readers. Soft-deleted rows never make it
/// this far, so there is no `deleted` flag here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub topic_id: i64,
    pub author_id: i64,
    pub content: String,
    pub created_at: NaiveDateTime,
    /// Canonical string form of the write receipt that certifies the insert.
    pub request_hash: String,
}

/// Denormalized aggregates a topic keeps about its live comments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicStats {
    pub topic_id: i64,
    pub comment_count: i64,
    pub last_comment_at: Option<NaiveDateTime>,
}
