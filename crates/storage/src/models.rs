use chrono::NaiveDateTime;
use domain::{Comment, TopicStats};
use sqlx::FromRow;

#[derive(FromRow)]
pub struct SqlComment {
    pub id: i64,
    pub topic_id: i64,
    pub author_id: i64,
    pub content: String,
    pub created_at: NaiveDateTime,
    pub request_hash: String,
}

impl From<SqlComment> for Comment {
    fn from(sql: SqlComment) -> Self {
        Comment {
            id: sql.id,
            topic_id: sql.topic_id,
            author_id: sql.author_id,
            content: sql.content,
            created_at: sql.created_at,
            request_hash: sql.request_hash,
        }
    }
}

#[derive(FromRow)]
pub struct SqlTopic {
    pub id: i64,
    pub comment_count: i64,
    pub last_comment_at: Option<NaiveDateTime>,
}

impl From<SqlTopic> for TopicStats {
    fn from(sql: SqlTopic) -> Self {
        TopicStats {
            topic_id: sql.id,
            comment_count: sql.comment_count,
            last_comment_at: sql.last_comment_at,
        }
    }
}
