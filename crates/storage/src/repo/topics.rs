use chrono::NaiveDateTime;
use domain::TopicStats;
use sqlx::SqliteConnection;
use tracing::warn;

use super::finish;
use crate::error::{StoreError, StoreResult};
use crate::{models::SqlTopic, Db};

impl Db {
    /// Registers a topic with empty aggregates. Existing topics are untouched.
    pub async fn ensure_topic(&self, topic_id: i64) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO topics (id, comment_count, last_comment_at)
            VALUES (?, 0, NULL)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(topic_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn topic_stats(&self, topic_id: i64) -> StoreResult<TopicStats> {
        let row = sqlx::query_as::<_, SqlTopic>(
            "SELECT id, comment_count, last_comment_at FROM topics WHERE id = ?",
        )
        .bind(topic_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Into::into).ok_or(StoreError::NotFound)
    }

    /// Recomputes a topic's aggregates from its live comments.
    ///
    /// `comment_count` is maintained by increments and decrements, so it only
    /// stays right as long as every writer goes through this store. This puts
    /// it back in line after something else touched the tables.
    pub async fn reconcile_topic(&self, topic_id: i64) -> StoreResult<TopicStats> {
        let mut tx = self.pool.begin().await?;
        let outcome = recompute(&mut tx, topic_id).await;
        let (before, after) = finish(tx, "reconcile_topic", outcome).await?;

        if before != after {
            warn!(
                topic_id,
                stored_count = before.comment_count,
                actual_count = after.comment_count,
                "topic aggregates drifted, repaired"
            );
        }
        Ok(after)
    }
}

async fn recompute(
    conn: &mut SqliteConnection,
    topic_id: i64,
) -> StoreResult<(TopicStats, TopicStats)> {
    let before: TopicStats = sqlx::query_as::<_, SqlTopic>(
        "SELECT id, comment_count, last_comment_at FROM topics WHERE id = ?",
    )
    .bind(topic_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(StoreError::NotFound)?
    .into();

    let (comment_count, last_comment_at): (i64, Option<NaiveDateTime>) = sqlx::query_as(
        "SELECT COUNT(*), MAX(created_at) FROM comments WHERE topic_id = ? AND deleted = FALSE",
    )
    .bind(topic_id)
    .fetch_one(&mut *conn)
    .await?;

    sqlx::query("UPDATE topics SET comment_count = ?, last_comment_at = ? WHERE id = ?")
        .bind(comment_count)
        .bind(last_comment_at)
        .bind(topic_id)
        .execute(&mut *conn)
        .await?;

    let after = TopicStats {
        topic_id,
        comment_count,
        last_comment_at,
    };
    Ok((before, after))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::HashChainLedger;
    use crate::settings::DatabaseSettings;
    use std::sync::Arc;

    async fn test_db() -> Db {
        Db::open(
            &DatabaseSettings::in_memory(),
            Arc::new(HashChainLedger::new("test")),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_ensure_topic_is_idempotent() {
        let db = test_db().await;
        db.ensure_topic(5).await.unwrap();
        db.new_comment(5, 1, "hi").await.unwrap();
        db.ensure_topic(5).await.unwrap();

        let stats = db.topic_stats(5).await.unwrap();
        assert_eq!(stats.topic_id, 5);
        assert_eq!(stats.comment_count, 1);
        assert!(stats.last_comment_at.is_some());
    }

    #[tokio::test]
    async fn test_unknown_topic_stats_is_not_found() {
        let db = test_db().await;
        assert!(db.topic_stats(3).await.unwrap_err().is_not_found());
        assert!(db.reconcile_topic(3).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_reconcile_repairs_drift() {
        let db = test_db().await;
        db.ensure_topic(1).await.unwrap();
        let a = db.new_comment(1, 1, "a").await.unwrap();
        let b = db.new_comment(1, 1, "b").await.unwrap();
        db.delete_comment(b).await.unwrap();

        sqlx::query("UPDATE topics SET comment_count = 7, last_comment_at = NULL WHERE id = 1")
            .execute(&db.pool)
            .await
            .unwrap();

        let repaired = db.reconcile_topic(1).await.unwrap();
        assert_eq!(repaired.comment_count, 1);
        assert_eq!(
            repaired.last_comment_at,
            Some(db.get_comment(a).await.unwrap().created_at)
        );
        assert_eq!(db.topic_stats(1).await.unwrap(), repaired);
    }

    #[tokio::test]
    async fn test_reconcile_empty_topic() {
        let db = test_db().await;
        db.ensure_topic(1).await.unwrap();

        let stats = db.reconcile_topic(1).await.unwrap();
        assert_eq!(stats.comment_count, 0);
        assert_eq!(stats.last_comment_at, None);
    }
}
