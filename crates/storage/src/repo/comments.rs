use chrono::{NaiveDateTime, Utc};
use domain::{Comment, RequestHash};
use sqlx::SqliteConnection;
use tracing::debug;

use super::finish;
use crate::error::{StoreError, StoreResult};
use crate::executor::{execute_with_receipt, Param};
use crate::ledger::Ledger;
use crate::{models::SqlComment, Db};

const INSERT_COMMENT: &str =
    "INSERT INTO comments (topic_id, author_id, content, created_at) VALUES (?, ?, ?, ?)";

impl Db {
    /// Creates a comment, bumps the topic aggregates and binds the write
    /// receipt to the new row, all in one transaction.
    pub async fn new_comment(
        &self,
        topic_id: i64,
        author_id: i64,
        content: &str,
    ) -> StoreResult<i64> {
        // 同一个时间戳同时写入 created_at 和 last_comment_at
        let now = Utc::now().naive_utc();

        let mut tx = self.pool.begin().await?;
        let outcome = insert_comment(
            &mut tx,
            self.ledger.as_ref(),
            topic_id,
            author_id,
            content,
            now,
        )
        .await;
        let id = finish(tx, "new_comment", outcome).await?;

        debug!(comment_id = id, topic_id, author_id, "comment created");
        Ok(id)
    }

    pub async fn get_comment(&self, id: i64) -> StoreResult<Comment> {
        let row = sqlx::query_as::<_, SqlComment>(
            r#"
            SELECT id, topic_id, author_id, content, created_at, request_hash
            FROM comments
            WHERE deleted = FALSE AND id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Into::into).ok_or(StoreError::NotFound)
    }

    /// One page of a topic's live comments, ordered by `(created_at, id)`,
    /// plus the total number of live comments.
    ///
    /// A non-positive `limit` or an `offset` past the end yields an empty page
    /// with the real total. Negative offsets count from the start.
    pub async fn comments_by_topic(
        &self,
        topic_id: i64,
        offset: i64,
        limit: i64,
    ) -> StoreResult<(Vec<Comment>, i64)> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM comments WHERE deleted = FALSE AND topic_id = ?",
        )
        .bind(topic_id)
        .fetch_one(&self.pool)
        .await?;

        let offset = offset.max(0);
        if limit <= 0 || offset > total {
            return Ok((Vec::new(), total));
        }

        let rows = sqlx::query_as::<_, SqlComment>(
            r#"
            SELECT id, topic_id, author_id, content, created_at, request_hash
            FROM comments
            WHERE deleted = FALSE AND topic_id = ?
            ORDER BY created_at ASC, id ASC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(topic_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok((rows.into_iter().map(Into::into).collect(), total))
    }

    /// Replaces the content of a comment.
    ///
    /// Single statement, no existence check: an unknown id is not an error.
    pub async fn set_comment_content(&self, id: i64, content: &str) -> StoreResult<()> {
        let result = sqlx::query("UPDATE comments SET content = ? WHERE id = ?")
            .bind(content)
            .bind(id)
            .execute(&self.pool)
            .await?;

        debug!(
            comment_id = id,
            rows = result.rows_affected(),
            "comment content updated"
        );
        Ok(())
    }

    /// Soft-deletes a comment and recomputes its topic's aggregates.
    ///
    /// Only a live comment is flipped; deleting an already deleted or unknown
    /// id changes nothing and succeeds.
    pub async fn delete_comment(&self, id: i64) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let outcome = soft_delete(&mut tx, id).await;
        let deleted = finish(tx, "delete_comment", outcome).await?;

        if deleted {
            debug!(comment_id = id, "comment deleted");
        } else {
            debug!(comment_id = id, "comment already deleted or missing");
        }
        Ok(())
    }

    /// Whether the ledger issued the receipt bound to this comment.
    pub async fn verify_comment_receipt(&self, id: i64) -> StoreResult<bool> {
        let comment = self.get_comment(id).await?;
        match comment.request_hash.parse::<RequestHash>() {
            Ok(hash) => Ok(self.ledger.contains(&hash).await),
            Err(e) => {
                debug!(comment_id = id, error = %e, "stored request hash is malformed");
                Ok(false)
            }
        }
    }
}

async fn insert_comment(
    conn: &mut SqliteConnection,
    ledger: &dyn Ledger,
    topic_id: i64,
    author_id: i64,
    content: &str,
    now: NaiveDateTime,
) -> StoreResult<i64> {
    let (result, receipt) = execute_with_receipt(
        &mut *conn,
        ledger,
        INSERT_COMMENT,
        &[
            Param::Int(topic_id),
            Param::Int(author_id),
            Param::Text(content),
            Param::Time(now),
        ],
    )
    .await?;
    let id = result.last_insert_rowid();

    // 并发写入时旧时间戳可能后提交，last_comment_at 只能前进
    sqlx::query(
        r#"
        UPDATE topics SET
            last_comment_at = CASE
                WHEN last_comment_at IS NULL OR last_comment_at < ?1 THEN ?1
                ELSE last_comment_at
            END,
            comment_count = comment_count + 1
        WHERE id = ?2
        "#,
    )
    .bind(now)
    .bind(topic_id)
    .execute(&mut *conn)
    .await?;

    sqlx::query("UPDATE comments SET request_hash = ? WHERE id = ?")
        .bind(receipt.request_hash.to_string())
        .bind(id)
        .execute(&mut *conn)
        .await?;

    Ok(id)
}

/// Returns `false` when no live row was flipped; the topic is left alone then.
async fn soft_delete(conn: &mut SqliteConnection, id: i64) -> StoreResult<bool> {
    let flipped = sqlx::query("UPDATE comments SET deleted = TRUE WHERE id = ? AND deleted = FALSE")
        .bind(id)
        .execute(&mut *conn)
        .await?
        .rows_affected();
    if flipped == 0 {
        return Ok(false);
    }

    // 目标话题由被删除的评论反查，调用方不传 topic_id
    sqlx::query(
        r#"
        UPDATE topics SET
            last_comment_at = (
                SELECT MAX(created_at) FROM comments
                WHERE comments.topic_id = topics.id AND comments.deleted = FALSE
            ),
            comment_count = topics.comment_count - 1
        WHERE topics.id = (SELECT topic_id FROM comments WHERE id = ?)
        "#,
    )
    .bind(id)
    .execute(&mut *conn)
    .await?;

    Ok(true)
}
