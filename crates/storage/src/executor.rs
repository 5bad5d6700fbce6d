use chrono::NaiveDateTime;
use domain::Receipt;
use sqlx::sqlite::SqliteQueryResult;
use sqlx::{Sqlite, SqliteConnection};
use tracing::warn;

use crate::error::{StoreError, StoreResult};
use crate::ledger::{Ledger, WriteRequest};

/// Bind value for a write that goes through the ledger.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Param<'q> {
    Int(i64),
    Text(&'q str),
    Time(NaiveDateTime),
}

impl Param<'_> {
    fn canonical(&self) -> String {
        match self {
            Param::Int(v) => v.to_string(),
            Param::Text(s) => (*s).to_owned(),
            Param::Time(t) => t.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
        }
    }
}

/// Executes `statement` on `conn` and asks `ledger` to certify it.
///
/// The receipt is requested only after the statement succeeded. No receipt
/// is `StoreError::ReceiptMissing`; the caller owns the transaction and must
/// roll it back.
pub(crate) async fn execute_with_receipt<'q>(
    conn: &mut SqliteConnection,
    ledger: &dyn Ledger,
    statement: &'q str,
    params: &[Param<'q>],
) -> StoreResult<(SqliteQueryResult, Receipt)> {
    let mut query = sqlx::query::<Sqlite>(statement);
    for param in params {
        query = match *param {
            Param::Int(v) => query.bind(v),
            Param::Text(s) => query.bind(s),
            Param::Time(t) => query.bind(t),
        };
    }
    let result = query.execute(&mut *conn).await?;

    let request = WriteRequest {
        statement: statement.to_owned(),
        params: params.iter().map(Param::canonical).collect(),
    };
    match ledger.record(&request).await {
        Some(receipt) => Ok((result, receipt)),
        None => {
            warn!(statement, "write executed but the ledger produced no receipt");
            Err(StoreError::ReceiptMissing)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::HashChainLedger;
    use async_trait::async_trait;
    use domain::RequestHash;
    use sqlx::Connection;

    struct SilentLedger;

    #[async_trait]
    impl Ledger for SilentLedger {
        async fn record(&self, _request: &WriteRequest) -> Option<Receipt> {
            None
        }

        async fn contains(&self, _hash: &RequestHash) -> bool {
            false
        }
    }

    async fn scratch() -> SqliteConnection {
        let mut conn = SqliteConnection::connect("sqlite::memory:").await.unwrap();
        sqlx::query("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT NOT NULL)")
            .execute(&mut conn)
            .await
            .unwrap();
        conn
    }

    #[tokio::test]
    async fn test_receipt_follows_successful_write() {
        let mut conn = scratch().await;
        let ledger = HashChainLedger::new("seed");

        let (result, receipt) = execute_with_receipt(
            &mut conn,
            &ledger,
            "INSERT INTO notes (body) VALUES (?)",
            &[Param::Text("hello")],
        )
        .await
        .unwrap();

        assert_eq!(result.rows_affected(), 1);
        assert_eq!(result.last_insert_rowid(), 1);
        assert_eq!(receipt.sequence, 1);
        assert!(ledger.contains(&receipt.request_hash).await);
    }

    #[tokio::test]
    async fn test_missing_receipt_is_an_error() {
        let mut conn = scratch().await;

        let err = execute_with_receipt(
            &mut conn,
            &SilentLedger,
            "INSERT INTO notes (body) VALUES (?)",
            &[Param::Text("hello")],
        )
        .await
        .unwrap_err();

        assert!(matches!(err, StoreError::ReceiptMissing));
    }

    #[tokio::test]
    async fn test_failed_write_asks_for_no_receipt() {
        let mut conn = scratch().await;
        let ledger = HashChainLedger::new("seed");

        let err = execute_with_receipt(
            &mut conn,
            &ledger,
            "INSERT INTO missing_table (body) VALUES (?)",
            &[Param::Text("hello")],
        )
        .await
        .unwrap_err();

        assert!(matches!(err, StoreError::Backend(_)));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_canonical_params() {
        let t = NaiveDateTime::parse_from_str("2024-05-01 12:30:00.250", "%Y-%m-%d %H:%M:%S%.f")
            .unwrap();
        assert_eq!(Param::Int(-7).canonical(), "-7");
        assert_eq!(Param::Text("hi").canonical(), "hi");
        assert_eq!(Param::Time(t).canonical(), "2024-05-01 12:30:00.250");
    }
}
