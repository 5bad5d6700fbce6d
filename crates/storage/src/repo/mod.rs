mod comments;
mod topics;

use sqlx::{Sqlite, Transaction};
use tracing::warn;

use crate::error::{StoreError, StoreResult};

/// Commits `tx` when `outcome` is `Ok`, otherwise rolls it back and returns
/// the original error. A failing rollback is logged, never returned.
pub(crate) async fn finish<T>(
    tx: Transaction<'static, Sqlite>,
    op: &'static str,
    outcome: StoreResult<T>,
) -> StoreResult<T> {
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(cause) => {
            if let Err(e) = tx.rollback().await {
                let err = StoreError::Rollback(e);
                warn!(op, cause = %cause, error = %err, "rollback failed");
            }
            Err(cause)
        }
    }
}
