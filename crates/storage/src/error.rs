use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Lookup miss. Expected outcome, not a failure of the store.
    #[error("record not found")]
    NotFound,

    /// The write statement succeeded but the ledger handed back no receipt.
    #[error("write succeeded but no receipt was produced")]
    ReceiptMissing,

    #[error("database error: {0}")]
    Backend(#[from] sqlx::Error),

    /// Only ever logged: the original error of the failing unit of work is
    /// what the caller sees.
    #[error("rollback failed: {0}")]
    Rollback(#[source] sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
