use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::{fs, path::Path, str::FromStr, sync::Arc, time::Duration};
use tracing::info;

mod error;
mod executor;
mod ledger;
mod models;
mod repo;
mod settings;

pub use error::{StoreError, StoreResult};
pub use ledger::{HashChainLedger, Ledger, LedgerError, WriteRequest};
pub use settings::{DatabaseSettings, LedgerSettings, Settings};

/// The comment store. Cheap to clone; clones share the pool and the ledger.
#[derive(Clone)]
pub struct Db {
    pub(crate) pool: Pool<Sqlite>,
    pub(crate) ledger: Arc<dyn Ledger>,
}

impl Db {
    /// Opens the database and certifies writes with a local hash chain.
    pub async fn new(settings: &Settings) -> StoreResult<Self> {
        let ledger = Arc::new(HashChainLedger::new(&settings.ledger.genesis_seed));
        Self::open(&settings.database, ledger).await
    }

    /// Loads `Settings` from files and `FORUM_*` variables, then opens.
    pub async fn from_env() -> StoreResult<Self> {
        let settings = Settings::new()?;
        Self::new(&settings).await
    }

    /// Opens the pool, runs migrations and certifies writes with `ledger`.
    pub async fn open(settings: &DatabaseSettings, ledger: Arc<dyn Ledger>) -> StoreResult<Self> {
        let mut options = SqliteConnectOptions::from_str(&settings.url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_millis(settings.busy_timeout_ms));

        // 内存库: 连接一旦关闭数据就丢了，所以只保留一个永不过期的连接
        let pool_options = if settings.is_in_memory() {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            ensure_parent_dir(&settings.url)?;
            options = options
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal);
            SqlitePoolOptions::new().max_connections(settings.max_connections)
        };

        let pool = pool_options.connect_with(options).await?;
        sqlx::migrate!("../../migrations").run(&pool).await?;
        info!(url = %settings.url, "comment store opened");

        Ok(Self { pool, ledger })
    }

    /// Replaces the receipt collaborator.
    pub fn with_ledger(mut self, ledger: Arc<dyn Ledger>) -> Self {
        self.ledger = ledger;
        self
    }
}

fn ensure_parent_dir(db_url: &str) -> std::io::Result<()> {
    let path_str = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    let path_str = path_str.split('?').next().unwrap_or(path_str);
    let path = Path::new(path_str);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
