use config::ConfigError;
use serde::Deserialize;
use std::collections::HashMap;

const ENV_PREFIX: &str = "FORUM_";
const MEMORY_URL: &str = "sqlite::memory:";

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub ledger: LedgerSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerSettings {
    /// Seed for the genesis hash of the local receipt chain.
    pub genesis_seed: String,
}

impl Settings {
    /// Defaults, then `store.toml`, then `store.{RUN_MODE}.toml`, then
    /// `FORUM_*` environment variables (`FORUM_DATABASE__URL` -> `database.url`).
    pub fn new() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env_map(collect_env_vars(std::env::vars()))
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let run_mode = env_map
            .get("run_mode")
            .cloned()
            .or_else(|| std::env::var("RUN_MODE").ok())
            .unwrap_or_else(|| "development".to_string());

        let env_json = serde_json::to_string(&env_map)
            .map_err(|e| ConfigError::Message(format!("environment is not serializable: {e}")))?;

        let s = config::Config::builder()
            .set_default("database.url", "sqlite://data/forum.db")?
            .set_default("database.max_connections", 5)?
            .set_default("database.busy_timeout_ms", 5000)?
            .set_default("ledger.genesis_seed", "forum-ledger")?
            .add_source(config::File::with_name("store").required(false))
            .add_source(config::File::with_name(&format!("store.{}", run_mode)).required(false))
            .add_source(config::File::from_str(&env_json, config::FileFormat::Json))
            .build()?;

        s.try_deserialize()
    }
}

impl DatabaseSettings {
    /// Single-connection in-memory database; the data lives as long as the pool.
    pub fn in_memory() -> Self {
        Self {
            url: MEMORY_URL.to_string(),
            max_connections: 1,
            busy_timeout_ms: 5000,
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }
}

fn collect_env_vars(vars: impl Iterator<Item = (String, String)>) -> HashMap<String, String> {
    vars.filter(|(k, _)| k.starts_with(ENV_PREFIX))
        .map(|(k, v)| {
            let new_key = k
                .trim_start_matches(ENV_PREFIX)
                .replace("__", ".")
                .to_lowercase();
            (new_key, v)
        })
        .collect()
}
