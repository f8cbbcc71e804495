//! Read-only account settings behind one interface.
//!
//! The backing store is selected by `data_cache.type` at startup; callers only
//! see `Arc<dyn AccountStore>`. Slow stores are wrapped in a bounded in-memory
//! cache with a TTL so the hot path rarely touches the backend.

use crate::config::DataCacheConfig;
use async_trait::async_trait;
use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Rounding rule applied to CPMs when building targeting keys.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceGranularity {
    Low,
    #[default]
    Med,
    High,
    Auto,
    Dense,
}

impl FromStr for PriceGranularity {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(PriceGranularity::Low),
            "med" => Ok(PriceGranularity::Med),
            "high" => Ok(PriceGranularity::High),
            "auto" => Ok(PriceGranularity::Auto),
            "dense" => Ok(PriceGranularity::Dense),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    #[serde(default)]
    pub price_granularity: PriceGranularity,
}

#[derive(Error, Debug)]
pub enum AccountError {
    #[error("Unknown account")]
    NotFound,

    #[error("account store error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get(&self, account_id: &str) -> Result<Account, AccountError>;
}

/// Builds the configured store. File and relational stores get the caching
/// wrapper; the dummy store is already as fast as a cache hit.
pub async fn from_config(config: &DataCacheConfig) -> Result<Arc<dyn AccountStore>, AccountError> {
    match config {
        DataCacheConfig::Dummy => Ok(Arc::new(DummyAccountStore {})),
        DataCacheConfig::File { filename } => {
            let store = FileAccountStore::new(filename)?;
            Ok(Arc::new(CachedAccounts::new(
                Arc::new(store),
                default_file_cache_size(),
                Duration::from_secs(default_file_cache_ttl_secs()),
            )))
        }
        DataCacheConfig::Postgres {
            host,
            database,
            username,
            password,
            cache_size,
            ttl_seconds,
        } => {
            let store = PostgresAccountStore::connect(host, database, username, password).await?;
            Ok(Arc::new(CachedAccounts::new(
                Arc::new(store),
                *cache_size,
                Duration::from_secs(*ttl_seconds),
            )))
        }
    }
}

fn default_file_cache_size() -> u64 {
    10_000
}

fn default_file_cache_ttl_secs() -> u64 {
    3600
}

/// Accepts every account id with default settings. For development and for
/// hosts that key nothing off the account.
pub struct DummyAccountStore {}

#[async_trait]
impl AccountStore for DummyAccountStore {
    async fn get(&self, account_id: &str) -> Result<Account, AccountError> {
        Ok(Account {
            id: account_id.to_string(),
            price_granularity: PriceGranularity::default(),
        })
    }
}

#[derive(Deserialize)]
struct AccountsFile {
    #[serde(default)]
    accounts: Vec<Account>,
}

/// Accounts loaded once from a YAML file at startup.
pub struct FileAccountStore {
    accounts: HashMap<String, Account>,
}

impl FileAccountStore {
    pub fn new(path: &Path) -> Result<Self, AccountError> {
        let raw = std::fs::read(path)
            .map_err(|e| AccountError::Backend(format!("{}: {e}", path.display())))?;
        let parsed: AccountsFile = serde_yaml::from_slice(&raw)
            .map_err(|e| AccountError::Backend(format!("{}: {e}", path.display())))?;
        Ok(Self {
            accounts: parsed
                .accounts
                .into_iter()
                .map(|account| (account.id.clone(), account))
                .collect(),
        })
    }
}

#[async_trait]
impl AccountStore for FileAccountStore {
    async fn get(&self, account_id: &str) -> Result<Account, AccountError> {
        self.accounts
            .get(account_id)
            .cloned()
            .ok_or(AccountError::NotFound)
    }
}

/// Account lookups against the shared relational store.
pub struct PostgresAccountStore {
    client: tokio_postgres::Client,
}

impl PostgresAccountStore {
    pub async fn connect(
        host: &str,
        database: &str,
        username: &str,
        password: &str,
    ) -> Result<Self, AccountError> {
        let mut pg_config = tokio_postgres::Config::new();
        pg_config
            .host(host)
            .dbname(database)
            .user(username)
            .password(password);

        let (client, connection) = pg_config
            .connect(tokio_postgres::NoTls)
            .await
            .map_err(|e| AccountError::Backend(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "Account store connection closed");
            }
        });

        Ok(Self { client })
    }
}

#[async_trait]
impl AccountStore for PostgresAccountStore {
    async fn get(&self, account_id: &str) -> Result<Account, AccountError> {
        let row = self
            .client
            .query_opt(
                "SELECT uuid, price_granularity FROM accounts_account WHERE uuid = $1 LIMIT 1",
                &[&account_id],
            )
            .await
            .map_err(|e| AccountError::Backend(e.to_string()))?
            .ok_or(AccountError::NotFound)?;

        let id: String = row.get(0);
        let granularity: Option<String> = row.get(1);
        let price_granularity = granularity
            .as_deref()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default();

        Ok(Account {
            id,
            price_granularity,
        })
    }
}

/// Bounded read-through cache in front of a slow store. Misses re-read the
/// backing store; negative results are not cached.
pub struct CachedAccounts {
    inner: Arc<dyn AccountStore>,
    cache: Cache<String, Account>,
}

impl CachedAccounts {
    pub fn new(inner: Arc<dyn AccountStore>, max_capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();
        Self { inner, cache }
    }
}

#[async_trait]
impl AccountStore for CachedAccounts {
    async fn get(&self, account_id: &str) -> Result<Account, AccountError> {
        if let Some(account) = self.cache.get(account_id) {
            return Ok(account);
        }
        let account = self.inner.get(account_id).await?;
        self.cache.insert(account_id.to_string(), account.clone());
        Ok(account)
    }
}
