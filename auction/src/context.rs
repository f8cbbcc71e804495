//! Process-wide state handed to every request handler.
//!
//! Everything here is built once at startup and read-only afterwards;
//! handlers receive it as `Arc<ServerContext>` instead of reaching into
//! globals.

use crate::accounts::{self, AccountStore};
use crate::adapters::Registry;
use crate::cache_client::CacheClient;
use crate::config::{Config, HostCookieConfig};
use crate::errors::AuctionError;
use crate::exchange::Exchange;
use hyper::body::Bytes;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct ServerContext {
    pub registry: Registry,
    pub accounts: Arc<dyn AccountStore>,
    pub exchange: Exchange,
    pub host_cookie: HostCookieConfig,
    pub default_timeout_ms: u64,
    pub max_timeout_ms: u64,
    /// Compiled request schema for `/validate`; None when the schema file is
    /// absent, in which case the endpoint says so instead of validating.
    pub request_schema: Option<jsonschema::Validator>,
    /// All bidder param schemas, pre-marshaled as one JSON object.
    pub bidder_params: Bytes,
    pub static_dir: PathBuf,
}

impl ServerContext {
    pub async fn from_config(config: &Config) -> Result<Self, AuctionError> {
        let registry = Registry::from_config(&config.adapters)?;
        let accounts = accounts::from_config(&config.data_cache)
            .await
            .map_err(|e| AuctionError::AccountStore(e.to_string()))?;
        let cache = config.cache_url.clone().map(CacheClient::new);
        let exchange = Exchange::new(registry.clone(), cache);

        let request_schema = load_request_schema(&config.static_dir);
        let bidder_params = load_bidder_params(&config.static_dir.join("bidder-params"))?;

        Ok(Self {
            registry,
            accounts,
            exchange,
            host_cookie: config.host_cookie.clone(),
            default_timeout_ms: config.default_timeout_ms,
            max_timeout_ms: config.max_timeout_ms,
            request_schema,
            bidder_params,
            static_dir: config.static_dir.clone(),
        })
    }
}

fn load_request_schema(static_dir: &Path) -> Option<jsonschema::Validator> {
    let path = static_dir.join("pbs_request.json");
    let raw = match std::fs::read(&path) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Unable to open request schema");
            return None;
        }
    };
    let schema: serde_json::Value = match serde_json::from_slice(&raw) {
        Ok(schema) => schema,
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Request schema is not JSON");
            return None;
        }
    };
    match jsonschema::validator_for(&schema) {
        Ok(validator) => Some(validator),
        Err(e) => {
            tracing::error!(error = %e, "Unable to compile request schema");
            None
        }
    }
}

/// Slurps every `*.json` under the schema directory into one object keyed by
/// file stem. Contents are held in memory for the process lifetime, so this
/// must not be pointed at a large directory.
pub fn load_bidder_params(dir: &Path) -> Result<Bytes, AuctionError> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| AuctionError::SchemaDirectory(format!("{}: {e}", dir.display())))?;

    let mut schemas = BTreeMap::new();
    for entry in entries {
        let entry =
            entry.map_err(|e| AuctionError::SchemaDirectory(format!("{}: {e}", dir.display())))?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };

        let raw = std::fs::read(&path)
            .map_err(|e| AuctionError::SchemaDirectory(format!("{}: {e}", path.display())))?;
        let value: serde_json::Value = serde_json::from_slice(&raw)
            .map_err(|e| AuctionError::SchemaDirectory(format!("{}: {e}", path.display())))?;
        schemas.insert(stem.to_string(), value);
    }

    let blob = serde_json::to_vec(&schemas)
        .map_err(|e| AuctionError::SchemaDirectory(e.to_string()))?;
    Ok(Bytes::from(blob))
}
