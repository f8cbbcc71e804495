//! The bidder adapter contract and the name-to-adapter registry.

mod http;

pub use http::HttpAdapter;

use crate::config::AdapterConfig;
use crate::errors::AuctionError;
use crate::request::{AuctionRequest, Bid, BidderRequest, UsersyncInfo};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Instant;

#[derive(Error, Debug)]
pub enum AdapterError {
    /// The auction deadline fired during the call.
    #[error("Timed out")]
    Timeout,

    #[error("unexpected status code: {0}")]
    BadStatus(u16),

    #[error("request failed: {0}")]
    Request(String),

    #[error("invalid response: {0}")]
    BadResponse(String),
}

/// A remote demand source.
///
/// `call` must return by `deadline`: implementations wrap their network I/O
/// in `timeout_at` so a slow upstream surfaces as `AdapterError::Timeout`
/// instead of holding the auction open.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// The bidder code this adapter is registered under.
    fn code(&self) -> &str;

    /// The cookie family the adapter's user syncs live under.
    fn family_name(&self) -> &str;

    fn usersync_info(&self) -> UsersyncInfo;

    /// When true, users without a live sync are not worth an outbound call.
    fn skip_no_cookies(&self) -> bool {
        false
    }

    async fn call(
        &self,
        deadline: Instant,
        request: &AuctionRequest,
        bidder: &BidderRequest,
    ) -> Result<Vec<Bid>, AdapterError>;
}

/// Process-wide bidder lookup, built once at startup and read-only after.
#[derive(Clone)]
pub struct Registry {
    adapters: Arc<HashMap<String, Arc<dyn Adapter>>>,
}

impl Registry {
    pub fn new(adapters: Vec<Arc<dyn Adapter>>) -> Self {
        Self {
            adapters: Arc::new(
                adapters
                    .into_iter()
                    .map(|adapter| (adapter.code().to_string(), adapter))
                    .collect(),
            ),
        }
    }

    /// Builds one generic HTTP adapter per configured bidder.
    pub fn from_config(
        adapters: &HashMap<String, AdapterConfig>,
    ) -> Result<Self, AuctionError> {
        let mut built: Vec<Arc<dyn Adapter>> = Vec::with_capacity(adapters.len());
        for (code, config) in adapters {
            built.push(Arc::new(HttpAdapter::from_config(code, config)?));
        }
        Ok(Self::new(built))
    }

    pub fn get(&self, code: &str) -> Option<Arc<dyn Adapter>> {
        self.adapters.get(code).cloned()
    }

    /// Supported bidder codes, sorted for stable output.
    pub fn codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = self.adapters.keys().cloned().collect();
        codes.sort();
        codes
    }
}
