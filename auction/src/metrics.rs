//! Emission helpers over the global `metrics` recorder.
//!
//! Per-bidder emitters are built before a task is dispatched and moved into
//! it, so tasks never reach back into shared request state.

use crate::metrics_defs::{
    ACCOUNT_REQUESTS, ADAPTER_BIDS_RECEIVED, ADAPTER_ERRORS, ADAPTER_NO_BIDS, ADAPTER_NO_COOKIE,
    ADAPTER_PRICE, ADAPTER_REQUEST_DURATION, ADAPTER_REQUESTS, ADAPTER_TIMEOUTS, MetricDef,
    REQUEST_DURATION,
};
use std::time::Duration;

/// Bumps an untagged counter.
pub fn mark(def: &MetricDef) {
    metrics::counter!(def.name).increment(1);
}

pub fn mark_account_request(account: &str) {
    metrics::counter!(ACCOUNT_REQUESTS.name, "account" => account.to_string()).increment(1);
}

pub fn record_request_duration(elapsed: Duration) {
    metrics::histogram!(REQUEST_DURATION.name).record(elapsed.as_secs_f64());
}

/// Tag set for one bidder within one auction.
#[derive(Clone)]
pub struct AdapterLabels {
    adapter: String,
    account: String,
}

impl AdapterLabels {
    pub fn new(adapter: &str, account: &str) -> Self {
        Self {
            adapter: adapter.to_string(),
            account: account.to_string(),
        }
    }

    pub fn request(&self) {
        self.incr(&ADAPTER_REQUESTS);
    }

    pub fn no_cookie(&self) {
        self.incr(&ADAPTER_NO_COOKIE);
    }

    pub fn timeout(&self) {
        self.incr(&ADAPTER_TIMEOUTS);
    }

    pub fn error(&self) {
        self.incr(&ADAPTER_ERRORS);
    }

    pub fn no_bid(&self) {
        self.incr(&ADAPTER_NO_BIDS);
    }

    pub fn bids_received(&self, count: u64) {
        metrics::counter!(
            ADAPTER_BIDS_RECEIVED.name,
            "adapter" => self.adapter.clone(),
            "account" => self.account.clone(),
        )
        .increment(count);
    }

    pub fn request_duration(&self, elapsed: Duration) {
        metrics::histogram!(
            ADAPTER_REQUEST_DURATION.name,
            "adapter" => self.adapter.clone(),
            "account" => self.account.clone(),
        )
        .record(elapsed.as_secs_f64());
    }

    /// Prices are recorded in CPM millis, matching the exporter's integer buckets.
    pub fn price(&self, cpm_millis: f64) {
        metrics::histogram!(
            ADAPTER_PRICE.name,
            "adapter" => self.adapter.clone(),
            "account" => self.account.clone(),
        )
        .record(cpm_millis);
    }

    fn incr(&self, def: &MetricDef) {
        metrics::counter!(
            def.name,
            "adapter" => self.adapter.clone(),
            "account" => self.account.clone(),
        )
        .increment(1);
    }
}
