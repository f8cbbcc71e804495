//! Definitions for every metric the server emits.
//!
//! Emission goes through the `metrics` facade (see `crate::metrics`); the
//! recorder is installed by the binary. Adapter-scoped metrics carry
//! `adapter` and `account` tags.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
}

impl MetricType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "Counter",
            MetricType::Gauge => "Gauge",
            MetricType::Histogram => "Histogram",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MetricDef {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub description: &'static str,
}

pub const REQUESTS: MetricDef = MetricDef {
    name: "requests",
    metric_type: MetricType::Counter,
    description: "Auction requests received",
};

pub const APP_REQUESTS: MetricDef = MetricDef {
    name: "requests.app",
    metric_type: MetricType::Counter,
    description: "Auction requests carrying an app context",
};

pub const SAFARI_REQUESTS: MetricDef = MetricDef {
    name: "requests.safari",
    metric_type: MetricType::Counter,
    description: "Auction requests from a Safari user agent",
};

pub const NO_COOKIE_REQUESTS: MetricDef = MetricDef {
    name: "requests.no_cookie",
    metric_type: MetricType::Counter,
    description: "Auction requests with zero live user syncs",
};

pub const SAFARI_NO_COOKIE_REQUESTS: MetricDef = MetricDef {
    name: "requests.safari_no_cookie",
    metric_type: MetricType::Counter,
    description: "Safari auction requests with zero live user syncs",
};

pub const ERRORS: MetricDef = MetricDef {
    name: "requests.errors",
    metric_type: MetricType::Counter,
    description: "Auction requests rejected before or after the fan-out",
};

pub const REQUEST_DURATION: MetricDef = MetricDef {
    name: "request.duration",
    metric_type: MetricType::Histogram,
    description: "Auction request duration in seconds, admission to response",
};

pub const COOKIE_SYNC_REQUESTS: MetricDef = MetricDef {
    name: "cookie_sync.requests",
    metric_type: MetricType::Counter,
    description: "Cookie-sync requests received",
};

pub const ACCOUNT_REQUESTS: MetricDef = MetricDef {
    name: "account.requests",
    metric_type: MetricType::Counter,
    description: "Auction requests per account. Tagged with account.",
};

pub const ADAPTER_REQUESTS: MetricDef = MetricDef {
    name: "adapter.requests",
    metric_type: MetricType::Counter,
    description: "Bidder dispatches considered. Tagged with adapter, account.",
};

pub const ADAPTER_NO_COOKIE: MetricDef = MetricDef {
    name: "adapter.no_cookie",
    metric_type: MetricType::Counter,
    description: "Dispatches lacking a live sync for the adapter family. Tagged with adapter, account.",
};

pub const ADAPTER_TIMEOUTS: MetricDef = MetricDef {
    name: "adapter.timeouts",
    metric_type: MetricType::Counter,
    description: "Bidder calls cut off by the auction deadline. Tagged with adapter, account.",
};

pub const ADAPTER_ERRORS: MetricDef = MetricDef {
    name: "adapter.errors",
    metric_type: MetricType::Counter,
    description: "Bidder calls that failed for any non-deadline reason. Tagged with adapter, account.",
};

pub const ADAPTER_NO_BIDS: MetricDef = MetricDef {
    name: "adapter.no_bids",
    metric_type: MetricType::Counter,
    description: "Bidder calls that returned an empty bid list. Tagged with adapter, account.",
};

pub const ADAPTER_BIDS_RECEIVED: MetricDef = MetricDef {
    name: "adapter.bids_received",
    metric_type: MetricType::Counter,
    description: "Bids surviving size reconciliation. Tagged with adapter, account.",
};

pub const ADAPTER_REQUEST_DURATION: MetricDef = MetricDef {
    name: "adapter.request.duration",
    metric_type: MetricType::Histogram,
    description: "Bidder call duration in seconds. Tagged with adapter, account.",
};

pub const ADAPTER_PRICE: MetricDef = MetricDef {
    name: "adapter.price",
    metric_type: MetricType::Histogram,
    description: "Bid prices in CPM millis. Tagged with adapter, account.",
};

pub const ALL_METRICS: &[MetricDef] = &[
    REQUESTS,
    APP_REQUESTS,
    SAFARI_REQUESTS,
    NO_COOKIE_REQUESTS,
    SAFARI_NO_COOKIE_REQUESTS,
    ERRORS,
    REQUEST_DURATION,
    COOKIE_SYNC_REQUESTS,
    ACCOUNT_REQUESTS,
    ADAPTER_REQUESTS,
    ADAPTER_NO_COOKIE,
    ADAPTER_TIMEOUTS,
    ADAPTER_ERRORS,
    ADAPTER_NO_BIDS,
    ADAPTER_BIDS_RECEIVED,
    ADAPTER_REQUEST_DURATION,
    ADAPTER_PRICE,
];
