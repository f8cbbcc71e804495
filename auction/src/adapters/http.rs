//! The generic HTTP bidder adapter.
//!
//! Every configured bidder speaks the same JSON contract: the adapter POSTs
//! the bidder's slice of the auction to its endpoint and reads back a flat
//! bid list. Bidder-specific params ride along opaquely.

use super::{Adapter, AdapterError};
use crate::config::AdapterConfig;
use crate::errors::AuctionError;
use crate::http::{HttpClient, OutboundError, new_client, post_json};
use crate::request::{AdUnit, AuctionRequest, Bid, BidderRequest, UsersyncInfo};
use async_trait::async_trait;
use hyper::body::Bytes;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use url::Url;

pub struct HttpAdapter {
    code: String,
    family: String,
    endpoint: Url,
    usersync: UsersyncInfo,
    skip_no_cookies: bool,
    client: HttpClient,
}

#[derive(Serialize)]
struct WireRequest<'a> {
    tid: &'a str,
    url: &'a str,
    timeout_millis: u64,
    ad_units: &'a [AdUnit],
}

#[derive(Deserialize)]
struct WireResponse {
    #[serde(default)]
    bids: Vec<Bid>,
}

impl HttpAdapter {
    pub fn from_config(code: &str, config: &AdapterConfig) -> Result<Self, AuctionError> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| AuctionError::AdapterEndpoint(code.to_string(), e.to_string()))?;

        Ok(Self {
            code: code.to_string(),
            family: config.family.clone().unwrap_or_else(|| code.to_string()),
            endpoint,
            usersync: UsersyncInfo {
                url: config.usersync_url.clone(),
                kind: "redirect".to_string(),
                support_cors: false,
            },
            skip_no_cookies: config.skip_no_cookies,
            client: new_client(),
        })
    }
}

#[async_trait]
impl Adapter for HttpAdapter {
    fn code(&self) -> &str {
        &self.code
    }

    fn family_name(&self) -> &str {
        &self.family
    }

    fn usersync_info(&self) -> UsersyncInfo {
        self.usersync.clone()
    }

    fn skip_no_cookies(&self) -> bool {
        self.skip_no_cookies
    }

    async fn call(
        &self,
        deadline: Instant,
        request: &AuctionRequest,
        bidder: &BidderRequest,
    ) -> Result<Vec<Bid>, AdapterError> {
        let wire = WireRequest {
            tid: &request.tid,
            url: &request.url,
            timeout_millis: request.timeout_millis,
            ad_units: &bidder.ad_units,
        };
        let body = serde_json::to_vec(&wire).map_err(|e| AdapterError::Request(e.to_string()))?;

        let response = post_json(&self.client, &self.endpoint, Bytes::from(body), deadline)
            .await
            .map_err(|e| match e {
                OutboundError::Timeout => AdapterError::Timeout,
                OutboundError::Request(msg) => AdapterError::Request(msg),
                OutboundError::Body(msg) => AdapterError::BadResponse(msg),
            })?;

        if !response.status().is_success() {
            return Err(AdapterError::BadStatus(response.status().as_u16()));
        }

        let parsed: WireResponse = serde_json::from_slice(response.body())
            .map_err(|e| AdapterError::BadResponse(e.to_string()))?;

        let mut bids = parsed.bids;
        for bid in &mut bids {
            bid.bidder_code = self.code.clone();
        }
        Ok(bids)
    }
}
