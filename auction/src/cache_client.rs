//! Client for the external creative cache.
//!
//! Winning creatives are stored remotely by UUID so the auction response can
//! omit bulky markup; callers fetch it back from the cache service instead.

use crate::http::{HttpClient, OutboundError, new_client, post_json};
use crate::request::Bid;
use hyper::body::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;
use url::Url;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache request timed out")]
    Timeout,

    #[error("cache request failed: {0}")]
    Request(String),

    #[error("unexpected cache status code: {0}")]
    BadStatus(u16),

    #[error("invalid cache response: {0}")]
    BadResponse(String),
}

#[derive(Serialize)]
struct PutRequest<'a> {
    puts: Vec<PutObject<'a>>,
}

#[derive(Serialize)]
struct PutObject<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    value: CreativeValue<'a>,
}

#[derive(Serialize)]
struct CreativeValue<'a> {
    adm: &'a str,
    nurl: &'a str,
    width: u64,
    height: u64,
}

#[derive(Deserialize)]
struct PutResponse {
    responses: Vec<PutResponseObject>,
}

#[derive(Deserialize)]
struct PutResponseObject {
    uuid: String,
}

#[derive(Clone)]
pub struct CacheClient {
    endpoint: Url,
    client: HttpClient,
}

impl CacheClient {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            client: new_client(),
        }
    }

    /// Stores one creative per bid and returns their cache ids, in order.
    pub async fn put(&self, deadline: Instant, bids: &[Bid]) -> Result<Vec<String>, CacheError> {
        let request = PutRequest {
            puts: bids
                .iter()
                .map(|bid| PutObject {
                    kind: "json",
                    value: CreativeValue {
                        adm: &bid.adm,
                        nurl: &bid.nurl,
                        width: bid.width,
                        height: bid.height,
                    },
                })
                .collect(),
        };
        let body =
            serde_json::to_vec(&request).map_err(|e| CacheError::Request(e.to_string()))?;

        let response = post_json(&self.client, &self.endpoint, Bytes::from(body), deadline)
            .await
            .map_err(|e| match e {
                OutboundError::Timeout => CacheError::Timeout,
                OutboundError::Request(msg) => CacheError::Request(msg),
                OutboundError::Body(msg) => CacheError::BadResponse(msg),
            })?;

        if !response.status().is_success() {
            return Err(CacheError::BadStatus(response.status().as_u16()));
        }

        let parsed: PutResponse = serde_json::from_slice(response.body())
            .map_err(|e| CacheError::BadResponse(e.to_string()))?;

        if parsed.responses.len() != bids.len() {
            return Err(CacheError::BadResponse(format!(
                "expected {} cache ids, got {}",
                bids.len(),
                parsed.responses.len()
            )));
        }

        Ok(parsed.responses.into_iter().map(|r| r.uuid).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{start_json_server, start_status_server};
    use std::time::Duration;

    fn banner_bid(adm: &str) -> Bid {
        Bid {
            bid_id: "b1".to_string(),
            ad_unit_code: "u1".to_string(),
            bidder_code: "appnexus".to_string(),
            price: 1.0,
            adm: adm.to_string(),
            width: 300,
            height: 250,
            creative_media_type: "banner".to_string(),
            ..Bid::default()
        }
    }

    #[tokio::test]
    async fn put_returns_uuids_in_order() {
        let port = start_json_server(
            serde_json::json!({
                "responses": [{"uuid": "id-1"}, {"uuid": "id-2"}]
            }),
            Duration::ZERO,
        )
        .await;

        let client = CacheClient::new(
            Url::parse(&format!("http://127.0.0.1:{port}/cache")).unwrap(),
        );
        let bids = vec![banner_bid("<a>"), banner_bid("<b>")];

        let uuids = client
            .put(Instant::now() + Duration::from_secs(5), &bids)
            .await
            .unwrap();
        assert_eq!(uuids, vec!["id-1", "id-2"]);
    }

    #[tokio::test]
    async fn short_response_is_an_error() {
        let port = start_json_server(
            serde_json::json!({"responses": [{"uuid": "id-1"}]}),
            Duration::ZERO,
        )
        .await;

        let client = CacheClient::new(
            Url::parse(&format!("http://127.0.0.1:{port}/cache")).unwrap(),
        );
        let bids = vec![banner_bid("<a>"), banner_bid("<b>")];

        let err = client
            .put(Instant::now() + Duration::from_secs(5), &bids)
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::BadResponse(_)));
    }

    #[tokio::test]
    async fn bad_status_is_an_error() {
        let port = start_status_server(500).await;
        let client = CacheClient::new(
            Url::parse(&format!("http://127.0.0.1:{port}/cache")).unwrap(),
        );

        let err = client
            .put(Instant::now() + Duration::from_secs(5), &[banner_bid("<a>")])
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::BadStatus(500)));
    }
}
