//! The auction data model and the inbound request parser.
//!
//! Parsing decodes the JSON body, applies the timeout policy, groups ad units
//! into one `BidderRequest` per distinct bidder code (first-appearance order),
//! and attaches the user-sync cookie plus the monotonic admission timestamp.

use crate::cookie::UserSyncCookie;
use crate::errors::AuctionError;
use http::HeaderMap;
use http::header::USER_AGENT;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub w: u64,
    pub h: u64,
}

/// One slot on the page, as seen by one bidder.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdUnit {
    pub code: String,
    #[serde(default)]
    pub sizes: Vec<Size>,
    #[serde(default)]
    pub bid_id: String,
    #[serde(default, skip_serializing_if = "JsonValue::is_null")]
    pub params: JsonValue,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UsersyncInfo {
    pub url: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub support_cors: bool,
}

/// Per-bidder slice of the auction plus the diagnostics filled in while it
/// runs. Exactly one of these survives to the response for every bidder in
/// the request, whatever happened to the dispatch.
#[derive(Clone, Debug, Default, Serialize)]
pub struct BidderRequest {
    #[serde(rename = "bidder")]
    pub bidder_code: String,
    #[serde(skip)]
    pub ad_units: Vec<AdUnit>,
    #[serde(rename = "response_time_ms", skip_serializing_if = "u64_is_zero")]
    pub response_time_ms: u64,
    #[serde(rename = "num_bids", skip_serializing_if = "usize_is_zero")]
    pub num_bids: usize,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
    #[serde(rename = "no_cookie", skip_serializing_if = "std::ops::Not::not")]
    pub no_cookie: bool,
    #[serde(rename = "no_bid", skip_serializing_if = "std::ops::Not::not")]
    pub no_bid: bool,
    #[serde(rename = "usersync", skip_serializing_if = "Option::is_none")]
    pub usersync_info: Option<UsersyncInfo>,
}

/// A bid as returned by an adapter and carried through post-processing.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Bid {
    pub bid_id: String,
    #[serde(rename = "code")]
    pub ad_unit_code: String,
    // Stamped by the adapter on the way in, so bidders need not echo it.
    #[serde(default, rename = "bidder")]
    pub bidder_code: String,
    pub price: f64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub adm: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub nurl: String,
    #[serde(default, skip_serializing_if = "u64_is_zero")]
    pub width: u64,
    #[serde(default, skip_serializing_if = "u64_is_zero")]
    pub height: u64,
    #[serde(
        default,
        rename = "media_type",
        skip_serializing_if = "String::is_empty"
    )]
    pub creative_media_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cache_id: String,
    #[serde(default, rename = "response_time_ms", skip_serializing_if = "u64_is_zero")]
    pub response_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ad_server_targeting: Option<BTreeMap<String, String>>,
}

pub const MEDIA_TYPE_BANNER: &str = "banner";

/// A validated auction request, owned by its handler task for the duration
/// of the auction.
#[derive(Debug)]
pub struct AuctionRequest {
    pub tid: String,
    pub account_id: String,
    pub url: String,
    pub app: Option<JsonValue>,
    pub timeout_millis: u64,
    pub ad_units: Vec<AdUnit>,
    pub bidders: Vec<BidderRequest>,
    pub cache_markup: bool,
    pub sort_bids: bool,
    pub max_key_length: usize,
    pub cookie: UserSyncCookie,
    pub is_safari: bool,
    pub start: Instant,
}

impl AuctionRequest {
    /// Absolute expiry for every bidder call in this auction.
    pub fn deadline(&self) -> Instant {
        self.start + Duration::from_millis(self.timeout_millis)
    }
}

#[derive(Deserialize)]
struct RawRequest {
    #[serde(default)]
    tid: String,
    #[serde(default)]
    account_id: String,
    #[serde(default)]
    timeout_millis: u64,
    #[serde(default)]
    url: String,
    #[serde(default)]
    app: Option<JsonValue>,
    #[serde(default)]
    cache_markup: u8,
    #[serde(default)]
    sort_bids: u8,
    #[serde(default)]
    max_key_length: usize,
    #[serde(default)]
    ad_units: Vec<RawAdUnit>,
}

#[derive(Deserialize)]
struct RawAdUnit {
    code: String,
    #[serde(default)]
    sizes: Vec<Size>,
    #[serde(default)]
    bids: Vec<RawAdUnitBid>,
}

#[derive(Deserialize)]
struct RawAdUnitBid {
    bidder: String,
    #[serde(default)]
    bid_id: String,
    #[serde(default)]
    params: JsonValue,
}

/// Decodes and validates an auction request body.
///
/// `timeout_millis` of zero or beyond the policy cap falls back to the
/// configured default, so a caller can never pin a worker past the cap.
pub fn parse_auction_request(
    body: &[u8],
    headers: &HeaderMap,
    default_timeout_ms: u64,
    max_timeout_ms: u64,
    cookie_name: &str,
) -> Result<AuctionRequest, AuctionError> {
    let start = Instant::now();
    let raw: RawRequest =
        serde_json::from_slice(body).map_err(|e| AuctionError::BadRequest(e.to_string()))?;

    if raw.account_id.is_empty() {
        return Err(AuctionError::BadRequest("No account id".to_string()));
    }
    if raw.ad_units.is_empty() {
        return Err(AuctionError::BadRequest("No ad units".to_string()));
    }

    let timeout_millis = if raw.timeout_millis == 0 || raw.timeout_millis > max_timeout_ms {
        default_timeout_ms
    } else {
        raw.timeout_millis
    };

    let mut ad_units = Vec::with_capacity(raw.ad_units.len());
    let mut bidders: Vec<BidderRequest> = Vec::new();
    let mut seat_by_code: HashMap<String, usize> = HashMap::new();

    for unit in raw.ad_units {
        ad_units.push(AdUnit {
            code: unit.code.clone(),
            sizes: unit.sizes.clone(),
            bid_id: String::new(),
            params: JsonValue::Null,
        });

        for bid in unit.bids {
            let bid_id = if bid.bid_id.is_empty() {
                uuid::Uuid::new_v4().simple().to_string()
            } else {
                bid.bid_id
            };

            let seat = *seat_by_code.entry(bid.bidder.clone()).or_insert_with(|| {
                bidders.push(BidderRequest {
                    bidder_code: bid.bidder.clone(),
                    ..BidderRequest::default()
                });
                bidders.len() - 1
            });

            bidders[seat].ad_units.push(AdUnit {
                code: unit.code.clone(),
                sizes: unit.sizes.clone(),
                bid_id,
                params: bid.params,
            });
        }
    }

    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    Ok(AuctionRequest {
        tid: raw.tid,
        account_id: raw.account_id,
        url: raw.url,
        app: raw.app,
        timeout_millis,
        ad_units,
        bidders,
        cache_markup: raw.cache_markup == 1,
        sort_bids: raw.sort_bids == 1,
        max_key_length: raw.max_key_length,
        cookie: UserSyncCookie::parse_from_headers(headers, cookie_name),
        is_safari: is_safari(user_agent),
        start,
    })
}

fn is_safari(user_agent: &str) -> bool {
    woothee::parser::Parser::new()
        .parse(user_agent)
        .is_some_and(|ua| ua.name == "Safari")
}

fn u64_is_zero(n: &u64) -> bool {
    *n == 0
}

fn usize_is_zero(n: &usize) -> bool {
    *n == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookie::DEFAULT_COOKIE_NAME;
    use http::HeaderValue;

    const SAFARI_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
        AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15";
    const CHROME_UA: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
        (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

    fn request_body() -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "tid": "t-1",
            "account_id": "pub-1",
            "timeout_millis": 500,
            "url": "https://news.example.com/article",
            "sort_bids": 1,
            "ad_units": [
                {
                    "code": "u1",
                    "sizes": [{"w": 300, "h": 250}],
                    "bids": [
                        {"bidder": "appnexus", "bid_id": "b1", "params": {"placement": 7}},
                        {"bidder": "rubicon", "bid_id": "b2"}
                    ]
                },
                {
                    "code": "u2",
                    "sizes": [{"w": 728, "h": 90}, {"w": 970, "h": 250}],
                    "bids": [
                        {"bidder": "appnexus", "bid_id": "b3"}
                    ]
                }
            ]
        }))
        .unwrap()
    }

    fn parse(body: &[u8], headers: &HeaderMap) -> Result<AuctionRequest, AuctionError> {
        parse_auction_request(body, headers, 250, 2000, DEFAULT_COOKIE_NAME)
    }

    #[test]
    fn parses_and_groups_by_bidder_in_first_appearance_order() {
        let req = parse(&request_body(), &HeaderMap::new()).unwrap();

        assert_eq!(req.tid, "t-1");
        assert_eq!(req.timeout_millis, 500);
        assert!(req.sort_bids);
        assert!(!req.cache_markup);
        assert_eq!(req.ad_units.len(), 2);

        let codes: Vec<_> = req.bidders.iter().map(|b| b.bidder_code.as_str()).collect();
        assert_eq!(codes, vec!["appnexus", "rubicon"]);

        let appnexus = &req.bidders[0];
        assert_eq!(appnexus.ad_units.len(), 2);
        assert_eq!(appnexus.ad_units[0].code, "u1");
        assert_eq!(appnexus.ad_units[0].bid_id, "b1");
        assert_eq!(appnexus.ad_units[0].params["placement"], 7);
        assert_eq!(appnexus.ad_units[1].code, "u2");

        let rubicon = &req.bidders[1];
        assert_eq!(rubicon.ad_units.len(), 1);
        assert_eq!(rubicon.ad_units[0].sizes, vec![Size { w: 300, h: 250 }]);
    }

    #[test]
    fn malformed_body_is_bad_request() {
        let err = parse(b"{not json", &HeaderMap::new()).unwrap_err();
        assert!(matches!(err, AuctionError::BadRequest(_)));
    }

    #[test]
    fn missing_account_id_is_rejected() {
        let body = serde_json::to_vec(&serde_json::json!({
            "ad_units": [{"code": "u1", "bids": [{"bidder": "appnexus"}]}]
        }))
        .unwrap();
        let err = parse(&body, &HeaderMap::new()).unwrap_err();
        assert!(matches!(err, AuctionError::BadRequest(_)));
    }

    #[test]
    fn empty_ad_units_are_rejected() {
        let body = serde_json::to_vec(&serde_json::json!({
            "account_id": "pub-1",
            "ad_units": []
        }))
        .unwrap();
        let err = parse(&body, &HeaderMap::new()).unwrap_err();
        assert!(matches!(err, AuctionError::BadRequest(_)));
    }

    #[test]
    fn timeout_is_clamped_to_policy() {
        let mut value: serde_json::Value = serde_json::from_slice(&request_body()).unwrap();

        value["timeout_millis"] = 0.into();
        let req = parse(&serde_json::to_vec(&value).unwrap(), &HeaderMap::new()).unwrap();
        assert_eq!(req.timeout_millis, 250);

        value["timeout_millis"] = 60_000.into();
        let req = parse(&serde_json::to_vec(&value).unwrap(), &HeaderMap::new()).unwrap();
        assert_eq!(req.timeout_millis, 250);

        value["timeout_millis"] = 1999.into();
        let req = parse(&serde_json::to_vec(&value).unwrap(), &HeaderMap::new()).unwrap();
        assert_eq!(req.timeout_millis, 1999);
    }

    #[test]
    fn empty_bid_id_gets_generated() {
        let body = serde_json::to_vec(&serde_json::json!({
            "account_id": "pub-1",
            "ad_units": [{"code": "u1", "bids": [{"bidder": "appnexus"}]}]
        }))
        .unwrap();
        let req = parse(&body, &HeaderMap::new()).unwrap();
        assert!(!req.bidders[0].ad_units[0].bid_id.is_empty());
    }

    #[test]
    fn detects_safari_but_not_chrome() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(SAFARI_UA));
        assert!(parse(&request_body(), &headers).unwrap().is_safari);

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(CHROME_UA));
        assert!(!parse(&request_body(), &headers).unwrap().is_safari);
    }

    #[test]
    fn bidder_status_serializes_sparse_fields() {
        let bidder = BidderRequest {
            bidder_code: "appnexus".to_string(),
            error: "Timed out".to_string(),
            ..BidderRequest::default()
        };
        let json = serde_json::to_value(&bidder).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"bidder": "appnexus", "error": "Timed out"})
        );
    }
}
