//! Test helpers: in-process mock upstreams, canned requests, and a server
//! context wired to fixed-outcome adapters.

use crate::accounts::DummyAccountStore;
use crate::adapters::{Adapter, AdapterError, Registry};
use crate::config::HostCookieConfig;
use crate::context::ServerContext;
use crate::cookie::UserSyncCookie;
use crate::exchange::Exchange;
use crate::request::{AdUnit, AuctionRequest, Bid, BidderRequest, Size, UsersyncInfo};
use async_trait::async_trait;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::Instant;

/// Starts a mock upstream that answers every request with `response` as JSON
/// after `delay`. Returns the bound port.
pub async fn start_json_server(response: serde_json::Value, delay: Duration) -> u16 {
    let body = Bytes::from(serde_json::to_vec(&response).unwrap());
    start_server_with(move |_req| {
        let body = body.clone();
        async move {
            tokio::time::sleep(delay).await;
            Ok::<_, Infallible>(Response::new(Full::new(body)))
        }
    })
    .await
}

/// Starts a mock upstream that answers every request with the given status.
pub async fn start_status_server(status: u16) -> u16 {
    start_server_with(move |_req| async move {
        let mut response = Response::new(Full::new(Bytes::new()));
        *response.status_mut() = StatusCode::from_u16(status).unwrap();
        Ok::<_, Infallible>(response)
    })
    .await
}

async fn start_server_with<F, Fut>(handler: F) -> u16
where
    F: Fn(Request<hyper::body::Incoming>) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<Response<Full<Bytes>>, Infallible>> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.unwrap();
            let io = TokioIo::new(stream);
            let handler = handler.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| (handler.clone())(req));
                let _ = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                    .serve_connection(io, service)
                    .await;
            });
        }
    });

    // Give the server a moment to start
    tokio::time::sleep(Duration::from_millis(20)).await;
    port
}

/// Adapter that answers instantly with a canned bid list.
pub struct FixedAdapter {
    pub code: String,
    pub family: String,
    pub bids: Vec<Bid>,
}

#[async_trait]
impl Adapter for FixedAdapter {
    fn code(&self) -> &str {
        &self.code
    }

    fn family_name(&self) -> &str {
        &self.family
    }

    fn usersync_info(&self) -> UsersyncInfo {
        UsersyncInfo {
            url: format!("https://sync.example.com/{}", self.family),
            kind: "redirect".to_string(),
            support_cors: false,
        }
    }

    async fn call(
        &self,
        _deadline: Instant,
        _request: &AuctionRequest,
        bidder: &BidderRequest,
    ) -> Result<Vec<Bid>, AdapterError> {
        let mut bids = self.bids.clone();
        for bid in &mut bids {
            bid.bidder_code = bidder.bidder_code.clone();
        }
        Ok(bids)
    }
}

/// Context with appnexus (family `adnxs`) and rubicon registered, the dummy
/// account store, and no creative cache.
pub async fn test_context() -> ServerContext {
    let registry = Registry::new(vec![
        Arc::new(FixedAdapter {
            code: "appnexus".to_string(),
            family: "adnxs".to_string(),
            bids: vec![Bid {
                bid_id: "b1".to_string(),
                ad_unit_code: "u1".to_string(),
                price: 1.23,
                width: 300,
                height: 250,
                creative_media_type: "banner".to_string(),
                ..Bid::default()
            }],
        }) as Arc<dyn Adapter>,
        Arc::new(FixedAdapter {
            code: "rubicon".to_string(),
            family: "rubicon".to_string(),
            bids: Vec::new(),
        }),
    ]);

    ServerContext {
        registry: registry.clone(),
        accounts: Arc::new(DummyAccountStore {}),
        exchange: Exchange::new(registry, None),
        host_cookie: HostCookieConfig::default(),
        default_timeout_ms: 250,
        max_timeout_ms: 2000,
        request_schema: None,
        bidder_params: Bytes::from_static(b"{}"),
        static_dir: PathBuf::from("static"),
    }
}

/// One-unit, one-bidder auction request with a 300x250 banner slot.
pub fn sample_auction_request() -> AuctionRequest {
    let unit = AdUnit {
        code: "u1".to_string(),
        sizes: vec![Size { w: 300, h: 250 }],
        bid_id: "b1".to_string(),
        params: serde_json::Value::Null,
    };

    AuctionRequest {
        tid: "t-1".to_string(),
        account_id: "pub-1".to_string(),
        url: "https://news.example.com/article".to_string(),
        app: None,
        timeout_millis: 500,
        ad_units: vec![AdUnit {
            bid_id: String::new(),
            ..unit.clone()
        }],
        bidders: vec![BidderRequest {
            bidder_code: "appnexus".to_string(),
            ad_units: vec![unit],
            ..BidderRequest::default()
        }],
        cache_markup: false,
        sort_bids: false,
        max_key_length: 0,
        cookie: UserSyncCookie::default(),
        is_safari: false,
        start: Instant::now(),
    }
}
