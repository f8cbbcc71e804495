pub mod accounts;
pub mod adapters;
pub mod api;
pub mod cache_client;
pub mod config;
pub mod context;
pub mod cookie;
pub mod errors;
pub mod exchange;
pub mod http;
pub mod metrics;
pub mod metrics_defs;
pub mod request;
pub mod sizes;
pub mod targeting;

#[cfg(test)]
mod testutils;

use crate::context::ServerContext;
use crate::errors::AuctionError;
use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::ORIGIN;
use hyper::http::request::Parts;
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use shared::http::{
    apply_cors_headers, apply_no_cache_headers, make_error_response, preflight_response,
    run_http_service,
};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;

const SHUTDOWN_DRAIN: Duration = Duration::from_secs(10);

/// Binds the main listener and serves until the shutdown signal flips.
///
/// `ready` is flipped once startup validation (adapter endpoints, account
/// store, schemas) has succeeded, right before the listener starts serving.
pub async fn run(
    config: config::Config,
    shutdown: watch::Receiver<bool>,
    ready: Arc<AtomicBool>,
) -> Result<(), AuctionError> {
    let ctx = ServerContext::from_config(&config).await?;
    tracing::info!(
        host = %config.host,
        port = config.port,
        bidders = ?ctx.registry.codes(),
        "Auction server starting"
    );

    let service = AuctionService::new(Arc::new(ctx));
    ready.store(true, Ordering::Relaxed);
    run_http_service(&config.host, config.port, service, shutdown, SHUTDOWN_DRAIN).await
}

pub struct AuctionService {
    ctx: Arc<ServerContext>,
}

impl AuctionService {
    pub fn new(ctx: Arc<ServerContext>) -> Self {
        Self { ctx }
    }
}

impl Service<Request<Incoming>> for AuctionService {
    type Response = Response<Full<Bytes>>;
    type Error = AuctionError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let ctx = self.ctx.clone();

        Box::pin(async move {
            let (parts, body) = req.into_parts();
            let body = match body.collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(_) => {
                    return Ok(make_error_response(StatusCode::BAD_REQUEST).map(Full::new));
                }
            };

            let mut response = route(&ctx, &parts, body).await;
            apply_no_cache_headers(response.headers_mut());
            apply_cors_headers(response.headers_mut(), parts.headers.get(ORIGIN));
            Ok(response)
        })
    }
}

async fn route(ctx: &ServerContext, parts: &Parts, body: Bytes) -> Response<Full<Bytes>> {
    let path = parts.uri.path();
    match (&parts.method, path) {
        (&Method::POST, "/auction") => api::auction::handle(ctx, &parts.headers, body).await,
        (&Method::POST, "/cookie_sync") => api::cookie_sync::handle(ctx, &parts.headers, body),
        (&Method::POST, "/validate") => api::validate::handle(ctx, body),
        (&Method::GET, "/bidders/params") => api::params::handle(ctx),
        (&Method::GET, "/status") => api::utils::empty_response(StatusCode::OK),
        (&Method::GET, "/getuids") => api::usersync::get_uids(ctx, &parts.headers),
        (&Method::GET, "/setuid") => api::usersync::set_uid(ctx, &parts.headers, &parts.uri),
        (&Method::GET | &Method::POST, "/optout") => {
            api::usersync::opt_out(ctx, &parts.headers, &parts.uri, body)
        }
        (&Method::GET, "/") => api::statics::serve_index(ctx).await,
        (&Method::GET, _) if path.starts_with("/static/") => {
            api::statics::serve_asset(ctx, &path["/static/".len()..]).await
        }
        (&Method::OPTIONS, _) => preflight_response(&parts.headers).map(Full::new),
        _ => make_error_response(StatusCode::NOT_FOUND).map(Full::new),
    }
}
