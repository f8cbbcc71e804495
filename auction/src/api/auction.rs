//! The `/auction` endpoint.
//!
//! Request-scoped failures answer 200 with a JSON body whose `status` names
//! the failure; bidder failures never fail the request.

use crate::api::utils::json_response;
use crate::context::ServerContext;
use crate::errors::AuctionError;
use crate::metrics;
use crate::metrics_defs::{
    APP_REQUESTS, ERRORS, NO_COOKIE_REQUESTS, REQUESTS, SAFARI_NO_COOKIE_REQUESTS,
    SAFARI_REQUESTS,
};
use crate::request::parse_auction_request;
use http::HeaderMap;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Response, StatusCode};
use serde::Serialize;
use tokio::time::Instant;

#[derive(Serialize)]
struct ErrorStatus {
    status: String,
}

fn error_status(err: &AuctionError) -> Response<Full<Bytes>> {
    metrics::mark(&ERRORS);
    json_response(
        StatusCode::OK,
        &ErrorStatus {
            status: err.to_string(),
        },
    )
}

pub async fn handle(
    ctx: &ServerContext,
    headers: &HeaderMap,
    body: Bytes,
) -> Response<Full<Bytes>> {
    metrics::mark(&REQUESTS);

    let request = match parse_auction_request(
        &body,
        headers,
        ctx.default_timeout_ms,
        ctx.max_timeout_ms,
        &ctx.host_cookie.cookie_name,
    ) {
        Ok(request) => request,
        Err(err) => {
            tracing::debug!(error = %err, "Failed to parse auction request");
            return error_status(&err);
        }
    };
    let start = request.start;

    if request.is_safari {
        metrics::mark(&SAFARI_REQUESTS);
    }
    if request.app.is_some() {
        metrics::mark(&APP_REQUESTS);
    } else if request.cookie.live_sync_count() == 0 {
        metrics::mark(&NO_COOKIE_REQUESTS);
        if request.is_safari {
            metrics::mark(&SAFARI_NO_COOKIE_REQUESTS);
        }
    }

    let account = match ctx.accounts.get(&request.account_id).await {
        Ok(account) => account,
        Err(err) => {
            tracing::debug!(account = %request.account_id, error = %err, "Invalid account id");
            return error_status(&AuctionError::UnknownAccount);
        }
    };
    metrics::mark_account_request(&account.id);

    let response = match ctx.exchange.hold_auction(request, &account).await {
        Ok(response) => response,
        Err(err) => return error_status(&err),
    };

    let http_response = json_response(StatusCode::OK, &response);
    metrics::record_request_duration(Instant::now() - start);
    http_response
}
