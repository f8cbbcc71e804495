//! The `/cookie_sync` endpoint: which of the requested bidders still need a
//! user-sync redirect for this browser.

use crate::api::utils::{json_response, plain_response};
use crate::context::ServerContext;
use crate::cookie::UserSyncCookie;
use crate::metrics;
use crate::metrics_defs::COOKIE_SYNC_REQUESTS;
use crate::request::BidderRequest;
use http::HeaderMap;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Response, StatusCode};
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
struct CookieSyncRequest {
    #[serde(default)]
    uuid: String,
    #[serde(default)]
    bidders: Vec<String>,
}

#[derive(Serialize)]
struct CookieSyncResponse {
    uuid: String,
    status: String,
    bidder_status: Vec<BidderRequest>,
}

pub fn handle(ctx: &ServerContext, headers: &HeaderMap, body: Bytes) -> Response<Full<Bytes>> {
    metrics::mark(&COOKIE_SYNC_REQUESTS);

    let cookie = UserSyncCookie::parse_from_headers(headers, &ctx.host_cookie.cookie_name);
    if !cookie.allow_syncs() {
        return plain_response(StatusCode::UNAUTHORIZED, "User has opted out");
    }

    let request: CookieSyncRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            tracing::debug!(error = %err, "Failed to parse cookie_sync request body");
            return plain_response(StatusCode::BAD_REQUEST, "JSON parse failed");
        }
    };

    let status = if cookie.live_sync_count() == 0 {
        "no_cookie"
    } else {
        "ok"
    };

    let bidder_status = request
        .bidders
        .iter()
        .filter_map(|code| {
            let adapter = ctx.registry.get(code)?;
            if cookie.has_live_sync(adapter.family_name()) {
                return None;
            }
            Some(BidderRequest {
                bidder_code: code.clone(),
                no_cookie: true,
                usersync_info: Some(adapter.usersync_info()),
                ..BidderRequest::default()
            })
        })
        .collect();

    json_response(
        StatusCode::OK,
        &CookieSyncResponse {
            uuid: request.uuid,
            status: status.to_string(),
            bidder_status,
        },
    )
}
