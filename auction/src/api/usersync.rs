//! User-sync endpoints: reading, setting, and opting out of the sync cookie.

use crate::api::utils::{empty_response, json_response, plain_response};
use crate::context::ServerContext;
use crate::cookie::UserSyncCookie;
use http::header::{LOCATION, SET_COOKIE};
use http::{HeaderMap, HeaderValue, Uri};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Response, StatusCode};
use std::collections::HashMap;

// 1x1 transparent GIF answered by /setuid so it can be used as a sync pixel.
const PIXEL_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];

fn query_params(uri: &Uri) -> HashMap<String, String> {
    form_params(uri.query().unwrap_or_default().as_bytes())
}

fn form_params(raw: &[u8]) -> HashMap<String, String> {
    url::form_urlencoded::parse(raw)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect()
}

fn set_cookie_header(ctx: &ServerContext, cookie: &UserSyncCookie) -> Option<HeaderValue> {
    let value = cookie.to_set_cookie(&ctx.host_cookie.cookie_name, &ctx.host_cookie.domain);
    HeaderValue::from_str(&value).ok()
}

/// `GET /getuids`: the current sync state, as JSON.
pub fn get_uids(ctx: &ServerContext, headers: &HeaderMap) -> Response<Full<Bytes>> {
    let cookie = UserSyncCookie::parse_from_headers(headers, &ctx.host_cookie.cookie_name);
    json_response(StatusCode::OK, &cookie)
}

/// `GET /setuid?bidder=<family>&uid=<id>`: records (or clears) one family's
/// uid and answers with a tracking pixel. Opted-out users are refused.
pub fn set_uid(ctx: &ServerContext, headers: &HeaderMap, uri: &Uri) -> Response<Full<Bytes>> {
    let mut cookie = UserSyncCookie::parse_from_headers(headers, &ctx.host_cookie.cookie_name);
    if !cookie.allow_syncs() {
        return plain_response(StatusCode::UNAUTHORIZED, "User has opted out");
    }

    let params = query_params(uri);
    let Some(family) = params.get("bidder").filter(|family| !family.is_empty()) else {
        return plain_response(StatusCode::BAD_REQUEST, "\"bidder\" query param is required");
    };
    cookie.set_uid(family, params.get("uid").map(String::as_str).unwrap_or(""));

    let mut response = Response::new(Full::new(Bytes::from_static(PIXEL_GIF)));
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        HeaderValue::from_static("image/gif"),
    );
    if let Some(header) = set_cookie_header(ctx, &cookie) {
        response.headers_mut().insert(SET_COOKIE, header);
    }
    response
}

/// `GET|POST /optout`: flips the opt-out flag (an empty `optout` param opts
/// back in) and redirects to the configured landing page.
pub fn opt_out(
    ctx: &ServerContext,
    headers: &HeaderMap,
    uri: &Uri,
    body: Bytes,
) -> Response<Full<Bytes>> {
    let mut params = query_params(uri);
    if params.is_empty() {
        params = form_params(&body);
    }
    let opting_out = params
        .get("optout")
        .is_some_and(|value| !value.is_empty());

    let mut cookie = UserSyncCookie::parse_from_headers(headers, &ctx.host_cookie.cookie_name);
    cookie.set_opt_out(opting_out);

    let destination = if opting_out {
        &ctx.host_cookie.opt_out_url
    } else {
        &ctx.host_cookie.opt_in_url
    };

    let mut response = if destination.is_empty() {
        empty_response(StatusCode::OK)
    } else {
        let mut redirect = empty_response(StatusCode::MOVED_PERMANENTLY);
        if let Ok(location) = HeaderValue::from_str(destination) {
            redirect.headers_mut().insert(LOCATION, location);
        }
        redirect
    };
    if let Some(header) = set_cookie_header(ctx, &cookie) {
        response.headers_mut().insert(SET_COOKIE, header);
    }
    response
}
