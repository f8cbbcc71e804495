//! `/bidders/params`: every bidder's param schema as one JSON object, built
//! once at startup (see `context::load_bidder_params`).

use crate::api::utils;
use crate::context::ServerContext;
use http::HeaderValue;
use http::header::CONTENT_TYPE;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Response, StatusCode};

pub fn handle(ctx: &ServerContext) -> Response<Full<Bytes>> {
    let mut response = utils::empty_response(StatusCode::OK);
    *response.body_mut() = Full::new(ctx.bidder_params.clone());
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
