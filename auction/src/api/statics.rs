//! Static asset serving: the index page and files under the static root.

use crate::api::utils::plain_response;
use crate::context::ServerContext;
use http::HeaderValue;
use http::header::CONTENT_TYPE;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Response, StatusCode};
use std::path::{Component, Path, PathBuf};

pub async fn serve_index(ctx: &ServerContext) -> Response<Full<Bytes>> {
    serve_file(&ctx.static_dir.join("index.html")).await
}

/// Serves `/static/<rest>`. Only plain path components are accepted, so a
/// crafted path can never escape the static root.
pub async fn serve_asset(ctx: &ServerContext, rest: &str) -> Response<Full<Bytes>> {
    let relative = PathBuf::from(rest);
    if relative
        .components()
        .any(|component| !matches!(component, Component::Normal(_)))
    {
        return plain_response(StatusCode::NOT_FOUND, "Not Found");
    }
    serve_file(&ctx.static_dir.join(relative)).await
}

async fn serve_file(path: &Path) -> Response<Full<Bytes>> {
    let body = match tokio::fs::read(path).await {
        Ok(body) => body,
        Err(_) => return plain_response(StatusCode::NOT_FOUND, "Not Found"),
    };

    let mut response = Response::new(Full::new(Bytes::from(body)));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, content_type_for(path));
    response
}

fn content_type_for(path: &Path) -> HeaderValue {
    let value = match path.extension().and_then(|ext| ext.to_str()) {
        Some("html") => "text/html; charset=utf-8",
        Some("json") => "application/json",
        Some("js") => "text/javascript",
        Some("css") => "text/css",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    };
    HeaderValue::from_static(value)
}
