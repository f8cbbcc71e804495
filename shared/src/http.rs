use http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_REQUEST_HEADERS, ACCESS_CONTROL_REQUEST_METHOD,
    CACHE_CONTROL, EXPIRES, HeaderMap, HeaderName, HeaderValue, ORIGIN, VARY,
};
use hyper::StatusCode;
use hyper::body::Body;
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use hyper::{Request, Response};
use hyper_util::rt::TokioExecutor;
use hyper_util::rt::TokioIo;
use hyper_util::server::conn::auto::Builder;
use hyper_util::server::graceful::GracefulShutdown;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Accepts connections on `host:port` and hands each one to hyper until the
/// shutdown signal flips, then drains in-flight connections.
///
/// The drain budget bounds how long already-accepted connections may take to
/// finish after the signal; connections still open when it elapses are dropped.
pub async fn run_http_service<S, B, E>(
    host: &str,
    port: u16,
    service: S,
    mut shutdown: watch::Receiver<bool>,
    drain: Duration,
) -> Result<(), E>
where
    S: Service<Request<Incoming>, Response = Response<B>, Error = E> + Send + Sync + 'static,
    S::Future: Send + 'static,
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: std::error::Error + Send + Sync,
    E: From<std::io::Error> + std::error::Error + Send + Sync + 'static,
{
    let listener = TcpListener::bind(format!("{host}:{port}")).await?;
    let service_arc = Arc::new(service);
    let graceful = GracefulShutdown::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, _peer_addr) = accepted?;
                let _ = stream.set_nodelay(true);
                let io = TokioIo::new(stream);
                let svc = service_arc.clone();

                // Hand the connection to hyper; auto-detect h1/h2 on this socket.
                // The graceful watcher lets in-flight requests finish on shutdown.
                let builder = Builder::new(TokioExecutor::new());
                let conn = builder.serve_connection(io, svc);
                let watched = graceful.watch(conn.into_owned());
                tokio::spawn(async move {
                    let _ = watched.await;
                });
            }
            _ = shutdown.changed() => break,
        }
    }

    tokio::select! {
        _ = graceful.shutdown() => {}
        _ = tokio::time::sleep(drain) => {
            tracing::warn!("Drain deadline reached with connections still open");
        }
    }

    Ok(())
}

/// Creates an error response with the status message as body.
pub fn make_error_response(status_code: StatusCode) -> Response<Bytes> {
    let message = status_code
        .canonical_reason()
        .unwrap_or("an error occurred");

    let mut response = Response::new(Bytes::from(message));
    *response.status_mut() = status_code;
    response
}

/// Marks a response as uncacheable by any intermediary or browser.
/// Applied to every response the bid servers emit.
pub fn apply_no_cache_headers(headers: &mut HeaderMap) {
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(
        HeaderName::from_static("pragma"),
        HeaderValue::from_static("no-cache"),
    );
    headers.insert(EXPIRES, HeaderValue::from_static("0"));
}

/// CORS with credentials: the wildcard origin is not allowed by browsers when
/// credentials are in play, so the request origin is echoed back verbatim.
pub fn apply_cors_headers(headers: &mut HeaderMap, origin: Option<&HeaderValue>) {
    let Some(origin) = origin else { return };
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
    headers.insert(
        ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    headers.insert(VARY, HeaderValue::from_static("Origin"));
}

/// Answers a CORS preflight, echoing the requested method and headers.
pub fn preflight_response(request_headers: &HeaderMap) -> Response<Bytes> {
    let mut response = Response::new(Bytes::new());
    *response.status_mut() = StatusCode::NO_CONTENT;

    let headers = response.headers_mut();
    if let Some(method) = request_headers.get(ACCESS_CONTROL_REQUEST_METHOD) {
        headers.insert(ACCESS_CONTROL_ALLOW_METHODS, method.clone());
    }
    if let Some(requested) = request_headers.get(ACCESS_CONTROL_REQUEST_HEADERS) {
        headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, requested.clone());
    }
    apply_cors_headers(headers, request_headers.get(ORIGIN));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_cache_headers() {
        let mut headers = HeaderMap::new();
        apply_no_cache_headers(&mut headers);

        assert_eq!(
            headers.get(CACHE_CONTROL),
            Some(&HeaderValue::from_static(
                "no-cache, no-store, must-revalidate"
            ))
        );
        assert_eq!(
            headers.get("pragma"),
            Some(&HeaderValue::from_static("no-cache"))
        );
        assert_eq!(headers.get(EXPIRES), Some(&HeaderValue::from_static("0")));
    }

    #[test]
    fn test_cors_echoes_origin() {
        let mut headers = HeaderMap::new();
        let origin = HeaderValue::from_static("https://publisher.example.com");
        apply_cors_headers(&mut headers, Some(&origin));

        assert_eq!(headers.get(ACCESS_CONTROL_ALLOW_ORIGIN), Some(&origin));
        assert_eq!(
            headers.get(ACCESS_CONTROL_ALLOW_CREDENTIALS),
            Some(&HeaderValue::from_static("true"))
        );
    }

    #[test]
    fn test_cors_without_origin_adds_nothing() {
        let mut headers = HeaderMap::new();
        apply_cors_headers(&mut headers, None);
        assert!(headers.is_empty());
    }

    #[test]
    fn test_preflight_echoes_requested_method_and_headers() {
        let mut request_headers = HeaderMap::new();
        request_headers.insert(ORIGIN, HeaderValue::from_static("https://pub.example.com"));
        request_headers.insert(
            ACCESS_CONTROL_REQUEST_METHOD,
            HeaderValue::from_static("POST"),
        );
        request_headers.insert(
            ACCESS_CONTROL_REQUEST_HEADERS,
            HeaderValue::from_static("content-type"),
        );

        let response = preflight_response(&request_headers);
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response.headers().get(ACCESS_CONTROL_ALLOW_METHODS),
            Some(&HeaderValue::from_static("POST"))
        );
        assert_eq!(
            response.headers().get(ACCESS_CONTROL_ALLOW_HEADERS),
            Some(&HeaderValue::from_static("content-type"))
        );
    }
}
