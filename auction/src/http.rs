use http::header::CONTENT_TYPE;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Request, Response};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use thiserror::Error;
use tokio::time::{Instant, timeout_at};

pub type HttpClient = Client<HttpConnector, Full<Bytes>>;

pub fn new_client() -> HttpClient {
    Client::builder(TokioExecutor::new()).build(HttpConnector::new())
}

#[derive(Error, Debug)]
pub enum OutboundError {
    #[error("timed out")]
    Timeout,

    #[error("request failed: {0}")]
    Request(String),

    #[error("failed to read response body: {0}")]
    Body(String),
}

/// POSTs a JSON body and collects the complete response before `deadline`.
///
/// The deadline bounds the entire request/response cycle: connecting, sending,
/// response headers, and the full body. Not suitable for streaming responses.
pub async fn post_json(
    client: &HttpClient,
    url: &url::Url,
    body: Bytes,
    deadline: Instant,
) -> Result<Response<Bytes>, OutboundError> {
    let request = Request::builder()
        .method(http::Method::POST)
        .uri(url.as_str())
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(body))
        .map_err(|e| OutboundError::Request(e.to_string()))?;

    timeout_at(deadline, async {
        let response = client
            .request(request)
            .await
            .map_err(|e| OutboundError::Request(e.to_string()))?;

        let (parts, body) = response.into_parts();
        let body_bytes = body
            .collect()
            .await
            .map(|collected| collected.to_bytes())
            .map_err(|e| OutboundError::Body(e.to_string()))?;

        Ok(Response::from_parts(parts, body_bytes))
    })
    .await
    .map_err(|_| OutboundError::Timeout)?
}
