use crate::http::make_error_response;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::service::Service;
use hyper::{Request, Response, StatusCode};
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Liveness/readiness endpoints served on the admin port.
///
/// `/health` answers as soon as the process is up; `/ready` flips once the
/// main listener is bound, so rollouts only route traffic to serving pods.
pub struct AdminService<E> {
    ready: Arc<AtomicBool>,
    _error: PhantomData<E>,
}

impl<E> AdminService<E> {
    pub fn new(ready: Arc<AtomicBool>) -> Self {
        Self {
            ready,
            _error: PhantomData,
        }
    }
}

impl<E> Service<Request<Incoming>> for AdminService<E>
where
    E: Send + 'static,
{
    type Response = Response<Full<Bytes>>;
    type Error = E;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let is_ready = self.ready.load(Ordering::Relaxed);

        Box::pin(async move {
            let ok_body = || Full::new(Bytes::from("ok\n"));

            let res = match req.uri().path() {
                "/health" => Response::new(ok_body()),
                "/ready" => match is_ready {
                    true => Response::new(ok_body()),
                    false => make_error_response(StatusCode::SERVICE_UNAVAILABLE).map(Full::new),
                },
                _ => make_error_response(StatusCode::NOT_FOUND).map(Full::new),
            };
            Ok(res)
        })
    }
}
