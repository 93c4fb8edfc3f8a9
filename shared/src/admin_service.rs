use crate::http::{ResponseBody, full_body, make_boxed_error_response};
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use std::convert::Infallible;
use std::future::{Ready, ready};
use std::sync::Arc;

/// Health and readiness endpoints, served on a separate listener from the
/// main service.
///
/// `/health` answers as long as the process is accepting connections.
/// `/ready` consults the readiness probe on every request.
#[derive(Clone)]
pub struct AdminService {
    is_ready: Arc<dyn Fn() -> bool + Send + Sync>,
}

impl AdminService {
    pub fn new<F>(is_ready: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Self {
            is_ready: Arc::new(is_ready),
        }
    }

    fn respond(&self, method: &Method, path: &str) -> Response<ResponseBody> {
        if method != Method::GET && method != Method::HEAD {
            return make_boxed_error_response(StatusCode::METHOD_NOT_ALLOWED);
        }

        match path {
            "/health" => Response::new(full_body("ok\n")),
            "/ready" if (self.is_ready)() => Response::new(full_body("ok\n")),
            "/ready" => make_boxed_error_response(StatusCode::SERVICE_UNAVAILABLE),
            _ => make_boxed_error_response(StatusCode::NOT_FOUND),
        }
    }
}

impl<B> Service<Request<B>> for AdminService {
    type Response = Response<ResponseBody>;
    type Error = Infallible;
    type Future = Ready<Result<Self::Response, Self::Error>>;

    fn call(&self, req: Request<B>) -> Self::Future {
        ready(Ok(self.respond(req.method(), req.uri().path())))
    }
}
