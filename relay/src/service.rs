use crate::config::Config;
use crate::errors::{ALLOWED_METHODS, RelayError};
use crate::metrics_defs::{REQUEST_DURATION, REQUESTS, REQUESTS_INFLIGHT};
use crate::orchestrator::Relay;
use crate::protocol::RelayRequestBody;
use http::header::{ALLOW, HeaderValue};
use http_body_util::{BodyExt, Limited};
use hyper::body::Body;
use hyper::service::Service;
use hyper::{Method, Request, Response, StatusCode};
use shared::http::{ResponseBody, empty_body, json_response};
use shared::{counter, gauge, histogram};
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

/// Serves the relay endpoint. Every request gets its own pipeline run; the
/// only shared state is the immutable `Relay`.
#[derive(Clone)]
pub struct RelayService {
    relay: Arc<Relay>,
    path: Arc<str>,
    max_body_bytes: usize,
}

impl RelayService {
    pub fn new(relay: Arc<Relay>, config: &Config) -> Self {
        RelayService {
            relay,
            path: config.path.as_str().into(),
            max_body_bytes: config.max_request_body_bytes,
        }
    }

    async fn handle<B>(&self, req: Request<B>) -> Response<ResponseBody>
    where
        B: Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        if req.uri().path() != &*self.path {
            return RelayError::NotFound.into_response();
        }

        match *req.method() {
            Method::POST => {}
            Method::OPTIONS => {
                let mut response = Response::new(empty_body());
                *response.status_mut() = StatusCode::NO_CONTENT;
                response
                    .headers_mut()
                    .insert(ALLOW, HeaderValue::from_static(ALLOWED_METHODS));
                return response;
            }
            _ => return RelayError::MethodNotAllowed.into_response(),
        }

        let mut request_metrics = RequestMetrics::start();
        let result = self.relay_body(req.into_body()).await;
        request_metrics.outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.code(),
        };

        match result {
            Ok(response) => json_response(StatusCode::OK, &response),
            Err(e) => e.into_response(),
        }
    }

    async fn relay_body<B>(&self, body: B) -> Result<crate::protocol::RelayResponse, RelayError>
    where
        B: Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        // Misconfiguration is reported even for malformed requests
        self.relay.ensure_configured()?;
        let body = read_json_body(body, self.max_body_bytes).await?;
        self.relay.relay(body).await
    }
}

/// Per-request metrics, recorded on drop. A request whose future is dropped
/// before completing (client disconnect) is recorded as `cancelled`.
struct RequestMetrics {
    start: Instant,
    outcome: &'static str,
}

impl RequestMetrics {
    fn start() -> Self {
        gauge!(REQUESTS_INFLIGHT).increment(1.0);
        RequestMetrics {
            start: Instant::now(),
            outcome: "cancelled",
        }
    }
}

impl Drop for RequestMetrics {
    fn drop(&mut self) {
        counter!(REQUESTS, "outcome" => self.outcome).increment(1);
        histogram!(REQUEST_DURATION, "outcome" => self.outcome)
            .record(self.start.elapsed().as_secs_f64());
        gauge!(REQUESTS_INFLIGHT).decrement(1.0);
    }
}

/// Reads at most `limit` bytes of JSON. An empty body is an empty object.
async fn read_json_body<B>(body: B, limit: usize) -> Result<RelayRequestBody, RelayError>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let bytes = Limited::new(body, limit)
        .collect()
        .await
        .map_err(|e| RelayError::missing_parameters(format!("could not read request body: {e}")))?
        .to_bytes();

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(RelayRequestBody::default());
    }

    serde_json::from_slice(&bytes)
        .map_err(|e| RelayError::missing_parameters(format!("invalid JSON body: {e}")))
}

impl<B> Service<Request<B>> for RelayService
where
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    type Response = Response<ResponseBody>;
    type Error = Infallible;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<B>) -> Self::Future {
        let service = self.clone();
        Box::pin(async move { Ok(service.handle(req).await) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Secret;
    use crate::testutils::{CALLER_TOKEN, mount_drive_document, mount_upload, test_config};
    use http_body_util::Full;
    use hyper::body::Bytes;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};
    use serde_json::{Value, json};
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service(config: &Config) -> RelayService {
        RelayService::new(Arc::new(Relay::new(config).unwrap()), config)
    }

    fn request(method: Method, path: &str, body: &str) -> Request<Full<Bytes>> {
        Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json")
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap()
    }

    async fn call(service: &RelayService, req: Request<Full<Bytes>>) -> (StatusCode, Value) {
        let response = service.call(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    #[tokio::test]
    async fn test_method_not_allowed() {
        let server = MockServer::start().await;
        let service = service(&test_config(&server));

        let response = service
            .call(request(Method::GET, "/api/convert", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers().get(ALLOW).unwrap(), "POST, OPTIONS");

        let (_, body) = call(&service, request(Method::PUT, "/api/convert", "{}")).await;
        assert_eq!(body, json!({"error": "method_not_allowed"}));
    }

    #[tokio::test]
    async fn test_options_preflight() {
        let server = MockServer::start().await;
        let service = service(&test_config(&server));

        let response = service
            .call(request(Method::OPTIONS, "/api/convert", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.headers().get(ALLOW).unwrap(), "POST, OPTIONS");
    }

    #[tokio::test]
    async fn test_unknown_path() {
        let server = MockServer::start().await;
        let service = service(&test_config(&server));

        let (status, body) = call(&service, request(Method::POST, "/api/other", "{}")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");
    }

    #[tokio::test]
    async fn test_bad_bodies_are_missing_params() {
        let server = MockServer::start().await;
        let service = service(&test_config(&server));

        for raw in ["", "{}", "not json", "[1, 2]", r#"{"documentId": 42}"#] {
            let (status, body) = call(&service, request(Method::POST, "/api/convert", raw)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "body: {raw:?}");
            assert_eq!(body["error"], "missing_params");
        }

        // Larger than the configured limit
        let oversized = format!(r#"{{"documentId": "{}"}}"#, "a".repeat(2048));
        let (status, _) = call(&service, request(Method::POST, "/api/convert", &oversized)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_access_token_scenario() {
        let server = MockServer::start().await;
        let service = service(&test_config(&server));

        let (status, body) = call(
            &service,
            request(Method::POST, "/api/convert", r#"{"documentId": "abc123"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({"error": "missing_access_token"}));
    }

    #[tokio::test]
    async fn test_misconfigured_scenario() {
        let server = MockServer::start().await;
        let mut config = test_config(&server);
        config.credentials.api_key = None;
        let service = service(&config);

        for raw in ["not json", "{}", r#"{"documentId": "abc123"}"#] {
            let (status, body) = call(&service, request(Method::POST, "/api/convert", raw)).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(body, json!({"error": "server_misconfigured"}));
        }
    }

    #[tokio::test]
    async fn test_success_scenario() {
        let server = MockServer::start().await;
        mount_drive_document(&server, "abc123", "Budget 2024", b"%PDF-1.7").await;
        mount_upload(&server, "file-xyz").await;

        let mut config = test_config(&server);
        config.credentials.refresh_token = Some(Secret::new("unused"));
        let service = service(&config);

        let payload = json!({
            "documentId": "abc123",
            "accessToken": CALLER_TOKEN,
            "exportMimeType": "application/pdf",
            "filename": "budget.pdf",
            "returnBase64": true,
        });
        let (status, body) = call(
            &service,
            request(Method::POST, "/api/convert", &payload.to_string()),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
        assert_eq!(body["mimeType"], "application/pdf");
        assert_eq!(body["filename"], "budget.pdf");
        assert_eq!(body["size"], 8);
        assert_eq!(body["remoteFileId"], "file-xyz");
        assert_eq!(body["upstreamResponse"]["status"], "processed");
        assert_eq!(body["base64"], "JVBERi0xLjc=");
    }

    #[tokio::test]
    async fn test_drive_unauthorized_scenario() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/drive/v3/files/abc123"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Invalid Credentials"))
            .mount(&server)
            .await;
        let service = service(&test_config(&server));

        let payload = json!({"documentId": "abc123", "accessToken": CALLER_TOKEN});
        let (status, body) = call(
            &service,
            request(Method::POST, "/api/convert", &payload.to_string()),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            body,
            json!({"error": "drive_unauthorized", "detail": "Invalid Credentials"})
        );
    }

    #[test]
    fn test_dropped_request_is_still_recorded() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        metrics::with_local_recorder(&recorder, || {
            runtime.block_on(async {
                let server = MockServer::start().await;
                Mock::given(method("GET"))
                    .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
                    .mount(&server)
                    .await;
                let service = service(&test_config(&server));

                let payload = json!({"documentId": "abc123", "accessToken": CALLER_TOKEN});
                let in_flight =
                    service.call(request(Method::POST, "/api/convert", &payload.to_string()));
                let timed_out = tokio::time::timeout(Duration::from_millis(200), in_flight).await;
                assert!(timed_out.is_err());
            })
        });

        let snapshot = snapshotter.snapshot().into_vec();
        let inflight = snapshot
            .iter()
            .find(|(key, ..)| key.key().name() == REQUESTS_INFLIGHT.name)
            .map(|(.., value)| value.clone());
        assert_eq!(inflight, Some(&DebugValue::Gauge(0.0_f64.into())));

        let cancelled = snapshot
            .iter()
            .find(|(key, ..)| {
                key.key().name() == REQUESTS.name
                    && key
                        .key()
                        .labels()
                        .any(|l| l.key() == "outcome" && l.value() == "cancelled")
            })
            .map(|(.., value)| value.clone());
        assert_eq!(cancelled, Some(&DebugValue::Counter(1)));
    }
}
