use crate::config::{Config, Credentials, Listener, Secret, Upstreams};
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const CALLER_TOKEN: &str = "validlongtoken1234567890";

/// Config with every upstream pointed at `server` and only the ingestion API
/// key set.
pub fn test_config(server: &MockServer) -> Config {
    let url = |suffix: &str| Some(Url::parse(&format!("{}{suffix}", server.uri())).unwrap());

    Config {
        listener: Listener {
            host: "127.0.0.1".into(),
            port: 3000,
        },
        admin_listener: Listener {
            host: "127.0.0.1".into(),
            port: 3001,
        },
        path: "/api/convert".into(),
        request_timeout_secs: 5,
        max_request_body_bytes: 1024,
        upstreams: Upstreams {
            token_url: url("/token"),
            drive_url: url("/drive/v3/"),
            files_url: url("/v1/files"),
        },
        credentials: Credentials {
            api_key: Some(Secret::new("sk-test")),
            ..Default::default()
        },
    }
}

/// A URL on a local port nothing is listening on.
pub fn unreachable_url(suffix: &str) -> Url {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    Url::parse(&format!("http://127.0.0.1:{port}{suffix}")).unwrap()
}

/// A native document that can only be retrieved through export.
pub async fn mount_drive_document(server: &MockServer, id: &str, name: &str, exported: &[u8]) {
    Mock::given(method("GET"))
        .and(path(format!("/drive/v3/files/{id}")))
        .and(query_param("fields", "name,mimeType"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "name": name,
            "mimeType": "application/vnd.google-apps.document",
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/drive/v3/files/{id}/export")))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_bytes(exported.to_vec()),
        )
        .mount(server)
        .await;
}

pub async fn mount_upload(server: &MockServer, file_id: &str) {
    Mock::given(method("POST"))
        .and(path("/v1/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": file_id,
            "object": "file",
            "purpose": "assistants",
            "status": "processed",
        })))
        .mount(server)
        .await;
}
