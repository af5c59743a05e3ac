//! HTTP front end tests driven through the Axum router with `oneshot`.

use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use tokio::net::TcpListener;
use tower::ServiceExt;

use route_dispatch::config::parse_config;
use route_dispatch::http::server::StartupError;
use route_dispatch::http::{HttpServer, X_REQUEST_ID};
use route_dispatch::lifecycle::Shutdown;

const CONFIG: &str = r#"
[listener]
bind_address = "127.0.0.1:0"
max_body_bytes = 64

[dispatch]
drain_timeout_ms = 200

[[routes]]
name = "hello"
paths = ["/hello/{name}"]
methods = ["GET"]

[routes.response]
body = "hello {name}"

[[routes]]
name = "report"
paths = ["/report"]
methods = ["GET"]
produces = ["application/json", "text/csv"]
scheduler = "io"

[routes.response]
body = "report"

[[routes]]
name = "upload"
paths = ["/upload"]
methods = ["POST"]

[routes.response]
status = 201
body = "stored"
content_type = "text/plain"
"#;

fn server() -> HttpServer {
    HttpServer::new(parse_config(CONFIG).unwrap()).unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, String) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn test_static_route_interpolates_path_variable() {
    let (status, headers, body) = send(
        server().router(),
        Request::builder().uri("/hello/world").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "hello world");
    assert!(headers.contains_key(X_REQUEST_ID));
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let (_, headers, _) = send(
        server().router(),
        Request::builder()
            .uri("/hello/you")
            .header(X_REQUEST_ID, "req-77")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(headers.get(X_REQUEST_ID).unwrap(), "req-77");
}

#[tokio::test]
async fn test_unmatched_request_gets_json_404() {
    let server = server();

    let (status, headers, body) = send(
        server.router(),
        Request::builder().uri("/missing").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(headers
        .get(header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("application/json"));
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["status"], 404);
    assert_eq!(json["path"], "/missing");

    // Known path, wrong method.
    let (status, _, _) = send(
        server.router(),
        Request::builder()
            .method("DELETE")
            .uri("/hello/world")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_produces_negotiation() {
    let server = server();

    let (status, headers, body) = send(
        server.router(),
        Request::builder()
            .uri("/report")
            .header(header::ACCEPT, "text/csv")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "report");
    assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "text/csv");

    let (status, _, _) = send(
        server.router(),
        Request::builder()
            .uri("/report")
            .header(header::ACCEPT, "image/png")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_configured_status_and_body_limit() {
    let server = server();

    let (status, headers, body) = send(
        server.router(),
        Request::builder()
            .method("POST")
            .uri("/upload")
            .body(Body::from("small"))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body, "stored");
    assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "text/plain");

    let (status, _, _) = send(
        server.router(),
        Request::builder()
            .method("POST")
            .uri("/upload")
            .header(header::CONTENT_LENGTH, "1000")
            .body(Body::from(vec![b'x'; 1000]))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_conflicting_config_routes_fail_startup() {
    let config = parse_config(
        r#"
        [[routes]]
        paths = ["/items/{id}"]
        methods = ["GET"]

        [[routes]]
        paths = ["/items/{sku}"]
        methods = ["GET"]
        "#,
    )
    .unwrap();

    let err = HttpServer::new(config).err().unwrap();
    assert!(matches!(err, StartupError::Registry(_)));
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let server = server();
    let dispatcher = server.dispatcher().clone();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

    let shutdown = Shutdown::new();
    let handle = tokio::spawn(server.run(listener, shutdown.subscribe()));

    tokio::time::sleep(Duration::from_millis(20)).await;
    shutdown.trigger();

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("server did not stop")
        .unwrap()
        .unwrap();
    assert!(!dispatcher.is_accepting());
}
