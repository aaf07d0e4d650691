//! The Hyper host over a real socket.

use std::time::Duration;

use apex_core::HandlerResult;
use apex_server::{controller, get, post, Dispatcher, HandlerArgs, Server, ServerConfig, Shutdown};
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

async fn start() -> (std::net::SocketAddr, Shutdown, JoinHandle<()>) {
    let root = controller("/user")
        .routes([
            (
                "get",
                get("/:id")
                    .handler(|args: HandlerArgs| async move {
                        HandlerResult::Ok(json!({ "id": args.param("id"), "name": "John Doe" }))
                    })
                    .unwrap(),
            ),
            (
                "echo",
                post("/")
                    .handler(|args: HandlerArgs| async move { HandlerResult::Ok(args.input) })
                    .unwrap(),
            ),
        ])
        .unwrap();
    let dispatcher = Dispatcher::builder().build(root).unwrap();

    let config = ServerConfig::builder()
        .base_path("/api")
        .shutdown_timeout(Duration::from_secs(2))
        .build();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = Server::new(dispatcher, config);
    let handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            server.serve(listener, shutdown).await.unwrap();
        })
    };

    (addr, shutdown, handle)
}

/// Sends one request with `Connection: close` and returns the raw response.
async fn send(addr: std::net::SocketAddr, method: &str, path: &str, body: Option<&str>) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let mut request = format!("{method} {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n");
    if let Some(body) = body {
        request.push_str(&format!(
            "Content-Type: application/json\r\nContent-Length: {}\r\n",
            body.len()
        ));
    }
    request.push_str("\r\n");
    request.push_str(body.unwrap_or_default());

    stream.write_all(request.as_bytes()).await.unwrap();
    let mut raw = String::new();
    stream.read_to_string(&mut raw).await.unwrap();
    raw
}

fn body_of(raw: &str) -> Value {
    let (_, body) = raw.split_once("\r\n\r\n").unwrap();
    serde_json::from_str(body).unwrap()
}

#[tokio::test]
async fn test_get_over_tcp() {
    let (addr, shutdown, handle) = start().await;

    let raw = send(addr, "GET", "/api/user/42", None).await;
    assert!(raw.starts_with("HTTP/1.1 200"), "{raw}");
    assert!(raw.to_ascii_lowercase().contains("x-powered-by: apex"));
    assert!(raw.to_ascii_lowercase().contains("x-request-id: "));
    assert_eq!(body_of(&raw), json!({"id": "42", "name": "John Doe"}));

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_post_json_over_tcp() {
    let (addr, shutdown, handle) = start().await;

    let raw = send(addr, "POST", "/api/user", Some(r#"{"name":"Ada"}"#)).await;
    assert!(raw.starts_with("HTTP/1.1 200"), "{raw}");
    assert_eq!(body_of(&raw), json!({"name": "Ada"}));

    let raw = send(addr, "POST", "/api/user", Some("{not json")).await;
    assert!(raw.starts_with("HTTP/1.1 400"), "{raw}");
    assert_eq!(body_of(&raw)["error"]["code"], "BAD_REQUEST");

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_outside_base_path_is_not_found() {
    let (addr, shutdown, handle) = start().await;

    let raw = send(addr, "GET", "/user/42", None).await;
    assert!(raw.starts_with("HTTP/1.1 404"), "{raw}");
    assert_eq!(body_of(&raw)["error"]["code"], "NOT_FOUND");

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_shutdown_stops_accepting() {
    let (addr, shutdown, handle) = start().await;

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();

    assert!(TcpStream::connect(addr).await.is_err());
}
