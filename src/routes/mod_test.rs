use super::*;
use crate::config::Config;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

fn temp_assets() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("sensorstream-assets-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("create assets dir");
    std::fs::write(dir.join("index.html"), "<canvas id=\"graph\"></canvas>").expect("write index");
    dir
}

async fn get(config: Config, path: &str) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app(AppState::new(config))).await.expect("serve");
    });

    let mut stream = TcpStream::connect(addr).await.expect("connect");
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.expect("write request");

    let mut response = String::new();
    timeout(Duration::from_secs(2), stream.read_to_string(&mut response))
        .await
        .expect("response timed out")
        .expect("read response");
    response
}

#[tokio::test]
async fn healthz_returns_ok() {
    let response = get(Config::default(), "/healthz").await;
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
}

#[tokio::test]
async fn development_mode_serves_assets_uncached() {
    let config = Config { mode: Mode::Development, assets_dir: temp_assets(), ..Config::default() };
    let response = get(config, "/").await;

    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.to_ascii_lowercase().contains("cache-control: no-store"));
    assert!(response.contains("<canvas id=\"graph\"></canvas>"));
}

#[tokio::test]
async fn production_mode_serves_assets_without_no_store() {
    let config = Config { assets_dir: temp_assets(), ..Config::default() };
    let response = get(config, "/index.html").await;

    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(!response.to_ascii_lowercase().contains("no-store"));
}

#[tokio::test]
async fn missing_asset_is_not_found() {
    let config = Config { assets_dir: temp_assets(), ..Config::default() };
    let response = get(config, "/nope.js").await;
    assert!(response.starts_with("HTTP/1.1 404"), "{response}");
}
