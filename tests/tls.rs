//! End-to-end tests over TLS: HTTP/2 with ALPN fallback, and HTTPS.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use rcgen::{BasicConstraints, CertificateParams, IsCa, KeyPair};
use reqwest::{Client, ClientBuilder, StatusCode, Version};
use serde_json::{Value, json};
use tsu_http2::{Dispatcher, Exception, HttpServer, Request, RouteDefinition, ServerConfig};

/// A throwaway CA plus a `localhost` leaf signed by it, written to disk.
struct Pki {
    _dir: tempfile::TempDir,
    ca_pem: String,
    cert: PathBuf,
    key: PathBuf,
}

fn pki() -> Pki {
    let mut ca_params = CertificateParams::new(Vec::<String>::new()).unwrap();
    ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    let ca_key = KeyPair::generate().unwrap();
    let ca = ca_params.self_signed(&ca_key).unwrap();

    let leaf_key = KeyPair::generate().unwrap();
    let leaf = CertificateParams::new(vec!["localhost".to_owned()])
        .unwrap()
        .signed_by(&leaf_key, &ca, &ca_key)
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let cert = dir.path().join("server.crt.pem");
    let key = dir.path().join("server.key.pem");
    std::fs::write(&cert, leaf.pem()).unwrap();
    std::fs::write(&key, leaf_key.serialize_pem()).unwrap();

    Pki { _dir: dir, ca_pem: ca.pem(), cert, key }
}

async fn text(_req: Request) -> Result<&'static str, Exception> {
    Ok("something")
}

async fn failing(_req: Request) -> Result<&'static str, Exception> {
    Err(Exception::internal("something"))
}

async fn start(config: ServerConfig) -> (HttpServer, SocketAddr) {
    let mut server = HttpServer::new(config, Dispatcher::new());
    server
        .configure(vec![
            RouteDefinition::get("/mock/text", text),
            RouteDefinition::get("/mock/error", failing),
        ])
        .await
        .expect("configure");
    server.start().await.expect("start");
    let addr = server.local_addr().expect("bound address");
    (server, addr)
}

/// Trusts the test CA and pins `localhost` to the bound address.
fn client(pki: &Pki, addr: SocketAddr, tune: impl FnOnce(ClientBuilder) -> ClientBuilder) -> Client {
    let ca = reqwest::Certificate::from_pem(pki.ca_pem.as_bytes()).unwrap();
    let builder = Client::builder()
        .add_root_certificate(ca)
        .resolve("localhost", addr)
        .timeout(Duration::from_secs(10));
    tune(builder).build().expect("client")
}

fn url(addr: SocketAddr, path: &str) -> String {
    format!("https://localhost:{}{path}", addr.port())
}

#[tokio::test]
async fn http2_mode_negotiates_h2() {
    let pki = pki();
    let config = ServerConfig::plain("127.0.0.1", 0)
        .with_prefix("/api")
        .with_http2(&pki.cert, &pki.key);
    let (mut server, addr) = start(config).await;
    let client = client(&pki, addr, |b| b);

    let res = client.get(url(addr, "/api/mock/text")).send().await.unwrap();
    assert_eq!(res.version(), Version::HTTP_2);
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-type"], "text/html; charset=utf-8");
    assert_eq!(res.text().await.unwrap(), "something");

    let res = client.get(url(addr, "/api/mock/error")).send().await.unwrap();
    assert_eq!(res.version(), Version::HTTP_2);
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.json::<Value>().await.unwrap(), json!({ "statusCode": 500, "message": "something" }));

    server.stop().await;
}

#[tokio::test]
async fn http2_mode_falls_back_to_http1() {
    let pki = pki();
    let config = ServerConfig::plain("127.0.0.1", 0)
        .with_prefix("/api")
        .with_http2(&pki.cert, &pki.key);
    let (mut server, addr) = start(config).await;
    let client = client(&pki, addr, ClientBuilder::http1_only);

    let res = client.get(url(addr, "/api/mock/text")).send().await.unwrap();
    assert_eq!(res.version(), Version::HTTP_11);
    assert_eq!(res.text().await.unwrap(), "something");

    server.stop().await;
}

#[tokio::test]
async fn https_mode_serves_http1_only() {
    let pki = pki();
    let config = ServerConfig::plain("127.0.0.1", 0)
        .with_prefix("/api")
        .with_https(&pki.cert, &pki.key);
    let (mut server, addr) = start(config).await;
    let h1 = client(&pki, addr, |b| b);

    let res = h1.get(url(addr, "/api/mock/text")).send().await.unwrap();
    assert_eq!(res.version(), Version::HTTP_11);
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "something");

    // No h2 in the ALPN list: a client that insists on HTTP/2 cannot talk to it.
    let h2_only = client(&pki, addr, ClientBuilder::http2_prior_knowledge);
    assert!(h2_only.get(url(addr, "/api/mock/text")).send().await.is_err());

    server.stop().await;
}
