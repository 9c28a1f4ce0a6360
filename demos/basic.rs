//! Minimal tsu-http2 example: text, JSON, errors and a ranged video.
//!
//! Run with:
//!   RUST_LOG=tsu_http2=debug cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/api/mock/text
//!   curl http://localhost:3000/api/mock/json
//!   curl http://localhost:3000/api/users/42?verbose=1
//!   curl -X POST http://localhost:3000/api/users \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"alice"}'
//!   curl -i http://localhost:3000/api/mock/error
//!   curl -i -H 'range: bytes=1-200' http://localhost:3000/api/mock/video
//!
//! Set TSU_HTTP2=1 with TSU_TLS_CERT / TSU_TLS_KEY to serve HTTP/2 over TLS,
//! and TSU_ENV=production to see redacted 5xx bodies.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tsu_http2::{
    Dispatcher, Exception, HttpServer, Request, Response, RouteDefinition, ServerConfig,
    TransformHook, TransformResponseEvent,
};

#[tokio::main]
async fn main() -> Result<(), tsu_http2::Error> {
    tsu_http2::logging::init();

    let mut config = ServerConfig::from_env()?;
    if std::env::var("TSU_HTTP2").is_err() {
        config.http2 = false;
    }
    if config.prefix.is_none() {
        config.prefix = Some("/api".to_owned());
    }

    let mut server = HttpServer::new(config, Dispatcher::new().with(PoweredBy));
    server
        .configure(vec![
            RouteDefinition::get("/mock/text", text),
            RouteDefinition::get("/mock/json", json_body),
            RouteDefinition::get("/mock/error", error),
            RouteDefinition::get("/mock/video", video),
            RouteDefinition::get("/users/:id", get_user),
            RouteDefinition::post("/users", create_user),
        ])
        .await?;
    server.run().await
}

/// Stamps every response produced by an application route.
struct PoweredBy;

#[async_trait]
impl TransformHook for PoweredBy {
    async fn on_response(&self, event: &mut TransformResponseEvent<'_>) -> Result<(), Exception> {
        event.native.set_header("x-powered-by", HttpServer::NAME)
    }
}

async fn text(_req: Request) -> Result<&'static str, Exception> {
    Ok("something")
}

async fn json_body(_req: Request) -> Result<serde_json::Value, Exception> {
    Ok(json!({ "id": "json" }))
}

// 500 with the message in development, redacted in production.
async fn error(_req: Request) -> Result<Response, Exception> {
    Err(Exception::internal("something"))
}

// 206 for `range: bytes=a-b`, 200 otherwise.
async fn video(req: Request) -> Result<Response, Exception> {
    let path = std::env::var("TSU_DEMO_VIDEO").unwrap_or_else(|_| "media/video.mp4".to_owned());
    Response::file(path, req.header("range")).await
}

async fn get_user(req: Request) -> Result<Response, Exception> {
    let id = req.param("id").ok_or(Exception::status(400))?;
    Ok(Response::json(json!({
        "id": id,
        "name": "alice",
        "verbose": req.param("verbose").is_some(),
    })))
}

#[derive(Deserialize)]
struct CreateUser {
    name: String,
}

async fn create_user(req: Request) -> Result<Response, Exception> {
    let input: CreateUser = req.json()?;
    if input.name.trim().is_empty() {
        return Err(Exception::new(422, "name must not be empty").with_field("field", "name"));
    }
    Ok(Response::builder()
        .status(201)
        .header("location", "/api/users/99")
        .json(json!({ "id": "99", "name": input.name })))
}
