//! # tsu-http2
//!
//! An HTTP server adapter for the tsu request/response model. One
//! configuration picks one of three transports:
//!
//! - plain HTTP/1.1
//! - HTTPS (TLS-terminated HTTP/1.1)
//! - HTTP/2 over TLS, with ALPN fallback to HTTP/1.1
//!
//! Handlers never see the transport. They receive a canonical [`Request`]
//! and return a canonical [`Response`] (or anything [`IntoResponse`]);
//! failures are [`Exception`]s. Transform hooks run around every handler,
//! and every fault ends up in one [`ErrorPipeline`], which redacts
//! server-class error bodies in production.
//!
//! Under the hood: [`hyper`] connections, [`matchit`] radix routing,
//! [`tokio_rustls`] for TLS. Buffered text-like bodies are brotli-encoded
//! when the client accepts `br`.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use tsu_http2::{
//!     Dispatcher, Exception, HttpServer, Request, Response, RouteDefinition, ServerConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tsu_http2::Error> {
//!     tsu_http2::logging::init();
//!
//!     let config = ServerConfig::from_env()?.with_prefix("/api");
//!     let mut server = HttpServer::new(config, Dispatcher::new());
//!     server
//!         .configure(vec![
//!             RouteDefinition::get("/users/:id", get_user),
//!             RouteDefinition::get("/video", video),
//!         ])
//!         .await?;
//!     server.run().await
//! }
//!
//! async fn get_user(req: Request) -> Result<Response, Exception> {
//!     let id = req.param("id").ok_or(Exception::status(400))?;
//!     Ok(Response::json(serde_json::json!({ "id": id })))
//! }
//!
//! async fn video(req: Request) -> Result<Response, Exception> {
//!     Response::file("media/video.mp4", req.header("range")).await
//! }
//! ```

mod compression;
mod config;
mod engine;
mod error;
mod exception;
mod handler;
mod hooks;
mod method;
mod pipeline;
mod registrar;
mod request;
mod responder;
mod response;
mod router;
mod server;
mod stream;

pub mod logging;
pub mod range;

pub use config::{DEFAULT_BODY_LIMIT, ServerConfig, TransportMode};
pub use engine::{Engine, NativeRequest, NativeResponse, Payload, ResponseBody};
pub use error::Error;
pub use exception::Exception;
pub use handler::{Handler, NativeHandler, Outcome};
pub use hooks::{Dispatcher, TransformHook, TransformRequestEvent, TransformResponseEvent};
pub use method::Method;
pub use pipeline::ErrorPipeline;
pub use range::ByteRange;
pub use registrar::RouteDefinition;
pub use request::Request;
pub use response::{Content, IntoResponse, Response, ResponseBuilder};
pub use server::HttpServer;
pub use stream::ByteStream;
