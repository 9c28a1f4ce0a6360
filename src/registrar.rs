//! Route definitions and the route registrar.
//!
//! Each [`RouteDefinition`] becomes one composed native handler mounted at
//! `prefix + path`. Per request the composed handler runs:
//!
//! ```text
//! Request::adapt ─▶ on_request hooks ─▶ handler ─▶ on_response hooks ─▶ responder::write
//!        └────────────── any Err ──────────────────────────────────────────▶ ErrorPipeline
//! ```
//!
//! The native handler it produces never fails; the error pipeline is the
//! only sink.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::debug;

use crate::config::ServerConfig;
use crate::engine::{Engine, NativeRequest, NativeResponse};
use crate::error::Error;
use crate::exception::Exception;
use crate::handler::{BoxFuture, BoxedHandler, ErasedNativeHandler, Handler};
use crate::hooks::{Dispatcher, TransformRequestEvent, TransformResponseEvent};
use crate::method::Method;
use crate::pipeline::ErrorPipeline;
use crate::request::Request;
use crate::responder;

/// One application route: verb, declared path and handler.
///
/// ```rust
/// use tsu_http2::{Exception, Method, Request, RouteDefinition};
///
/// async fn text(_req: Request) -> Result<&'static str, Exception> {
///     Ok("something")
/// }
///
/// let route = RouteDefinition::new(Method::Get, "/mock/text", text);
/// assert_eq!(route.path(), "/mock/text");
///
/// let same = RouteDefinition::parse("get", "/mock/text", text).unwrap();
/// assert_eq!(same.method(), Method::Get);
/// ```
#[derive(Clone)]
pub struct RouteDefinition {
    method: Method,
    path: String,
    handler: BoxedHandler,
}

impl RouteDefinition {
    pub fn new(method: Method, path: impl Into<String>, handler: impl Handler) -> Self {
        Self { method, path: path.into(), handler: handler.into_boxed_handler() }
    }

    /// Like [`new`](Self::new) with the verb given as text, as it comes
    /// from route tables loaded at runtime.
    pub fn parse(verb: &str, path: impl Into<String>, handler: impl Handler) -> Result<Self, Error> {
        Ok(Self::new(Method::from_str(verb)?, path, handler))
    }

    pub fn get(path: impl Into<String>, handler: impl Handler) -> Self {
        Self::new(Method::Get, path, handler)
    }

    pub fn post(path: impl Into<String>, handler: impl Handler) -> Self {
        Self::new(Method::Post, path, handler)
    }

    pub fn put(path: impl Into<String>, handler: impl Handler) -> Self {
        Self::new(Method::Put, path, handler)
    }

    pub fn patch(path: impl Into<String>, handler: impl Handler) -> Self {
        Self::new(Method::Patch, path, handler)
    }

    pub fn delete(path: impl Into<String>, handler: impl Handler) -> Self {
        Self::new(Method::Delete, path, handler)
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Debug for RouteDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteDefinition")
            .field("method", &self.method)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Mounts route definitions on an engine.
pub(crate) struct Registrar {
    dispatcher: Arc<Dispatcher>,
    pipeline: Arc<ErrorPipeline>,
    config: Arc<ServerConfig>,
}

impl Registrar {
    pub(crate) fn new(
        dispatcher: Arc<Dispatcher>,
        pipeline: Arc<ErrorPipeline>,
        config: Arc<ServerConfig>,
    ) -> Self {
        Self { dispatcher, pipeline, config }
    }

    pub(crate) fn register(&self, engine: &mut Engine, route: RouteDefinition) -> Result<(), Error> {
        let mounted = self.config.mount_path(&route.path);
        debug!(method = %route.method, path = %mounted, "registering route");

        let composed = Composed {
            handler: route.handler,
            declared: Arc::from(route.path.as_str()),
            dispatcher: Arc::clone(&self.dispatcher),
            pipeline: Arc::clone(&self.pipeline),
        };
        engine.mount(route.method, &mounted, Arc::new(composed))
    }
}

/// The per-route native handler.
struct Composed {
    handler: BoxedHandler,
    declared: Arc<str>,
    dispatcher: Arc<Dispatcher>,
    pipeline: Arc<ErrorPipeline>,
}

impl ErasedNativeHandler for Composed {
    fn call(&self, native: NativeRequest) -> BoxFuture<Result<NativeResponse, Exception>> {
        let handler = Arc::clone(&self.handler);
        let declared = Arc::clone(&self.declared);
        let dispatcher = Arc::clone(&self.dispatcher);
        let pipeline = Arc::clone(&self.pipeline);

        Box::pin(async move {
            let mut res = NativeResponse::new();
            let outcome = run(&handler, &declared, &dispatcher, &pipeline, &native, &mut res).await;
            if let Err(exception) = outcome {
                pipeline.handle(exception, &mut res);
            }
            Ok(res)
        })
    }
}

async fn run(
    handler: &BoxedHandler,
    declared: &str,
    dispatcher: &Dispatcher,
    pipeline: &Arc<ErrorPipeline>,
    native: &NativeRequest,
    res: &mut NativeResponse,
) -> Result<(), Exception> {
    let mut request = Request::adapt(native, declared);
    dispatcher
        .transform_request(&mut TransformRequestEvent { native, request: &mut request })
        .await?;

    let mut response = handler.call(request).await?;

    dispatcher
        .transform_response(&mut TransformResponseEvent { response: &mut response, native: res })
        .await?;

    responder::write(response, res, pipeline).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::TransformHook;
    use crate::response::Response;
    use async_trait::async_trait;
    use bytes::Bytes;
    use http_body_util::{BodyExt, Empty};
    use serde_json::{json, Value};

    async fn json_id(req: Request) -> Result<Response, Exception> {
        Ok(Response::json(json!({ "id": req.param("id") })))
    }

    async fn fail(_req: Request) -> Result<Response, Exception> {
        Err(Exception::internal("something"))
    }

    struct Stamp;

    #[async_trait]
    impl TransformHook for Stamp {
        async fn on_request(&self, event: &mut TransformRequestEvent<'_>) -> Result<(), Exception> {
            event.request.set_param("id", "from-hook");
            Ok(())
        }

        async fn on_response(&self, event: &mut TransformResponseEvent<'_>) -> Result<(), Exception> {
            event.native.set_header("x-stamped", "1")?;
            event.response.set_status(202);
            Ok(())
        }
    }

    fn engine_with(config: ServerConfig, dispatcher: Dispatcher, routes: Vec<RouteDefinition>) -> Engine {
        let pipeline = Arc::new(ErrorPipeline::new(config.production));
        let mut engine = Engine::new(Arc::clone(&pipeline), config.body_limit);
        let registrar = Registrar::new(Arc::new(dispatcher), pipeline, Arc::new(config));
        for route in routes {
            registrar.register(&mut engine, route).unwrap();
        }
        engine
    }

    async fn get(engine: &Engine, uri: &str) -> (http::response::Parts, Value) {
        let res = engine.dispatch(http::Request::get(uri).body(Empty::<Bytes>::new()).unwrap()).await;
        let (parts, body) = res.into_parts();
        let bytes = body.collect().await.unwrap().to_bytes();
        (parts, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[test]
    fn unknown_verb_is_a_configuration_error() {
        let err = RouteDefinition::parse("brew", "/coffee", fail).unwrap_err();
        assert!(matches!(err, Error::UnknownMethod(ref v) if v == "brew"));
    }

    #[tokio::test]
    async fn routes_mount_under_the_prefix() {
        let config = ServerConfig::plain("127.0.0.1", 0).with_prefix("/api");
        let engine = engine_with(config, Dispatcher::new(), vec![RouteDefinition::get("/users/:id", json_id)]);

        let (res, body) = get(&engine, "/api/users/42").await;
        assert_eq!(res.status, 200);
        assert_eq!(body, json!({ "id": "42" }));

        let (res, _) = get(&engine, "/users/42").await;
        assert_eq!(res.status, 404);
    }

    #[tokio::test]
    async fn hooks_wrap_the_handler() {
        let engine = engine_with(
            ServerConfig::plain("127.0.0.1", 0),
            Dispatcher::new().with(Stamp),
            vec![RouteDefinition::get("/users/{id}", json_id)],
        );

        let (res, body) = get(&engine, "/users/42").await;
        assert_eq!(res.status, 202);
        assert_eq!(res.headers["x-stamped"], "1");
        assert_eq!(body, json!({ "id": "from-hook" }));
    }

    #[tokio::test]
    async fn handler_faults_are_redacted_in_production() {
        let config = ServerConfig::plain("127.0.0.1", 0).with_production(true);
        let engine = engine_with(config, Dispatcher::new(), vec![RouteDefinition::get("/mock/error", fail)]);

        let (res, body) = get(&engine, "/mock/error").await;
        assert_eq!(res.status, 500);
        assert_eq!(body, json!({ "statusCode": 500, "message": "Internal Server Error" }));
    }
}
