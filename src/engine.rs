//! The native layer: what the server engine sees before and after the
//! canonical adapters run.
//!
//! [`Engine`] owns the route table. For every inbound request it looks up
//! a native handler, buffers and parses the body (the engine's built-in
//! body parsing), runs the handler, and turns the resulting
//! [`NativeResponse`] into a hyper response. Any [`Exception`] a native
//! handler returns is written by the error pipeline.

use std::io;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{
    ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, HeaderMap,
    HeaderName, HeaderValue, VARY,
};
use http::StatusCode;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, LengthLimitError, Limited, StreamBody};
use hyper::body::Body;
use serde_json::{Map, Value};
use tracing::debug;

use crate::compression;
use crate::error::Error;
use crate::exception::Exception;
use crate::handler::{BoxedNativeHandler, NativeHandler};
use crate::method::Method;
use crate::pipeline::ErrorPipeline;
use crate::router::Router;
use crate::stream::{ByteStream, ObservedStream};

/// Body type of every response the engine produces.
pub type ResponseBody = UnsyncBoxBody<Bytes, io::Error>;

const JSON_UTF8: &str = "application/json; charset=utf-8";

// ── Payload ───────────────────────────────────────────────────────────────────

/// A parsed request body.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Payload {
    #[default]
    Empty,
    /// `application/json`, `*+json`, and urlencoded forms (as an object).
    Json(Value),
    /// `text/*`.
    Text(String),
    /// Anything else.
    Binary(Bytes),
}

impl Payload {
    /// Parses `bytes` according to the request's content type.
    ///
    /// Malformed JSON is a `400`.
    pub fn parse(content_type: Option<&str>, bytes: Bytes) -> Result<Self, Exception> {
        if bytes.is_empty() {
            return Ok(Self::Empty);
        }
        let essence = content_type
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_ascii_lowercase())
            .unwrap_or_default();

        if essence == "application/json" || essence.ends_with("+json") {
            return serde_json::from_slice(&bytes)
                .map(Self::Json)
                .map_err(|e| Exception::new(400, format!("invalid json body: {e}")));
        }
        if essence == "application/x-www-form-urlencoded" {
            return Ok(Self::Json(Value::Object(parse_form(&bytes))));
        }
        if essence.starts_with("text/") {
            return Ok(Self::Text(String::from_utf8_lossy(&bytes).into_owned()));
        }
        Ok(Self::Binary(bytes))
    }
}

/// Repeated keys collect into an array, like extended form parsers do.
fn parse_form(bytes: &[u8]) -> Map<String, Value> {
    let mut form = Map::new();
    for (key, value) in url::form_urlencoded::parse(bytes) {
        let value = Value::String(value.into_owned());
        match form.get_mut(key.as_ref()) {
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                form.insert(key.into_owned(), value);
            }
        }
    }
    form
}

// ── NativeRequest ─────────────────────────────────────────────────────────────

/// An inbound request as the engine sees it, body already parsed.
#[derive(Debug)]
pub struct NativeRequest {
    method: http::Method,
    uri: http::Uri,
    version: http::Version,
    headers: HeaderMap,
    path_params: Vec<(String, String)>,
    query: Vec<(String, String)>,
    body: Payload,
}

impl NativeRequest {
    pub fn from_parts(
        parts: http::request::Parts,
        path_params: Vec<(String, String)>,
        body: Payload,
    ) -> Self {
        let query = parts
            .uri
            .query()
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            path_params,
            query,
            body,
        }
    }

    /// Buffers at most `limit` body bytes and parses them.
    ///
    /// Over the limit is a `413`; a body that fails mid-read is a `400`.
    pub(crate) async fn read<B>(
        req: http::Request<B>,
        path_params: Vec<(String, String)>,
        limit: usize,
    ) -> Result<Self, Exception>
    where
        B: Body<Data = Bytes> + Send,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let (parts, body) = req.into_parts();
        let bytes = match Limited::new(body, limit).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                return Err(Exception::status(413).with_field("limit", limit));
            }
            Err(e) => return Err(Exception::new(400, format!("failed to read body: {e}"))),
        };

        let content_type = parts.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
        let body = Payload::parse(content_type, bytes)?;
        Ok(Self::from_parts(parts, path_params, body))
    }

    pub fn method(&self) -> &http::Method { &self.method }
    pub fn uri(&self) -> &http::Uri { &self.uri }
    pub fn version(&self) -> http::Version { self.version }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn path_params(&self) -> &[(String, String)] { &self.path_params }
    pub fn query(&self) -> &[(String, String)] { &self.query }
    pub fn body(&self) -> &Payload { &self.body }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

// ── NativeResponse ────────────────────────────────────────────────────────────

pub(crate) enum NativeBody {
    Empty,
    Full(Bytes),
    Stream(ObservedStream),
}

/// The outbound response under construction.
///
/// Post-handler hooks receive it by `&mut` and may set headers or status
/// directly. Native handlers build and return one.
pub struct NativeResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: NativeBody,
}

impl Default for NativeResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeResponse {
    /// `200`, no headers, no body.
    pub fn new() -> Self {
        Self { status: StatusCode::OK, headers: HeaderMap::new(), body: NativeBody::Empty }
    }

    /// A complete JSON response.
    pub fn json(status: u16, body: &Value) -> Self {
        let mut res = Self::new();
        res.send_json(status, body);
        res
    }

    pub fn status(&self) -> StatusCode { self.status }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }

    /// Codes outside `100..=999` are rejected with a `500`.
    pub fn set_status(&mut self, code: u16) -> Result<(), Exception> {
        self.status = StatusCode::from_u16(code)
            .map_err(|_| Exception::internal(format!("invalid status code {code}")))?;
        Ok(())
    }

    /// Sets a header, replacing any value already present.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), Exception> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| Exception::internal(format!("invalid header name `{name}`")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| Exception::internal(format!("invalid value for header `{name}`")))?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Sets `content-type` only if nothing set it before.
    pub fn default_content_type(&mut self, value: &'static str) {
        self.headers
            .entry(CONTENT_TYPE)
            .or_insert(HeaderValue::from_static(value));
    }

    /// Writes the whole body at once.
    pub fn send(&mut self, body: impl Into<Bytes>) {
        self.body = NativeBody::Full(body.into());
    }

    /// Status, JSON content-type and body in one write.
    pub fn send_json(&mut self, status: u16, body: &Value) {
        self.status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        self.headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_UTF8));
        self.body = NativeBody::Full(Bytes::from(body.to_string()));
    }

    #[cfg(test)]
    pub(crate) fn body_bytes(&self) -> Option<&Bytes> {
        match &self.body {
            NativeBody::Full(bytes) => Some(bytes),
            _ => None,
        }
    }

    #[cfg(test)]
    pub(crate) fn is_streaming(&self) -> bool {
        matches!(self.body, NativeBody::Stream(_))
    }

    pub(crate) fn pipe(&mut self, stream: ByteStream, pipeline: Arc<ErrorPipeline>) {
        self.body = NativeBody::Stream(ObservedStream::new(stream, pipeline));
    }

    /// Brotli-encodes a buffered body when the media type is text-like and
    /// the result is smaller. Partial, already encoded and streamed bodies
    /// are left alone.
    pub(crate) fn compress(&mut self) {
        let NativeBody::Full(bytes) = &self.body else {
            return;
        };
        if !(compression::MIN_SIZE..=compression::MAX_SIZE).contains(&bytes.len())
            || self.status == StatusCode::PARTIAL_CONTENT
            || self.headers.contains_key(CONTENT_ENCODING)
            || self.headers.contains_key(CONTENT_RANGE)
        {
            return;
        }
        let compressible = self
            .headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(compression::compressible);
        if !compressible {
            return;
        }
        let Some(packed) = compression::compress(bytes) else {
            return;
        };

        self.headers.insert(CONTENT_ENCODING, HeaderValue::from_static("br"));
        self.headers.append(VARY, HeaderValue::from_static("accept-encoding"));
        self.headers.remove(CONTENT_LENGTH);
        self.body = NativeBody::Full(Bytes::from(packed));
    }

    pub(crate) fn into_http(self) -> http::Response<ResponseBody> {
        let body: ResponseBody = match self.body {
            NativeBody::Empty => Empty::<Bytes>::new().map_err(|never| match never {}).boxed_unsync(),
            NativeBody::Full(bytes) => Full::new(bytes).map_err(|never| match never {}).boxed_unsync(),
            NativeBody::Stream(stream) => StreamBody::new(stream).boxed_unsync(),
        };
        let mut res = http::Response::new(body);
        *res.status_mut() = self.status;
        *res.headers_mut() = self.headers;
        res
    }
}

// ── Engine ────────────────────────────────────────────────────────────────────

/// Route table plus the request loop around it.
pub struct Engine {
    router: Router,
    pipeline: Arc<ErrorPipeline>,
    body_limit: usize,
    compression: bool,
}

impl Engine {
    pub(crate) fn new(pipeline: Arc<ErrorPipeline>, body_limit: usize) -> Self {
        Self { router: Router::new(), pipeline, body_limit, compression: true }
    }

    /// Turns negotiated brotli compression of buffered bodies on or off.
    pub(crate) fn with_compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }

    /// Registers a native handler at `path`, as is. No prefix is applied.
    ///
    /// This is how hooks install engine-level middleware during configure.
    /// An error returned by the handler goes through the error pipeline.
    pub fn native(&mut self, method: Method, path: &str, handler: impl NativeHandler) -> Result<&mut Self, Error> {
        self.mount(method, path, handler.into_boxed_handler())?;
        Ok(self)
    }

    pub(crate) fn mount(&mut self, method: Method, path: &str, handler: BoxedNativeHandler) -> Result<(), Error> {
        self.router.add(method, path, handler)
    }

    /// Number of mounted routes.
    pub fn route_count(&self) -> usize {
        self.router.len()
    }

    /// Handles one request end to end. Never fails: every fault becomes an
    /// error response.
    pub async fn dispatch<B>(&self, req: http::Request<B>) -> http::Response<ResponseBody>
    where
        B: Body<Data = Bytes> + Send,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let brotli = self.compression
            && req
                .headers()
                .get(ACCEPT_ENCODING)
                .and_then(|v| v.to_str().ok())
                .is_some_and(compression::accepts_brotli);

        let mut res = match self.route(req).await {
            Ok(res) => res,
            Err(exception) => {
                let mut res = NativeResponse::new();
                self.pipeline.handle(exception, &mut res);
                res
            }
        };
        if brotli {
            res.compress();
        }
        res.into_http()
    }

    async fn route<B>(&self, req: http::Request<B>) -> Result<NativeResponse, Exception>
    where
        B: Body<Data = Bytes> + Send,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let path = req.uri().path().to_owned();
        let found = Method::from_http(req.method()).and_then(|method| {
            self.router.lookup(method, &path).or_else(|| {
                // HEAD falls back to GET; hyper drops the body.
                (method == Method::Head).then(|| self.router.lookup(Method::Get, &path)).flatten()
            })
        });

        let Some((handler, params)) = found else {
            debug!(method = %req.method(), %path, "no route");
            return Err(Exception::new(404, format!("Cannot {} {}", req.method(), path)));
        };

        let native = NativeRequest::read(req, params, self.body_limit).await?;
        handler.call(native).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    fn engine() -> Engine {
        Engine::new(Arc::new(ErrorPipeline::new(false)), 64)
    }

    async fn body_json(res: http::Response<ResponseBody>) -> Value {
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn payload_by_content_type() {
        let json = Payload::parse(Some("application/json; charset=utf-8"), Bytes::from_static(br#"{"a":1}"#)).unwrap();
        assert_eq!(json, Payload::Json(serde_json::json!({ "a": 1 })));

        let form = Payload::parse(
            Some("application/x-www-form-urlencoded"),
            Bytes::from_static(b"a=1&b=two+words&a=3"),
        )
        .unwrap();
        assert_eq!(form, Payload::Json(serde_json::json!({ "a": ["1", "3"], "b": "two words" })));

        let text = Payload::parse(Some("text/plain"), Bytes::from_static(b"hi")).unwrap();
        assert_eq!(text, Payload::Text("hi".to_owned()));

        let bin = Payload::parse(None, Bytes::from_static(b"\x00\x01")).unwrap();
        assert!(matches!(bin, Payload::Binary(_)));

        assert_eq!(Payload::parse(Some("application/json"), Bytes::new()).unwrap(), Payload::Empty);
    }

    #[test]
    fn malformed_json_is_400() {
        let err = Payload::parse(Some("application/json"), Bytes::from_static(b"{nope")).unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn default_content_type_does_not_override() {
        let mut res = NativeResponse::new();
        res.set_header("content-type", "video/mp4").unwrap();
        res.default_content_type("text/html; charset=utf-8");
        assert_eq!(res.headers()["content-type"], "video/mp4");
    }

    #[test]
    fn invalid_header_is_an_exception() {
        let mut res = NativeResponse::new();
        assert!(res.set_header("bad header", "x").is_err());
        assert!(res.set_header("x-ok", "line\nbreak").is_err());
        assert!(res.set_status(1000).is_err());
    }

    #[tokio::test]
    async fn unmatched_route_is_404() {
        let res = engine()
            .dispatch(http::Request::get("/missing").body(Empty::<Bytes>::new()).unwrap())
            .await;
        assert_eq!(res.status(), 404);
        assert_eq!(body_json(res).await["message"], "Cannot GET /missing");
    }

    #[tokio::test]
    async fn native_handler_errors_use_the_pipeline() {
        let mut engine = engine();
        engine
            .native(Method::Get, "/boom", |_req: NativeRequest| async {
                Err::<NativeResponse, _>(Exception::internal("middleware failed"))
            })
            .unwrap()
            .native(Method::Get, "/ok", |req: NativeRequest| async move {
                Ok::<_, Exception>(NativeResponse::json(200, &serde_json::json!({ "uri": req.uri().to_string() })))
            })
            .unwrap();

        let res = engine
            .dispatch(http::Request::get("/boom").body(Empty::<Bytes>::new()).unwrap())
            .await;
        assert_eq!(res.status(), 500);
        assert_eq!(body_json(res).await["message"], "middleware failed");

        let res = engine
            .dispatch(http::Request::head("/ok").body(Empty::<Bytes>::new()).unwrap())
            .await;
        assert_eq!(res.status(), 200);
    }

    fn text_route(engine: &mut Engine, path: &str, content_type: &'static str, body: String) {
        engine
            .native(Method::Get, path, move |_req: NativeRequest| {
                let body = body.clone();
                async move {
                    let mut res = NativeResponse::new();
                    res.set_header("content-type", content_type)?;
                    res.send(body);
                    Ok::<_, Exception>(res)
                }
            })
            .unwrap();
    }

    fn get(path: &str, accept: Option<&str>) -> http::Request<Empty<Bytes>> {
        let mut req = http::Request::get(path);
        if let Some(accept) = accept {
            req = req.header("accept-encoding", accept);
        }
        req.body(Empty::new()).unwrap()
    }

    async fn body_bytes(res: http::Response<ResponseBody>) -> Bytes {
        res.into_body().collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn negotiated_brotli_for_text_bodies() {
        let text = "something ".repeat(100);
        let mut engine = engine();
        text_route(&mut engine, "/text", "text/html; charset=utf-8", text.clone());

        let res = engine.dispatch(get("/text", Some("gzip, deflate, br"))).await;
        assert_eq!(res.status(), 200);
        assert_eq!(res.headers()["content-encoding"], "br");
        assert_eq!(res.headers()["vary"], "accept-encoding");
        let packed = body_bytes(res).await;
        assert!(packed.len() < text.len());
        assert_eq!(compression::decompress(&packed), text.as_bytes());

        let res = engine.dispatch(get("/text", None)).await;
        assert!(res.headers().get("content-encoding").is_none());
        assert_eq!(body_bytes(res).await, text.as_bytes());

        let res = engine.dispatch(get("/text", Some("br;q=0"))).await;
        assert!(res.headers().get("content-encoding").is_none());
    }

    #[tokio::test]
    async fn small_binary_and_disabled_bodies_are_not_compressed() {
        let mut enabled = engine();
        text_route(&mut enabled, "/small", "text/plain", "tiny".to_owned());
        text_route(&mut enabled, "/video", "video/mp4", "x".repeat(1024));

        for path in ["/small", "/video"] {
            let res = enabled.dispatch(get(path, Some("br"))).await;
            assert!(res.headers().get("content-encoding").is_none(), "{path}");
        }

        let mut disabled = engine().with_compression(false);
        text_route(&mut disabled, "/text", "text/plain", "something ".repeat(100));
        let res = disabled.dispatch(get("/text", Some("br"))).await;
        assert!(res.headers().get("content-encoding").is_none());
    }

    #[tokio::test]
    async fn error_bodies_are_compressed_too() {
        let engine = engine();
        let path = format!("/{}", "missing".repeat(60));
        let res = engine.dispatch(get(&path, Some("br"))).await;
        assert_eq!(res.status(), 404);
        assert_eq!(res.headers()["content-encoding"], "br");
        let body: Value = serde_json::from_slice(&compression::decompress(&body_bytes(res).await)).unwrap();
        assert_eq!(body["message"], format!("Cannot GET {path}"));
    }

    #[tokio::test]
    async fn oversized_body_is_413() {
        let mut engine = engine();
        engine
            .native(Method::Post, "/upload", |_req: NativeRequest| async {
                Ok::<_, Exception>(NativeResponse::new())
            })
            .unwrap();

        let res = engine
            .dispatch(
                http::Request::post("/upload")
                    .body(Full::new(Bytes::from(vec![b'x'; 65])))
                    .unwrap(),
            )
            .await;
        assert_eq!(res.status(), 413);
        assert_eq!(body_json(res).await["limit"], 64);
    }
}
