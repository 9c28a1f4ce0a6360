//! Canonical response type and the [`IntoResponse`] conversion trait.
//!
//! Handlers build a [`Response`] and return it; the response adapter turns
//! it into bytes on whatever transport the server runs. Buffered content is
//! written in one go, streamed content is piped.

use std::io::SeekFrom;
use std::path::Path;

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::exception::Exception;
use crate::range;
use crate::stream::ByteStream;

// ── Content ───────────────────────────────────────────────────────────────────

/// What a response carries.
#[derive(Debug)]
pub enum Content {
    Empty,
    /// Sent as `text/html; charset=utf-8` unless a content-type is set.
    Text(String),
    /// Sent as `application/json; charset=utf-8` unless a content-type is set.
    Json(Value),
    /// Sent as `application/octet-stream` unless a content-type is set.
    Bytes(Bytes),
    /// Piped to the transport chunk by chunk.
    Stream(ByteStream),
}

impl Content {
    pub fn is_stream(&self) -> bool {
        matches!(self, Self::Stream(_))
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing response, before it touches the transport.
///
/// # Shortcuts (200 OK)
///
/// ```rust
/// use tsu_http2::Response;
///
/// Response::text("something");
/// Response::json(serde_json::json!({ "id": "json" }));
/// Response::status(204);
/// ```
///
/// # Builder (custom status or headers)
///
/// ```rust
/// use tsu_http2::Response;
///
/// Response::builder()
///     .status(201)
///     .header("location", "/users/42")
///     .json(serde_json::json!({ "id": 42 }));
/// ```
#[derive(Debug)]
pub struct Response {
    pub(crate) status: u16,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) content: Content,
}

impl Response {
    /// `200 OK` with a JSON body.
    pub fn json(body: impl Into<Value>) -> Self {
        Self::builder().json(body)
    }

    /// `200 OK` with any serializable body.
    pub fn serialize<T: Serialize + ?Sized>(body: &T) -> Result<Self, Exception> {
        Ok(Self::json(serde_json::to_value(body)?))
    }

    /// `200 OK` with a text body and the engine's default content-type.
    pub fn text(body: impl Into<String>) -> Self {
        Self::builder().text(body)
    }

    /// Response with no body.
    pub fn status(code: u16) -> Self {
        Self::builder().status(code).no_body()
    }

    /// `200 OK` streaming `stream`.
    pub fn stream(stream: ByteStream) -> Self {
        Self::builder().stream(stream)
    }

    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: Vec::new(), status: 200 }
    }

    /// Streams a file, honouring a `Range` header value when given.
    ///
    /// Without a usable range: `200` with the full `content-length`. With one:
    /// `206`, `content-range: bytes a-b/total` and `content-length: b-a+1`.
    /// A missing file is a `404`, a range outside the file a `416`.
    pub async fn file(path: impl AsRef<Path>, range: Option<&str>) -> Result<Self, Exception> {
        let path = path.as_ref();
        let mut file = tokio::fs::File::open(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Exception::status(404),
            _ => Exception::from(e),
        })?;
        let total = file.metadata().await?.len();
        let mime = mime_guess::from_path(path).first_or_octet_stream();

        let range = match range {
            Some(header) => range::parse(header, total)?,
            None => None,
        };

        let builder = Response::builder()
            .header("content-type", mime.as_ref())
            .header("accept-ranges", "bytes");

        let response = match range {
            Some(r) => {
                file.seek(SeekFrom::Start(r.start)).await?;
                builder
                    .status(206)
                    .header("content-range", &r.content_range(total))
                    .header("content-length", &r.len().to_string())
                    .stream(ByteStream::from_reader(file.take(r.len())))
            }
            None => builder
                .header("content-length", &total.to_string())
                .stream(ByteStream::from_reader(file)),
        };
        Ok(response)
    }

    /// Like [`file`](Self::file), sent as an attachment named `filename`.
    pub async fn download(path: impl AsRef<Path>, filename: &str) -> Result<Self, Exception> {
        let mut response = Self::file(path, None).await?;
        response.set_header(
            "content-disposition",
            format!("attachment; filename=\"{}\"", filename.replace('"', "")),
        );
        Ok(response)
    }

    pub fn status_code(&self) -> u16 { self.status }
    pub fn headers(&self) -> &[(String, String)] { &self.headers }
    pub fn content(&self) -> &Content { &self.content }

    pub fn set_status(&mut self, code: u16) {
        self.status = code;
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Sets a header, replacing an existing one of the same name in place.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.headers.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
            Some((_, v)) => *v = value,
            None => self.headers.push((name.to_owned(), value)),
        }
    }

    pub fn remove_header(&mut self, name: &str) -> Option<String> {
        let idx = self.headers.iter().position(|(k, _)| k.eq_ignore_ascii_case(name))?;
        Some(self.headers.remove(idx).1)
    }

    /// Replaces the content, returning the previous one.
    pub fn set_content(&mut self, content: Content) -> Content {
        std::mem::replace(&mut self.content, content)
    }

    pub(crate) fn into_parts(self) -> (u16, Vec<(String, String)>, Content) {
        (self.status, self.headers, self.content)
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `200`. Terminated by a
/// typed body method.
pub struct ResponseBuilder {
    headers: Vec<(String, String)>,
    status: u16,
}

impl ResponseBuilder {
    pub fn status(mut self, code: u16) -> Self {
        self.status = code;
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn json(self, body: impl Into<Value>) -> Response {
        self.finish(Content::Json(body.into()))
    }

    pub fn text(self, body: impl Into<String>) -> Response {
        self.finish(Content::Text(body.into()))
    }

    pub fn bytes(self, body: impl Into<Bytes>) -> Response {
        self.finish(Content::Bytes(body.into()))
    }

    pub fn stream(self, stream: ByteStream) -> Response {
        self.finish(Content::Stream(stream))
    }

    /// Terminate with no body (e.g. `204`, `301`).
    pub fn no_body(self) -> Response {
        self.finish(Content::Empty)
    }

    fn finish(self, content: Content) -> Response {
        Response { status: self.status, headers: self.headers, content }
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into a [`Response`].
///
/// Handlers return `Result<impl IntoResponse, impl Into<Exception>>`.
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for Value {
    fn into_response(self) -> Response { Response::json(self) }
}

impl IntoResponse for Bytes {
    fn into_response(self) -> Response { Response::builder().bytes(self) }
}

impl IntoResponse for ByteStream {
    fn into_response(self) -> Response { Response::stream(self) }
}

/// Return a bare status from a handler: `Ok(StatusCode::NO_CONTENT)`
impl IntoResponse for http::StatusCode {
    fn into_response(self) -> Response { Response::status(self.as_u16()) }
}
