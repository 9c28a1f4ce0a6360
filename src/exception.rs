//! The canonical failure value.
//!
//! Handlers, hooks, adapters and streams all fail with an [`Exception`].
//! The originating status is optional: a fault that carries none resolves
//! to `500` when the error pipeline writes it.

use std::fmt;

use http::StatusCode;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

/// Status used when a fault carries no status of its own.
pub const DEFAULT_STATUS: u16 = 500;

/// A normalized failure: resolved status, message, and any extra
/// serializable detail (validation errors, ids, ...).
///
/// ```rust
/// use tsu_http2::Exception;
///
/// let e = Exception::status(404);
/// assert_eq!(e.message(), "Not Found");
///
/// let e = Exception::new(422, "invalid payload").with_field("field", "email");
/// assert_eq!(e.status_code(), 422);
///
/// let e = Exception::internal("boom");
/// assert_eq!(e.status_code(), 500);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Exception {
    status: Option<u16>,
    message: String,
    extra: Map<String, Value>,
    headers: Vec<(String, String)>,
}

impl Exception {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self { status: Some(status), message: message.into(), extra: Map::new(), headers: Vec::new() }
    }

    /// An exception whose message is the status' reason phrase.
    pub fn status(status: u16) -> Self {
        Self::new(status, reason(status))
    }

    /// A fault with no status. Resolves to `500`.
    pub fn internal(message: impl Into<String>) -> Self {
        Self { status: None, message: message.into(), extra: Map::new(), headers: Vec::new() }
    }

    /// Wraps an arbitrary error as a status-less fault.
    pub fn from_error<E: std::error::Error + ?Sized>(err: &E) -> Self {
        Self::internal(err.to_string())
    }

    /// Attaches an extra field to the serialized body.
    ///
    /// `statusCode` and `message` are reserved; values that fail to
    /// serialize are dropped.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        let key = key.into();
        if key == "statusCode" || key == "message" {
            return self;
        }
        if let Ok(value) = serde_json::to_value(value) {
            self.extra.insert(key, value);
        }
        self
    }

    /// Adds a response header written with the error body, such as
    /// `content-range` on a 416. Not part of the serialized body.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// The status this exception resolves to. Only client and server error
    /// codes (`400..=599`) are kept; anything else resolves to `500`.
    pub fn status_code(&self) -> u16 {
        self.status
            .filter(|s| (400..=599).contains(s))
            .unwrap_or(DEFAULT_STATUS)
    }

    /// The status carried by the originating fault, if any.
    pub fn original_status(&self) -> Option<u16> {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }

    /// Full body: `{"statusCode", "message", ...extra}`.
    pub(crate) fn to_body(&self) -> Value {
        let mut body = Map::with_capacity(self.extra.len() + 2);
        body.insert("statusCode".to_owned(), Value::from(self.status_code()));
        body.insert("message".to_owned(), Value::from(self.message.as_str()));
        for (k, v) in &self.extra {
            body.insert(k.clone(), v.clone());
        }
        Value::Object(body)
    }

    /// Production body for server-class faults. All fault detail is dropped.
    pub(crate) fn redacted_body(&self) -> Value {
        serde_json::json!({
            "statusCode": self.status_code(),
            "message": reason(500),
        })
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status_code(), self.message)
    }
}

impl std::error::Error for Exception {}

impl Serialize for Exception {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_body().serialize(serializer)
    }
}

impl From<StatusCode> for Exception {
    fn from(code: StatusCode) -> Self {
        Self::status(code.as_u16())
    }
}

impl From<std::io::Error> for Exception {
    fn from(e: std::io::Error) -> Self {
        Self::from_error(&e)
    }
}

impl From<http::Error> for Exception {
    fn from(e: http::Error) -> Self {
        Self::from_error(&e)
    }
}

impl From<serde_json::Error> for Exception {
    fn from(e: serde_json::Error) -> Self {
        Self::from_error(&e)
    }
}

/// Canonical reason phrase, `"Error"` for unregistered codes.
pub(crate) fn reason(status: u16) -> &'static str {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Error")
}
