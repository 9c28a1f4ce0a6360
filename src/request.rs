//! Canonical request type and the request adapter.

use std::collections::HashMap;

use serde::de::DeserializeOwned;

use crate::engine::{NativeRequest, Payload};
use crate::exception::Exception;

/// One inbound call, independent of the transport it arrived on.
///
/// Created fresh for every request by [`Request::adapt`]. Pre-handler hooks
/// get it by `&mut` and may rewrite headers, params or body before the
/// handler sees it.
#[derive(Clone, Debug)]
pub struct Request {
    pub(crate) method: http::Method,
    pub(crate) path: String,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) params: HashMap<String, String>,
    pub(crate) body: Payload,
}

impl Request {
    /// An empty request for `path`. Handy for calling handlers directly.
    pub fn new(method: http::Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: Vec::new(),
            params: HashMap::new(),
            body: Payload::Empty,
        }
    }

    /// The request adapter: native request × declared route path → `Request`.
    ///
    /// Pure and synchronous. Header names are stored lowercased and repeated
    /// native headers are joined with `", "`. Query parameters are merged
    /// first, then path parameters, so a path parameter wins over a query
    /// parameter of the same name. The body is passed through untouched.
    pub fn adapt(native: &NativeRequest, declared_path: &str) -> Self {
        let mut headers: Vec<(String, String)> = Vec::with_capacity(native.headers().keys_len());
        for name in native.headers().keys() {
            let value = native
                .headers()
                .get_all(name)
                .iter()
                .map(|v| String::from_utf8_lossy(v.as_bytes()))
                .collect::<Vec<_>>()
                .join(", ");
            headers.push((name.as_str().to_owned(), value));
        }

        let mut params: HashMap<String, String> = native.query().iter().cloned().collect();
        params.extend(native.path_params().iter().cloned());

        Self {
            method: native.method().clone(),
            path: declared_path.to_owned(),
            headers,
            params,
            body: native.body().clone(),
        }
    }

    pub fn method(&self) -> &http::Method { &self.method }

    /// The matched route's declared path, not the raw URL.
    pub fn path(&self) -> &str { &self.path }

    pub fn headers(&self) -> &[(String, String)] { &self.headers }
    pub fn params(&self) -> &HashMap<String, String> { &self.params }
    pub fn body(&self) -> &Payload { &self.body }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Sets a header, replacing any existing value under the same name.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.headers.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
            Some((_, v)) => *v = value,
            None => self.headers.push((name.to_ascii_lowercase(), value)),
        }
    }

    pub fn remove_header(&mut self, name: &str) -> Option<String> {
        let idx = self.headers.iter().position(|(k, _)| k.eq_ignore_ascii_case(name))?;
        Some(self.headers.remove(idx).1)
    }

    /// A merged query/path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn set_param(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.insert(key.into(), value.into());
    }

    pub fn set_body(&mut self, body: Payload) {
        self.body = body;
    }

    /// Deserializes a JSON (or form) body. Fails with `400`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Exception> {
        match &self.body {
            Payload::Json(value) => serde_json::from_value(value.clone())
                .map_err(|e| Exception::new(400, e.to_string())),
            _ => Err(Exception::new(400, "expected a json body")),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_param(key, value);
        self
    }

    pub fn with_body(mut self, body: Payload) -> Self {
        self.body = body;
        self
    }
}
