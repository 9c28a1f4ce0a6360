//! The error pipeline: the single sink for every request-level fault.
//!
//! ```text
//!               ┌── status >= 500 ─▶ clear headers, log error ──┐
//! Exception ────┤                                              ├─▶ redact? ─▶ write once
//!               └── status <  500 ─▶ log debug ─────────────────┘
//! ```
//!
//! Redaction only applies in production mode and only to server-class
//! faults; the body becomes `{"statusCode", "message": "Internal Server
//! Error"}`. Everything else gets the full serialized exception.

use tracing::{debug, error};

use crate::engine::NativeResponse;
use crate::exception::Exception;

#[derive(Clone, Debug, Default)]
pub struct ErrorPipeline {
    production: bool,
}

impl ErrorPipeline {
    pub fn new(production: bool) -> Self {
        Self { production }
    }

    pub fn is_production(&self) -> bool {
        self.production
    }

    /// Normalizes, logs and writes `exception` onto `res`.
    pub fn handle(&self, exception: Exception, res: &mut NativeResponse) {
        let status = exception.status_code();
        let body = exception.to_body();

        if status >= 500 {
            res.headers_mut().clear();
            error!(status, exception = %body, "{}", exception.message());
        } else {
            debug!(status, exception = %body, "{}", exception.message());
        }

        for (name, value) in exception.headers() {
            if res.set_header(name, value).is_err() {
                debug!(header = %name, "dropping unwritable exception header");
            }
        }

        if self.production && status >= 500 {
            res.send_json(status, &exception.redacted_body());
        } else {
            res.send_json(status, &body);
        }
    }

    /// A fault raised by a response stream after headers were flushed.
    ///
    /// Status and body can no longer change; the fault is logged with the
    /// same severity routing and the transport aborts the response.
    pub(crate) fn stream_fault(&self, exception: &Exception) {
        let status = exception.status_code();
        if status >= 500 {
            error!(status, exception = %exception.to_body(), "response stream failed: {}", exception.message());
        } else {
            debug!(status, exception = %exception.to_body(), "response stream failed: {}", exception.message());
        }
    }
}
