//! Unified error type.

use std::path::PathBuf;

/// The error type returned by the server's fallible lifecycle operations.
///
/// Request-level failures (404, 422, a handler blowing up) are never
/// `Error`s; they travel as [`Exception`](crate::Exception) values and end
/// up in the error pipeline. This type surfaces configuration and
/// infrastructure failures: missing TLS material, bad routes, binding.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// TLS or HTTP/2 mode was requested without both certificate and key.
    #[error("cannot create {mode} server without certificate and key file")]
    MissingTlsMaterial { mode: &'static str },

    /// Certificate or key material could not be turned into a TLS config.
    #[error("tls: {0}")]
    Tls(String),

    /// A certificate/key file could not be read.
    #[error("io error for '{}': {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// A route definition named a verb the engine has no registration for.
    #[error("unknown http method `{0}`")]
    UnknownMethod(String),

    #[error("invalid route `{path}`: {reason}")]
    InvalidRoute { path: String, reason: String },

    #[error("invalid listen address `{0}`")]
    InvalidAddress(String),

    #[error("invalid value for {key}: {message}")]
    InvalidConfig { key: String, message: String },
}

impl From<rustls::Error> for Error {
    fn from(e: rustls::Error) -> Self {
        Self::Tls(e.to_string())
    }
}
