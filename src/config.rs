//! Server configuration.
//!
//! [`ServerConfig`] is consumed read-only by the transport selector and the
//! route registrar. Build it in code, deserialize it with serde from whatever
//! format the host uses, or read it from `TSU_*` environment variables.

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::error::Error;

/// Default request body limit, matching the usual JSON body-parser default.
pub const DEFAULT_BODY_LIMIT: usize = 100 * 1024;

/// Which of the three server variants a configuration selects.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransportMode {
    /// Plain-text HTTP/1.1.
    Plain,
    /// TLS-terminated HTTP/1.1.
    Tls,
    /// TLS with ALPN negotiation, `h2` preferred, `http/1.1` fallback.
    Multiplexed,
}

impl TransportMode {
    /// Human-readable name used in lifecycle log lines.
    pub fn label(self) -> &'static str {
        match self {
            Self::Plain       => "HTTP",
            Self::Tls         => "HTTPS",
            Self::Multiplexed => "HTTP/2",
        }
    }

    pub fn is_tls(self) -> bool {
        !matches!(self, Self::Plain)
    }
}

/// Everything the adapter needs to know about where and how to listen.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Prepended to every registered route path.
    pub prefix: Option<String>,
    /// Selects multiplexed mode. Takes precedence over `https`.
    pub http2: bool,
    /// Selects TLS mode when `http2` is off.
    pub https: bool,
    pub tls_certificate_file: Option<PathBuf>,
    pub tls_key_file: Option<PathBuf>,
    /// Redact server-class error bodies.
    pub production: bool,
    /// Maximum buffered request body, in bytes.
    pub body_limit: usize,
    /// Brotli-encode buffered text-like bodies for clients that accept `br`.
    pub compression: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_owned(),
            port: 3000,
            prefix: None,
            http2: true,
            https: false,
            tls_certificate_file: None,
            tls_key_file: None,
            production: false,
            body_limit: DEFAULT_BODY_LIMIT,
            compression: true,
        }
    }
}

impl ServerConfig {
    /// Plain HTTP on `host:port`. Use the `with_*` methods to switch transport.
    pub fn plain(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port, http2: false, ..Self::default() }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Multiplexed HTTP/2 (with HTTP/1.1 fallback) over TLS.
    pub fn with_http2(mut self, cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        self.http2 = true;
        self.tls_certificate_file = Some(cert.into());
        self.tls_key_file = Some(key.into());
        self
    }

    /// TLS-terminated HTTP/1.1.
    pub fn with_https(mut self, cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        self.http2 = false;
        self.https = true;
        self.tls_certificate_file = Some(cert.into());
        self.tls_key_file = Some(key.into());
        self
    }

    pub fn with_production(mut self, production: bool) -> Self {
        self.production = production;
        self
    }

    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    pub fn with_compression(mut self, compression: bool) -> Self {
        self.compression = compression;
        self
    }

    /// Reads `TSU_*` environment variables on top of the defaults.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    ///
    /// Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(host) = get("TSU_HOST") {
            config.host = host;
        }
        if let Some(port) = get("TSU_PORT") {
            config.port = parse("TSU_PORT", &port)?;
        }
        config.prefix = get("TSU_PREFIX");
        if let Some(v) = get("TSU_HTTP2") {
            config.http2 = flag(&v);
        }
        if let Some(v) = get("TSU_HTTPS") {
            config.https = flag(&v);
        }
        config.tls_certificate_file = get("TSU_TLS_CERT").map(PathBuf::from);
        config.tls_key_file = get("TSU_TLS_KEY").map(PathBuf::from);
        config.production = get("TSU_ENV").is_some_and(|v| v.eq_ignore_ascii_case("production"));
        if let Some(limit) = get("TSU_BODY_LIMIT") {
            config.body_limit = parse("TSU_BODY_LIMIT", &limit)?;
        }
        if let Some(v) = get("TSU_COMPRESSION") {
            config.compression = flag(&v);
        }

        Ok(config)
    }

    /// The variant this configuration selects. `http2` wins over `https`.
    pub fn mode(&self) -> TransportMode {
        if self.http2 {
            TransportMode::Multiplexed
        } else if self.https {
            TransportMode::Tls
        } else {
            TransportMode::Plain
        }
    }

    /// Certificate and key paths for TLS modes.
    ///
    /// Both must be present whenever the mode is TLS or multiplexed.
    pub fn tls_material(&self) -> Result<Option<(&Path, &Path)>, Error> {
        let mode = self.mode();
        if !mode.is_tls() {
            return Ok(None);
        }
        match (&self.tls_certificate_file, &self.tls_key_file) {
            (Some(cert), Some(key)) => Ok(Some((cert.as_path(), key.as_path()))),
            _ => Err(Error::MissingTlsMaterial { mode: mode.label() }),
        }
    }

    /// Checks everything that can be checked without touching the network.
    pub fn validate(&self) -> Result<(), Error> {
        if self.host.trim().is_empty() {
            return Err(Error::InvalidConfig {
                key: "host".to_owned(),
                message: "must not be empty".to_owned(),
            });
        }
        if let Some(prefix) = &self.prefix {
            if !prefix.is_empty() && !prefix.starts_with('/') {
                return Err(Error::InvalidConfig {
                    key: "prefix".to_owned(),
                    message: format!("`{prefix}` must start with '/'"),
                });
            }
        }
        self.tls_material().map(|_| ())
    }

    /// `prefix + path`, the path a route is actually mounted at.
    pub fn mount_path(&self, path: &str) -> String {
        match self.prefix.as_deref() {
            Some(prefix) if !prefix.is_empty() => {
                format!("{}{}", prefix.trim_end_matches('/'), path)
            }
            _ => path.to_owned(),
        }
    }

    /// Resolves `host:port` to the first socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr, Error> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.to_socket_addrs()
            .map_err(|_| Error::InvalidAddress(addr.clone()))?
            .next()
            .ok_or(Error::InvalidAddress(addr))
    }
}

/// `"1"` / `"true"` (any case) are true; everything else is false.
fn flag(v: &str) -> bool {
    v == "1" || v.eq_ignore_ascii_case("true")
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, Error>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| Error::InvalidConfig {
        key: key.to_owned(),
        message: format!("'{value}': {e}"),
    })
}
