//! Transport selection and the server lifecycle.
//!
//! # Which server runs
//!
//! | `http2` | `https` | transport                                      |
//! |---------|---------|------------------------------------------------|
//! | true    | any     | TLS, ALPN `h2` then `http/1.1`, HTTP/2 + 1.1   |
//! | false   | true    | TLS, ALPN `http/1.1`, HTTP/1.1 only            |
//! | false   | false   | plain HTTP/1.1                                 |
//!
//! Both TLS variants need a certificate and a key. Their absence fails
//! `configure`; no listener is ever created for a half-configured server.
//!
//! # Graceful shutdown
//!
//! [`HttpServer::stop`] flips a `watch` channel. The accept loop stops
//! taking connections, every live connection is told to finish its
//! in-flight requests, and `stop` returns once they have all drained.
//! [`HttpServer::run`] wires that to SIGTERM / Ctrl-C.

use std::convert::Infallible;
use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

use crate::config::{ServerConfig, TransportMode};
use crate::engine::Engine;
use crate::error::Error;
use crate::hooks::Dispatcher;
use crate::pipeline::ErrorPipeline;
use crate::registrar::{Registrar, RouteDefinition};

const ALPN_MULTIPLEXED: &[&[u8]] = &[b"h2", b"http/1.1"];
const ALPN_HTTP1: &[&[u8]] = &[b"http/1.1"];

// ── Transport ─────────────────────────────────────────────────────────────────

/// The one listening variant a configuration selects.
pub(crate) enum Transport {
    Plain,
    Tls(TlsAcceptor),
    Multiplexed(TlsAcceptor),
}

impl Transport {
    /// Reads certificate and key synchronously when the mode needs them.
    pub(crate) fn select(config: &ServerConfig) -> Result<Self, Error> {
        let Some((cert, key)) = config.tls_material()? else {
            return Ok(Self::Plain);
        };
        let transport = match config.mode() {
            TransportMode::Multiplexed => Self::Multiplexed(acceptor(cert, key, ALPN_MULTIPLEXED)?),
            _ => Self::Tls(acceptor(cert, key, ALPN_HTTP1)?),
        };
        Ok(transport)
    }

    pub(crate) fn mode(&self) -> TransportMode {
        match self {
            Self::Plain          => TransportMode::Plain,
            Self::Tls(_)         => TransportMode::Tls,
            Self::Multiplexed(_) => TransportMode::Multiplexed,
        }
    }

    async fn serve(&self, stream: TcpStream, peer: SocketAddr, engine: Arc<Engine>, shutdown: watch::Receiver<bool>) {
        let acceptor = match self {
            Self::Plain => return drive(TokioIo::new(stream), peer, engine, false, shutdown).await,
            Self::Tls(acceptor) | Self::Multiplexed(acceptor) => acceptor,
        };
        let tls = match acceptor.accept(stream).await {
            Ok(tls) => tls,
            Err(e) => {
                debug!(%peer, "tls handshake failed: {e}");
                return;
            }
        };
        let multiplexed = matches!(self, Self::Multiplexed(_));
        drive(TokioIo::new(tls), peer, engine, multiplexed, shutdown).await;
    }
}

fn acceptor(cert: &Path, key: &Path, alpn: &[&[u8]]) -> Result<TlsAcceptor, Error> {
    Ok(TlsAcceptor::from(Arc::new(tls_config(cert, key, alpn)?)))
}

fn tls_config(cert: &Path, key: &Path, alpn: &[&[u8]]) -> Result<rustls::ServerConfig, Error> {
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut open(cert)?)
        .collect::<Result<_, _>>()
        .map_err(|source| Error::File { path: cert.to_path_buf(), source })?;
    if certs.is_empty() {
        return Err(Error::Tls(format!("no certificates found in '{}'", cert.display())));
    }

    let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut open(key)?)
        .map_err(|source| Error::File { path: key.to_path_buf(), source })?
        .ok_or_else(|| Error::Tls(format!("no private key found in '{}'", key.display())))?;

    let mut config = rustls::ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    config.alpn_protocols = alpn.iter().map(|p| p.to_vec()).collect();
    Ok(config)
}

fn open(path: &Path) -> Result<BufReader<File>, Error> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| Error::File { path: path.to_path_buf(), source })
}

/// Serves one connection until it closes or shutdown is signalled.
async fn drive<I>(
    io: I,
    peer: SocketAddr,
    engine: Arc<Engine>,
    multiplexed: bool,
    mut shutdown: watch::Receiver<bool>,
) where
    I: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
{
    let svc = service_fn(move |req: hyper::Request<Incoming>| {
        let engine = Arc::clone(&engine);
        async move { Ok::<_, Infallible>(engine.dispatch(req).await) }
    });

    let mut builder = ConnBuilder::new(TokioExecutor::new());
    if !multiplexed {
        builder = builder.http1_only();
    }
    let conn = builder.serve_connection(io, svc);
    tokio::pin!(conn);

    tokio::select! {
        res = conn.as_mut() => {
            if let Err(e) = res {
                debug!(%peer, "connection error: {e}");
            }
        }
        _ = shutdown.changed() => {
            conn.as_mut().graceful_shutdown();
            if let Err(e) = conn.await {
                debug!(%peer, "connection error during shutdown: {e}");
            }
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    engine: Arc<Engine>,
    transport: Arc<Transport>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut tasks = JoinSet::new();

    loop {
        tokio::select! {
            // Shutdown first, so a stop wins over queued connections.
            biased;

            _ = shutdown.changed() => {
                info!(in_flight = tasks.len(), "draining connections");
                break;
            }

            res = listener.accept() => {
                let (stream, peer) = match res {
                    Ok(v) => v,
                    Err(e) => {
                        warn!("accept error: {e}");
                        continue;
                    }
                };
                let engine = Arc::clone(&engine);
                let transport = Arc::clone(&transport);
                let shutdown = shutdown.clone();
                tasks.spawn(async move { transport.serve(stream, peer, engine, shutdown).await });
            }

            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }

    while tasks.join_next().await.is_some() {}
}

// ── HttpServer ────────────────────────────────────────────────────────────────

struct Running {
    addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// The server adapter: configure once, then start and stop.
///
/// ```rust,no_run
/// use tsu_http2::{Dispatcher, Exception, HttpServer, Request, RouteDefinition, ServerConfig};
///
/// async fn text(_req: Request) -> Result<&'static str, Exception> {
///     Ok("something")
/// }
///
/// # async fn demo() -> Result<(), tsu_http2::Error> {
/// let config = ServerConfig::plain("0.0.0.0", 3000).with_prefix("/api");
/// let mut server = HttpServer::new(config, Dispatcher::new());
/// server.configure(vec![RouteDefinition::get("/mock/text", text)]).await?;
/// server.run().await
/// # }
/// ```
pub struct HttpServer {
    config: Arc<ServerConfig>,
    dispatcher: Arc<Dispatcher>,
    pipeline: Arc<ErrorPipeline>,
    engine: Option<Arc<Engine>>,
    transport: Option<Arc<Transport>>,
    running: Option<Running>,
}

impl HttpServer {
    /// Adapter name, as reported to the host framework.
    pub const NAME: &'static str = "tsu-http2";

    pub fn new(config: ServerConfig, dispatcher: Dispatcher) -> Self {
        let pipeline = Arc::new(ErrorPipeline::new(config.production));
        Self {
            config: Arc::new(config),
            dispatcher: Arc::new(dispatcher),
            pipeline,
            engine: None,
            transport: None,
            running: None,
        }
    }

    /// Selects the transport, lets hooks touch the engine, then mounts
    /// every route. A second call does nothing.
    pub async fn configure(&mut self, routes: Vec<RouteDefinition>) -> Result<(), Error> {
        if self.engine.is_some() {
            debug!("already configured");
            return Ok(());
        }
        self.config.validate()?;
        let transport = Transport::select(&self.config)?;

        let mut engine = Engine::new(Arc::clone(&self.pipeline), self.config.body_limit)
            .with_compression(self.config.compression);
        self.dispatcher.configure(&mut engine).await?;

        let registrar = Registrar::new(
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.pipeline),
            Arc::clone(&self.config),
        );
        for route in routes {
            registrar.register(&mut engine, route)?;
        }

        info!(mode = transport.mode().label(), routes = engine.route_count(), "configured");
        self.engine = Some(Arc::new(engine));
        self.transport = Some(Arc::new(transport));
        Ok(())
    }

    /// Binds and starts accepting. No-op before `configure` or while
    /// already running.
    pub async fn start(&mut self) -> Result<(), Error> {
        let (Some(engine), Some(transport)) = (&self.engine, &self.transport) else {
            debug!("start called before configure");
            return Ok(());
        };
        if self.running.is_some() {
            return Ok(());
        }

        let listener = TcpListener::bind(self.config.socket_addr()?).await?;
        let addr = listener.local_addr()?;
        info!(%addr, "Starting {} server.", transport.mode().label());

        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(accept_loop(listener, Arc::clone(engine), Arc::clone(transport), rx));
        self.running = Some(Running { addr, shutdown: tx, task });
        Ok(())
    }

    /// Stops accepting and drains in-flight connections. No-op when not
    /// running.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        info!(addr = %running.addr, "Closing {} server.", self.mode().label());
        // The loop may already be gone; a closed channel is fine.
        let _ = running.shutdown.send(true);
        if let Err(e) = running.task.await {
            error!("server task failed: {e}");
        }
        info!("server stopped");
    }

    /// `start`, wait for SIGTERM or Ctrl-C, `stop`.
    pub async fn run(&mut self) -> Result<(), Error> {
        self.start().await?;
        shutdown_signal().await;
        self.stop().await;
        Ok(())
    }

    /// The bound address while running. Useful with port `0`.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.addr)
    }

    /// The configured engine, once `configure` has run.
    pub fn engine(&self) -> Option<&Engine> {
        self.engine.as_deref()
    }

    pub fn mode(&self) -> TransportMode {
        self.transport.as_ref().map_or_else(|| self.config.mode(), |t| t.mode())
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on SIGTERM or SIGINT (Ctrl-C). Windows only has Ctrl-C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c  => {}
        () = sigterm => {}
    }
}
