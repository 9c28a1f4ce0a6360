//! Transform hooks and their dispatcher.
//!
//! Hooks run around every application handler:
//!
//! ```text
//! Request::adapt ─▶ on_request ─▶ handler ─▶ on_response ─▶ response adapter
//! ```
//!
//! Dispatch is sequential, awaited and fail-fast: hook N+1 does not start
//! until hook N resolved, and the first error stops the chain and goes to
//! the error pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use crate::engine::{Engine, NativeRequest, NativeResponse};
use crate::error::Error;
use crate::exception::Exception;
use crate::request::Request;
use crate::response::Response;

/// Dispatched after the canonical request is built, before the handler.
pub struct TransformRequestEvent<'a> {
    /// The request as the engine received it. Read-only.
    pub native: &'a NativeRequest,
    /// The canonical request the handler will receive.
    pub request: &'a mut Request,
}

/// Dispatched after the handler returned, before anything is written.
pub struct TransformResponseEvent<'a> {
    /// The handler's response. Changes here are what gets written.
    pub response: &'a mut Response,
    /// The transport response. Headers set here survive unless the
    /// canonical response sets the same name.
    pub native: &'a mut NativeResponse,
}

/// An extension point around handler execution.
///
/// Every method defaults to a no-op; implement the ones you need.
///
/// ```rust
/// use async_trait::async_trait;
/// use tsu_http2::{Exception, TransformHook, TransformRequestEvent};
///
/// struct RequireApiKey;
///
/// #[async_trait]
/// impl TransformHook for RequireApiKey {
///     async fn on_request(&self, event: &mut TransformRequestEvent<'_>) -> Result<(), Exception> {
///         match event.request.header("x-api-key") {
///             Some(_) => Ok(()),
///             None => Err(Exception::status(401)),
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait TransformHook: Send + Sync + 'static {
    /// Once, during `configure`, before application routes are mounted.
    async fn on_configure(&self, _engine: &mut Engine) -> Result<(), Error> {
        Ok(())
    }

    async fn on_request(&self, _event: &mut TransformRequestEvent<'_>) -> Result<(), Exception> {
        Ok(())
    }

    async fn on_response(&self, _event: &mut TransformResponseEvent<'_>) -> Result<(), Exception> {
        Ok(())
    }
}

/// Ordered set of hooks with sequential, fail-fast dispatch.
#[derive(Clone, Default)]
pub struct Dispatcher {
    hooks: Vec<Arc<dyn TransformHook>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a hook. Hooks run in the order they were added.
    pub fn with(mut self, hook: impl TransformHook) -> Self {
        self.push(hook);
        self
    }

    pub fn push(&mut self, hook: impl TransformHook) {
        self.hooks.push(Arc::new(hook));
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub(crate) async fn configure(&self, engine: &mut Engine) -> Result<(), Error> {
        for hook in &self.hooks {
            hook.on_configure(engine).await?;
        }
        Ok(())
    }

    pub(crate) async fn transform_request(&self, event: &mut TransformRequestEvent<'_>) -> Result<(), Exception> {
        trace!(hooks = self.hooks.len(), path = event.request.path(), "transform request");
        for hook in &self.hooks {
            hook.on_request(event).await?;
        }
        Ok(())
    }

    pub(crate) async fn transform_response(&self, event: &mut TransformResponseEvent<'_>) -> Result<(), Exception> {
        trace!(hooks = self.hooks.len(), status = event.response.status_code(), "transform response");
        for hook in &self.hooks {
            hook.on_response(event).await?;
        }
        Ok(())
    }
}
