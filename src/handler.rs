//! Handler traits and type erasure.
//!
//! # Two kinds of handler
//!
//! - An application [`Handler`] speaks the canonical model:
//!   `async fn(Request) -> Result<impl IntoResponse, impl Into<Exception>>`.
//!   The route registrar wraps it in the composed pipeline.
//! - A [`NativeHandler`] speaks the engine's model:
//!   `async fn(NativeRequest) -> Result<NativeResponse, Exception>`.
//!   The route table only ever stores these; a composed route is one too.
//!
//! # How async handlers are stored
//!
//! The router holds handlers of *different* concrete types in one table, so
//! each is hidden behind a trait object:
//!
//! ```text
//! async fn hello(req: Request) -> Result<Response, Exception> { … }
//!        ↓ RouteDefinition::new(Method::Get, "/", hello)
//! hello.into_boxed_handler()                  ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(hello))                  ← stored as BoxedHandler
//!        ↓ registrar wraps it in a composed native handler
//! handler.call(req)  at request time          ← one vtable dispatch
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::engine::{NativeRequest, NativeResponse};
use crate::exception::Exception;
use crate::request::Request;
use crate::response::{IntoResponse, Response};

// ── Internal types ────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future. `Send + 'static` so hyper can run
/// it on any worker.
#[doc(hidden)]
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// What an application handler resolves to.
pub type Outcome = Result<Response, Exception>;

/// Dispatch interface for application handlers.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request) -> BoxFuture<Outcome>;
}

/// Dispatch interface for native handlers.
#[doc(hidden)]
pub trait ErasedNativeHandler {
    fn call(&self, req: NativeRequest) -> BoxFuture<Result<NativeResponse, Exception>>;
}

#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

#[doc(hidden)]
pub type BoxedNativeHandler = Arc<dyn ErasedNativeHandler + Send + Sync + 'static>;

// ── Public traits ─────────────────────────────────────────────────────────────

/// Implemented for every valid application handler.
///
/// Satisfied automatically by any function or closure with the shape
///
/// ```text
/// async fn name(req: Request) -> Result<impl IntoResponse, impl Into<Exception>>
/// ```
///
/// Sealed: only the blanket impl below can satisfy it.
pub trait Handler: private::SealedHandler + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

/// Implemented for every valid native handler:
///
/// ```text
/// async fn name(req: NativeRequest) -> Result<NativeResponse, Exception>
/// ```
pub trait NativeHandler: private::SealedNative + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedNativeHandler;
}

mod private {
    pub trait SealedHandler {}
    pub trait SealedNative {}
}

// ── Blanket implementations ───────────────────────────────────────────────────

impl<F, Fut, R, E> private::SealedHandler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: IntoResponse + Send + 'static,
    E: Into<Exception> + Send + 'static,
{
}

impl<F, Fut, R, E> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: IntoResponse + Send + 'static,
    E: Into<Exception> + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

impl<F, Fut> private::SealedNative for F
where
    F: Fn(NativeRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<NativeResponse, Exception>> + Send + 'static,
{
}

impl<F, Fut> NativeHandler for F
where
    F: Fn(NativeRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<NativeResponse, Exception>> + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedNativeHandler {
        Arc::new(FnNativeHandler(self))
    }
}

// ── Concrete wrappers ─────────────────────────────────────────────────────────

struct FnHandler<F>(F);

impl<F, Fut, R, E> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: IntoResponse + Send + 'static,
    E: Into<Exception> + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture<Outcome> {
        let fut = (self.0)(req);
        Box::pin(async move {
            match fut.await {
                Ok(res) => Ok(res.into_response()),
                Err(e) => Err(e.into()),
            }
        })
    }
}

struct FnNativeHandler<F>(F);

impl<F, Fut> ErasedNativeHandler for FnNativeHandler<F>
where
    F: Fn(NativeRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<NativeResponse, Exception>> + Send + 'static,
{
    fn call(&self, req: NativeRequest) -> BoxFuture<Result<NativeResponse, Exception>> {
        Box::pin((self.0)(req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn ok(_req: Request) -> Result<&'static str, Exception> {
        Ok("something")
    }

    async fn not_found(_req: Request) -> Result<Response, Exception> {
        Err(Exception::status(404))
    }

    async fn io_fault(_req: Request) -> Result<Response, std::io::Error> {
        Err(std::io::Error::other("disk gone"))
    }

    #[tokio::test]
    async fn boxed_handlers_convert_outcomes() {
        let req = || Request::new(http::Method::GET, "/");

        let res = Handler::into_boxed_handler(ok).call(req()).await.unwrap();
        assert_eq!(res.status_code(), 200);

        let err = Handler::into_boxed_handler(not_found).call(req()).await.unwrap_err();
        assert_eq!(err.status_code(), 404);

        let err = Handler::into_boxed_handler(io_fault).call(req()).await.unwrap_err();
        assert_eq!(err.original_status(), None);
        assert_eq!(err.message(), "disk gone");
    }
}
