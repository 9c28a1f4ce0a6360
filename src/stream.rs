//! Lazy byte streams for response bodies.
//!
//! A [`ByteStream`] is consumed exactly once. When the response adapter
//! hands it to the transport it is wrapped in an [`ObservedStream`], which
//! reports the first I/O error to the error pipeline from whichever task is
//! polling the body, then ends the body with that error so the transport
//! aborts the response instead of finishing it cleanly.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use hyper::body::Frame;
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;

use crate::exception::Exception;
use crate::pipeline::ErrorPipeline;

/// A non-restartable, possibly unbounded producer of body bytes.
pub struct ByteStream(Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send + 'static>>);

impl ByteStream {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Self(Box::pin(stream))
    }

    /// Streams everything `reader` yields until EOF.
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        Self::new(ReaderStream::new(reader))
    }

    /// A stream yielding the given chunks in order.
    pub fn from_chunks<I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = Bytes>,
        I::IntoIter: Send + 'static,
    {
        Self::new(futures_util::stream::iter(chunks.into_iter().map(Ok)))
    }

    /// Puts an already-polled chunk back in front of the rest.
    pub(crate) fn prepend(self, chunk: Bytes) -> Self {
        Self::new(futures_util::stream::iter(Some(Ok(chunk))).chain(self))
    }
}

impl Stream for ByteStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.0.as_mut().poll_next(cx)
    }
}

impl fmt::Debug for ByteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ByteStream(..)")
    }
}

/// A response body stream with its error channel attached.
pub(crate) struct ObservedStream {
    inner: ByteStream,
    pipeline: Arc<ErrorPipeline>,
    failed: bool,
}

impl ObservedStream {
    pub(crate) fn new(inner: ByteStream, pipeline: Arc<ErrorPipeline>) -> Self {
        Self { inner, pipeline, failed: false }
    }
}

impl Stream for ObservedStream {
    type Item = Result<Frame<Bytes>, io::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.failed {
            return Poll::Ready(None);
        }
        match self.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(chunk))) => Poll::Ready(Some(Ok(Frame::data(chunk)))),
            Poll::Ready(Some(Err(e))) => {
                self.failed = true;
                self.pipeline.stream_fault(&Exception::from_error(&e));
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}
