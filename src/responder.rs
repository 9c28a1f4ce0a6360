//! The response adapter: canonical [`Response`] → engine response.
//!
//! Headers first, in order, then the status, then the body. Buffered
//! content is written in one call; a stream is piped and the native
//! response is not complete until the stream ends.
//!
//! A stream is polled once before anything is written, so a source that
//! fails before its first byte becomes an ordinary error response.

use std::sync::Arc;

use futures_util::StreamExt;

use crate::engine::NativeResponse;
use crate::exception::Exception;
use crate::pipeline::ErrorPipeline;
use crate::response::{Content, Response};
use crate::stream::ByteStream;

const TEXT_HTML: &str = "text/html; charset=utf-8";
const JSON: &str = "application/json; charset=utf-8";
const OCTET_STREAM: &str = "application/octet-stream";

/// Writes `response` onto `res`.
///
/// A header name or value the transport cannot carry, a status outside
/// `100..=999`, or a stream whose first poll fails, errors before any body
/// is written.
pub(crate) async fn write(
    response: Response,
    res: &mut NativeResponse,
    pipeline: &Arc<ErrorPipeline>,
) -> Result<(), Exception> {
    let (status, headers, content) = response.into_parts();
    let content = match content {
        Content::Stream(stream) => Content::Stream(first_chunk(stream).await?),
        other => other,
    };

    for (name, value) in &headers {
        res.set_header(name, value)?;
    }
    res.set_status(status)?;

    match content {
        Content::Stream(stream) => res.pipe(stream, Arc::clone(pipeline)),
        Content::Empty => res.send(bytes::Bytes::new()),
        Content::Text(text) => {
            res.default_content_type(TEXT_HTML);
            res.send(text);
        }
        Content::Json(value) => {
            res.default_content_type(JSON);
            res.send(value.to_string());
        }
        Content::Bytes(bytes) => {
            res.default_content_type(OCTET_STREAM);
            res.send(bytes);
        }
    }
    Ok(())
}

async fn first_chunk(mut stream: ByteStream) -> Result<ByteStream, Exception> {
    match stream.next().await {
        Some(Ok(chunk)) => Ok(stream.prepend(chunk)),
        Some(Err(e)) => Err(Exception::from_error(&e)),
        None => Ok(ByteStream::from_chunks(Vec::new())),
    }
}
