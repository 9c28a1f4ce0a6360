//! `Range: bytes=...` parsing for ranged file delivery.
//!
//! Only single ranges are served. Multi-range requests and headers that do
//! not parse are ignored and the full representation is sent, which is what
//! RFC 9110 allows a server to do.

use crate::exception::Exception;

/// An inclusive byte range within a representation of known length.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes covered, `end - start + 1`. Never zero.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` value: `bytes 1-200/424925`.
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total)
    }
}

/// Resolves a `Range` header against a representation of `total` bytes.
///
/// `Ok(None)` means "serve everything". A syntactically valid range that
/// lies entirely outside the representation fails with `416`.
pub fn parse(header: &str, total: u64) -> Result<Option<ByteRange>, Exception> {
    let Some(spec) = header.trim().strip_prefix("bytes=") else {
        return Ok(None);
    };
    if spec.contains(',') {
        return Ok(None);
    }
    let Some((start, end)) = spec.trim().split_once('-') else {
        return Ok(None);
    };
    let (start, end) = (start.trim(), end.trim());

    let range = match (start.is_empty(), end.is_empty()) {
        // bytes=-500: the last 500 bytes
        (true, false) => {
            let Ok(suffix) = end.parse::<u64>() else { return Ok(None) };
            if suffix == 0 || total == 0 {
                return Err(unsatisfiable(total));
            }
            ByteRange { start: total.saturating_sub(suffix), end: total - 1 }
        }
        // bytes=500-
        (false, true) => {
            let Ok(start) = start.parse::<u64>() else { return Ok(None) };
            if start >= total {
                return Err(unsatisfiable(total));
            }
            ByteRange { start, end: total - 1 }
        }
        (false, false) => {
            let (Ok(start), Ok(end)) = (start.parse::<u64>(), end.parse::<u64>()) else {
                return Ok(None);
            };
            if start > end {
                return Ok(None);
            }
            if start >= total {
                return Err(unsatisfiable(total));
            }
            ByteRange { start, end: end.min(total - 1) }
        }
        (true, true) => return Ok(None),
    };

    Ok(Some(range))
}

fn unsatisfiable(total: u64) -> Exception {
    let range = format!("bytes */{total}");
    Exception::status(416)
        .with_header("content-range", range.clone())
        .with_field("contentRange", range)
}
