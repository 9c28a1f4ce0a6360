//! Brotli for buffered response bodies.
//!
//! Only complete bodies are considered. Streams and ranged responses go out
//! as they are, since their lengths and offsets describe the raw bytes.

use std::io::Cursor;

use brotli::enc::BrotliEncoderParams;

/// Bodies below this size are sent as is.
pub(crate) const MIN_SIZE: usize = 256;

/// Bodies above this size are sent as is; compressing them costs more CPU
/// than it saves on the wire.
pub(crate) const MAX_SIZE: usize = 2 * 1024 * 1024;

const QUALITY: i32 = 4;
const WINDOW: i32 = 20;

/// Whether an `accept-encoding` value lists `br` with a non-zero weight.
pub(crate) fn accepts_brotli(accept_encoding: &str) -> bool {
    accept_encoding.split(',').any(|coding| {
        let mut parts = coding.split(';').map(str::trim);
        let name = parts.next().unwrap_or_default();
        let refused = parts.any(|p| {
            p.strip_prefix("q=")
                .and_then(|q| q.parse::<f32>().ok())
                .is_some_and(|q| q <= 0.0)
        });
        name.eq_ignore_ascii_case("br") && !refused
    })
}

/// Text-like media types. Images, video and archives are already compressed.
pub(crate) fn compressible(content_type: &str) -> bool {
    let essence = content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    essence.starts_with("text/")
        || essence.ends_with("+json")
        || essence.ends_with("+xml")
        || matches!(
            essence.as_str(),
            "application/json"
                | "application/javascript"
                | "application/xml"
                | "image/svg+xml"
                | "font/ttf"
                | "font/otf"
                | "application/vnd.ms-fontobject"
        )
}

/// Compresses `data`, or returns `None` when the output would not be smaller.
pub(crate) fn compress(data: &[u8]) -> Option<Vec<u8>> {
    let params = BrotliEncoderParams { quality: QUALITY, lgwin: WINDOW, ..Default::default() };
    let mut out = Vec::with_capacity(data.len() / 2);
    match brotli::BrotliCompress(&mut Cursor::new(data), &mut out, &params) {
        Ok(_) if out.len() < data.len() => Some(out),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) fn decompress(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    brotli::BrotliDecompress(&mut Cursor::new(data), &mut out).unwrap();
    out
}
