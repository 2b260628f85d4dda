//! Range negotiation between the client's `Range` header and the span the
//! object store reports back.
//!
//! Only the single-span form `bytes=<start>-<end>?` is honoured. Anything
//! else (multi-range, suffix ranges, garbage) yields `None`, which callers
//! treat as "serve the full object", never as an error.

use crate::models::range::{ByteRange, ContentRange, ServedRange};
use tracing::debug;

/// Parse a `Range` header value into a store-native range.
pub fn parse(header: &str) -> Option<ByteRange> {
    let ranges = header.trim().strip_prefix("bytes=")?;

    if ranges.contains(',') {
        debug!("ignoring multi-range request {:?}", header);
        return None;
    }

    let (start, end) = ranges.split_once('-')?;
    let start = parse_position(start.trim())?;
    let end = end.trim();

    if end.is_empty() {
        return Some(ByteRange::open_ended(start));
    }

    ByteRange::inclusive(start, parse_position(end)?)
}

/// Strict decimal parse: digits only, no sign, no whitespace.
fn parse_position(value: &str) -> Option<u64> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

/// Translate the store's served span into `Content-Range` framing.
///
/// Returns `None` for shapes that cannot be framed against `total`; the
/// caller then falls back to a full, non-partial response.
pub fn frame(served: ServedRange, total: u64) -> Option<ContentRange> {
    if total == 0 {
        return None;
    }
    let (start, end) = match served {
        ServedRange::Bounded { offset, length } => {
            if length == 0 || offset >= total {
                return None;
            }
            (offset, offset.saturating_add(length).min(total) - 1)
        }
        ServedRange::From { offset } => {
            if offset >= total {
                return None;
            }
            (offset, total - 1)
        }
        ServedRange::Suffix { length } => {
            if length == 0 {
                return None;
            }
            (total.saturating_sub(length), total - 1)
        }
    };
    Some(ContentRange { start, end, total })
}
