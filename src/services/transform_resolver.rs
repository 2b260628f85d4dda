//! Resolves transformation options from the request query string.
//!
//! Each recognised parameter is validated on its own. An invalid value drops
//! that one field and keeps its siblings; it never fails the request.

use crate::models::{
    object::ObjectKey,
    transform::{DEFAULT_QUALITY, Fit, MAX_DIMENSION, OutputFormat, TransformRequest},
};
use std::collections::HashMap;
use tracing::debug;

const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "gif", "webp", "avif"];
const PARAM_NAMES: [&str; 5] = ["w", "h", "q", "fit", "f"];

pub fn is_image(key: &ObjectKey) -> bool {
    key.extension()
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// Returns `None` when nothing should be transformed: the object is not an
/// image, no recognised parameter is present, or the only parameter asks for
/// an output format that cannot be delivered as an image.
pub fn resolve(key: &ObjectKey, query: &HashMap<String, String>) -> Option<TransformRequest> {
    if !is_image(key) {
        return None;
    }

    let present: Vec<&str> = PARAM_NAMES
        .iter()
        .copied()
        .filter(|name| query.contains_key(*name))
        .collect();
    if present.is_empty() {
        return None;
    }

    let format = query.get("f").and_then(|v| OutputFormat::parse(&v.to_ascii_lowercase()));
    if present == ["f"] && format.is_none() {
        debug!("suppressing transform of {}: unsupported output format", key);
        return None;
    }

    let request = TransformRequest {
        width: query.get("w").and_then(|v| dimension(v)),
        height: query.get("h").and_then(|v| dimension(v)),
        quality: query.get("q").and_then(|v| quality(v)).unwrap_or(DEFAULT_QUALITY),
        fit: query.get("fit").and_then(|v| Fit::parse(&v.to_ascii_lowercase())),
        format,
    };
    debug!("resolved transform for {}: {}", key, request.canonical());
    Some(request)
}

/// Strict unsigned integer: ASCII digits only.
fn integer(value: &str) -> Option<u32> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

fn dimension(value: &str) -> Option<u32> {
    integer(value).filter(|v| (1..=MAX_DIMENSION).contains(v))
}

fn quality(value: &str) -> Option<u8> {
    integer(value)
        .filter(|v| (1..=100).contains(v))
        .and_then(|v| u8::try_from(v).ok())
}
