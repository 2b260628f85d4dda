//! Merges object metadata, range framing and transform status into the
//! outbound response.

use crate::models::{
    envelope::{ResponseEnvelope, TransformStatus, X_TRANSFORM_STATUS},
    object::ObjectMeta,
    range::ContentRange,
};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use bytes::Bytes;

/// Objects at a key are treated as immutable content.
pub const CACHE_CONTROL_IMMUTABLE: &str = "public, max-age=31536000, immutable";

/// Build the response envelope. `status` is used as given, never overridden.
pub fn assemble(
    meta: &ObjectMeta,
    body: Bytes,
    status: StatusCode,
    transform_status: TransformStatus,
    framing: Option<ContentRange>,
) -> ResponseEnvelope {
    let mut headers = HeaderMap::new();
    set_object_headers(&mut headers, meta, body.len() as u64);

    if let Some(framing) = framing
        && let Ok(value) = HeaderValue::from_str(&framing.header_value())
    {
        headers.insert(header::CONTENT_RANGE, value);
    }

    headers.insert(
        X_TRANSFORM_STATUS,
        HeaderValue::from_static(transform_status.as_str()),
    );

    ResponseEnvelope {
        status,
        headers,
        body,
        transform_status,
    }
}

/// Bodyless response for `HEAD`; `Content-Length` reports the object size.
pub fn assemble_head(meta: &ObjectMeta) -> ResponseEnvelope {
    let mut envelope = assemble(
        meta,
        Bytes::new(),
        StatusCode::OK,
        TransformStatus::NotApplicable,
        None,
    );
    envelope
        .headers
        .insert(header::CONTENT_LENGTH, HeaderValue::from(meta.size));
    envelope
}

fn set_object_headers(headers: &mut HeaderMap, meta: &ObjectMeta, length: u64) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&meta.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));

    let quoted = format!("\"{}\"", meta.etag);
    if let Ok(value) = HeaderValue::from_str(&quoted) {
        headers.insert(header::ETAG, value);
    }

    let last_modified = meta
        .last_modified
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string();
    if let Ok(value) = HeaderValue::from_str(&last_modified) {
        headers.insert(header::LAST_MODIFIED, value);
    }

    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(CACHE_CONTROL_IMMUTABLE),
    );
    headers.insert(header::VARY, HeaderValue::from_static("Accept-Encoding"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn meta() -> ObjectMeta {
        ObjectMeta {
            size: 1000,
            etag: "abc123".into(),
            content_type: "image/png".into(),
            last_modified: Utc.with_ymd_and_hms(2025, 3, 4, 5, 6, 7).unwrap(),
        }
    }

    #[test]
    fn test_full_response_headers() {
        let envelope = assemble(
            &meta(),
            Bytes::from(vec![0u8; 1000]),
            StatusCode::OK,
            TransformStatus::NotApplicable,
            None,
        );
        let headers = &envelope.headers;
        assert_eq!(envelope.status, StatusCode::OK);
        assert_eq!(headers[header::ETAG], "\"abc123\"");
        assert_eq!(headers[header::ACCEPT_RANGES], "bytes");
        assert_eq!(headers[header::CACHE_CONTROL], CACHE_CONTROL_IMMUTABLE);
        assert_eq!(headers[header::CONTENT_TYPE], "image/png");
        assert_eq!(headers[header::CONTENT_LENGTH], "1000");
        assert_eq!(headers[header::LAST_MODIFIED], "Tue, 04 Mar 2025 05:06:07 GMT");
        assert_eq!(headers[X_TRANSFORM_STATUS], "not-applicable");
        assert!(headers.get(header::CONTENT_RANGE).is_none());
    }

    #[test]
    fn test_partial_response_keeps_status_and_frames_range() {
        let envelope = assemble(
            &meta(),
            Bytes::from(vec![0u8; 100]),
            StatusCode::PARTIAL_CONTENT,
            TransformStatus::NotApplicable,
            Some(ContentRange {
                start: 0,
                end: 99,
                total: 1000,
            }),
        );
        assert_eq!(envelope.status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(envelope.headers[header::CONTENT_RANGE], "bytes 0-99/1000");
        assert_eq!(envelope.headers[header::CONTENT_LENGTH], "100");
    }

    #[test]
    fn test_head_reports_object_size() {
        let envelope = assemble_head(&meta());
        assert!(envelope.body.is_empty());
        assert_eq!(envelope.headers[header::CONTENT_LENGTH], "1000");
        assert_eq!(envelope.headers[header::ETAG], "\"abc123\"");
    }

    #[test]
    fn test_transform_status_tag() {
        let envelope = assemble(
            &meta(),
            Bytes::from_static(b"x"),
            StatusCode::OK,
            TransformStatus::FallbackOriginal,
            None,
        );
        assert_eq!(envelope.headers[X_TRANSFORM_STATUS], "fallback-original");
    }
}
