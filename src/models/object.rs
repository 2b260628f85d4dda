//! Represents an object (blob) served from the backing object store.

use crate::models::range::ServedRange;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::fmt;

/// Storage identifier derived from a request path.
///
/// The leading `/` of the path is stripped; everything else is kept verbatim,
/// so `/photos/2025/img.jpg` addresses the key `photos/2025/img.jpg`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectKey(String);

impl ObjectKey {
    pub fn from_path(path: &str) -> Self {
        Self(path.strip_prefix('/').unwrap_or(path).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lowercased file extension of the last path segment, if any.
    pub fn extension(&self) -> Option<String> {
        let name = self.0.rsplit('/').next()?;
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Metadata of a stored object, read fresh from the store on every request.
///
/// This is never cached on its own; it only travels inside assembled responses.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectMeta {
    /// Size of the full object in bytes.
    pub size: u64,

    /// Entity tag, unquoted.
    pub etag: String,

    /// Content type (MIME type).
    pub content_type: String,

    /// Timestamp when object was last modified.
    pub last_modified: DateTime<Utc>,
}

/// A fetched object body together with the span of the object it covers.
#[derive(Clone, Debug)]
pub struct StoredObject {
    pub meta: ObjectMeta,
    pub body: Bytes,

    /// Set when the store served a partial span instead of the full object.
    pub range: Option<ServedRange>,
}

/// Outcome of a store lookup that reached the backend successfully.
#[derive(Clone, Debug)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
    /// The key resolves to something that is not a readable object.
    Incomplete,
}
