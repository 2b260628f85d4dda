//! src/services/storage_service.rs
//!
//! Object store gateway. The pipeline only talks to the [`ObjectStore`]
//! capability; [`DiskObjectStore`] is the bundled binding that serves objects
//! from a directory on local disk, addressed as `base_path/{key}`.

use crate::models::{
    object::{Lookup, ObjectKey, ObjectMeta, StoredObject},
    range::{ByteRange, ServedRange},
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::{
    io::{self, ErrorKind, SeekFrom},
    path::PathBuf,
    time::UNIX_EPOCH,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::{AsyncReadExt, AsyncSeekExt},
};
use tracing::debug;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage call timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Read access to the authoritative object store.
///
/// `Ok(Lookup::NotFound)` and `Ok(Lookup::Incomplete)` are regular answers;
/// `Err` is reserved for transport or backend faults.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Metadata probe that never transfers the body.
    async fn head(&self, key: &ObjectKey) -> StorageResult<Lookup<ObjectMeta>>;

    /// Fetch the full body, or only `range` when given and satisfiable.
    async fn get(
        &self,
        key: &ObjectKey,
        range: Option<ByteRange>,
    ) -> StorageResult<Lookup<StoredObject>>;
}

const MAX_OBJECT_KEY_LEN: usize = 1024;

/// Objects stored as plain files beneath `base_path`.
#[derive(Clone, Debug)]
pub struct DiskObjectStore {
    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,
}

impl DiskObjectStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Basic key validation to avoid path traversal.
    ///
    /// Rejects empty or oversized keys, keys that begin with `/`, contain `..`,
    /// backslashes or control characters.
    fn is_key_safe(key: &str) -> bool {
        !key.is_empty()
            && key.len() <= MAX_OBJECT_KEY_LEN
            && !key.starts_with('/')
            && !key.contains("..")
            && !key
                .bytes()
                .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
    }

    fn object_path(&self, key: &ObjectKey) -> Option<PathBuf> {
        if !Self::is_key_safe(key.as_str()) {
            debug!("rejecting unsafe object key {:?}", key.as_str());
            return None;
        }
        Some(self.base_path.join(key.as_str()))
    }

    fn describe(key: &ObjectKey, meta: &std::fs::Metadata) -> ObjectMeta {
        let modified = meta.modified().unwrap_or(UNIX_EPOCH);
        let nanos = modified
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let etag = md5::compute(format!("{}:{}:{}", key, meta.len(), nanos));

        ObjectMeta {
            size: meta.len(),
            etag: format!("{:x}", etag),
            content_type: content_type_for(key).to_string(),
            last_modified: DateTime::<Utc>::from(modified),
        }
    }
}

/// Missing files, and paths that run through a regular file, do not exist as objects.
fn is_absent(err: &io::Error) -> bool {
    matches!(err.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory)
}

/// Clamp a requested range to the object; `None` means serve the full body.
fn resolve_span(range: Option<ByteRange>, size: u64) -> Option<(u64, u64, ServedRange)> {
    let range = range?;
    if size == 0 || range.offset >= size {
        return None;
    }
    match range.length {
        Some(0) => None,
        Some(length) => {
            let length = length.min(size - range.offset);
            Some((
                range.offset,
                length,
                ServedRange::Bounded {
                    offset: range.offset,
                    length,
                },
            ))
        }
        None => Some((
            range.offset,
            size - range.offset,
            ServedRange::From {
                offset: range.offset,
            },
        )),
    }
}

#[async_trait]
impl ObjectStore for DiskObjectStore {
    async fn head(&self, key: &ObjectKey) -> StorageResult<Lookup<ObjectMeta>> {
        let Some(path) = self.object_path(key) else {
            return Ok(Lookup::NotFound);
        };
        let meta = match fs::metadata(&path).await {
            Ok(meta) => meta,
            Err(err) if is_absent(&err) => return Ok(Lookup::NotFound),
            Err(err) => return Err(StorageError::Io(err)),
        };
        if !meta.is_file() {
            return Ok(Lookup::Incomplete);
        }
        Ok(Lookup::Found(Self::describe(key, &meta)))
    }

    async fn get(
        &self,
        key: &ObjectKey,
        range: Option<ByteRange>,
    ) -> StorageResult<Lookup<StoredObject>> {
        let Some(path) = self.object_path(key) else {
            return Ok(Lookup::NotFound);
        };
        let mut file = match File::open(&path).await {
            Ok(file) => file,
            Err(err) if is_absent(&err) => return Ok(Lookup::NotFound),
            Err(err) => return Err(StorageError::Io(err)),
        };
        let fs_meta = file.metadata().await?;
        if !fs_meta.is_file() {
            return Ok(Lookup::Incomplete);
        }
        let meta = Self::describe(key, &fs_meta);

        let (body, served) = match resolve_span(range, meta.size) {
            Some((offset, length, served)) => {
                file.seek(SeekFrom::Start(offset)).await?;
                let mut buf = vec![0u8; length as usize];
                file.read_exact(&mut buf).await?;
                (buf, Some(served))
            }
            None => {
                let mut buf = Vec::with_capacity(meta.size as usize);
                file.read_to_end(&mut buf).await?;
                (buf, None)
            }
        };

        debug!(
            "read {} bytes of {} (range={:?})",
            body.len(),
            key,
            served
        );

        Ok(Lookup::Found(StoredObject {
            meta,
            body: Bytes::from(body),
            range: served,
        }))
    }
}

/// Content type guessed from the key's extension.
pub fn content_type_for(key: &ObjectKey) -> &'static str {
    match key.extension().as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("avif") => "image/avif",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("bmp") => "image/bmp",
        Some("json") => "application/json",
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain; charset=utf-8",
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css",
        Some("js") => "text/javascript",
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mp3") => "audio/mpeg",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn store_with(files: &[(&str, &[u8])]) -> (TempDir, DiskObjectStore) {
        let dir = TempDir::new().unwrap();
        for (key, data) in files {
            let path = dir.path().join(key);
            fs::create_dir_all(path.parent().unwrap()).await.unwrap();
            fs::write(&path, data).await.unwrap();
        }
        let store = DiskObjectStore::new(dir.path());
        (dir, store)
    }

    fn found<T>(lookup: Lookup<T>) -> T {
        match lookup {
            Lookup::Found(value) => value,
            Lookup::NotFound => panic!("expected object, got NotFound"),
            Lookup::Incomplete => panic!("expected object, got Incomplete"),
        }
    }

    #[tokio::test]
    async fn test_head_reports_metadata_without_body() {
        let (_dir, store) = store_with(&[("img/cat.png", &b"0123456789"[..])]).await;
        let meta = found(store.head(&ObjectKey::from_path("/img/cat.png")).await.unwrap());
        assert_eq!(meta.size, 10);
        assert_eq!(meta.content_type, "image/png");
        assert_eq!(meta.etag.len(), 32);
    }

    #[tokio::test]
    async fn test_head_and_get_share_etag() {
        let (_dir, store) = store_with(&[("a.bin", &b"abc"[..])]).await;
        let key = ObjectKey::from_path("a.bin");
        let head = found(store.head(&key).await.unwrap());
        let get = found(store.get(&key, None).await.unwrap());
        assert_eq!(head.etag, get.meta.etag);
        assert_eq!(&get.body[..], b"abc");
        assert!(get.range.is_none());
    }

    #[tokio::test]
    async fn test_missing_and_unsafe_keys_are_not_found() {
        let (_dir, store) = store_with(&[("a.bin", &b"abc"[..])]).await;
        for path in ["/nope.bin", "/../etc/passwd", "/", "/a.bin/child"] {
            let key = ObjectKey::from_path(path);
            assert!(matches!(store.head(&key).await.unwrap(), Lookup::NotFound), "{path}");
            assert!(matches!(store.get(&key, None).await.unwrap(), Lookup::NotFound), "{path}");
        }
    }

    #[tokio::test]
    async fn test_directory_is_incomplete() {
        let (_dir, store) = store_with(&[("dir/inner.bin", &b"x"[..])]).await;
        let key = ObjectKey::from_path("/dir");
        assert!(matches!(store.head(&key).await.unwrap(), Lookup::Incomplete));
        assert!(matches!(store.get(&key, None).await.unwrap(), Lookup::Incomplete));
    }

    #[tokio::test]
    async fn test_bounded_range_read() {
        let data: Vec<u8> = (0..=255).collect();
        let (_dir, store) = store_with(&[("r.bin", &data[..])]).await;
        let key = ObjectKey::from_path("r.bin");

        let object = found(
            store
                .get(&key, ByteRange::inclusive(10, 19))
                .await
                .unwrap(),
        );
        assert_eq!(&object.body[..], &data[10..20]);
        assert_eq!(
            object.range,
            Some(ServedRange::Bounded {
                offset: 10,
                length: 10
            })
        );
        assert_eq!(object.meta.size, 256);
    }

    #[tokio::test]
    async fn test_range_end_clamped_and_open_ended() {
        let data: Vec<u8> = (0..100).collect();
        let (_dir, store) = store_with(&[("r.bin", &data[..])]).await;
        let key = ObjectKey::from_path("r.bin");

        let clamped = found(store.get(&key, ByteRange::inclusive(90, 500)).await.unwrap());
        assert_eq!(&clamped.body[..], &data[90..]);

        let open = found(store.get(&key, Some(ByteRange::open_ended(95))).await.unwrap());
        assert_eq!(&open.body[..], &data[95..]);
        assert_eq!(open.range, Some(ServedRange::From { offset: 95 }));
    }

    #[tokio::test]
    async fn test_unsatisfiable_range_serves_full_body() {
        let (_dir, store) = store_with(&[("r.bin", &b"short"[..])]).await;
        let object = found(
            store
                .get(&ObjectKey::from_path("r.bin"), Some(ByteRange::open_ended(50)))
                .await
                .unwrap(),
        );
        assert_eq!(&object.body[..], b"short");
        assert!(object.range.is_none());
    }

    #[test]
    fn test_content_type_for_extensions() {
        assert_eq!(content_type_for(&ObjectKey::from_path("a.JPG")), "image/jpeg");
        assert_eq!(
            content_type_for(&ObjectKey::from_path("a")),
            "application/octet-stream"
        );
    }
}
