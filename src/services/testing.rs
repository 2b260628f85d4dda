//! In-memory stand-ins for the object store and the transformation service.

use crate::models::{
    object::{Lookup, ObjectKey, ObjectMeta, StoredObject},
    range::{ByteRange, ServedRange},
    transform::TransformRequest,
};
use crate::services::{
    storage_service::{ObjectStore, StorageError, StorageResult, content_type_for},
    transformer::{Rendition, TransformError, Transformer},
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use std::{
    collections::{HashMap, HashSet},
    io,
    sync::{
        RwLock,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, Bytes>>,
    incomplete: RwLock<HashSet<String>>,
    pub fail_head: AtomicBool,
    pub fail_get: AtomicBool,
    pub gets: AtomicUsize,
}

impl MemoryObjectStore {
    pub fn with(objects: &[(&str, &[u8])]) -> Self {
        let store = Self::default();
        for (key, data) in objects {
            store
                .objects
                .write()
                .unwrap()
                .insert(key.to_string(), Bytes::copy_from_slice(data));
        }
        store
    }

    /// Make `key` resolve to something that is not a readable object.
    pub fn mark_incomplete(&self, key: &str) {
        self.incomplete.write().unwrap().insert(key.to_string());
    }

    fn is_incomplete(&self, key: &ObjectKey) -> bool {
        self.incomplete.read().unwrap().contains(key.as_str())
    }

    fn meta(key: &ObjectKey, data: &Bytes) -> ObjectMeta {
        ObjectMeta {
            size: data.len() as u64,
            etag: format!("{:x}", md5::compute(data)),
            content_type: content_type_for(key).to_string(),
            last_modified: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn fault() -> StorageError {
        StorageError::Io(io::Error::other("backend unavailable"))
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn head(&self, key: &ObjectKey) -> StorageResult<Lookup<ObjectMeta>> {
        if self.fail_head.load(Ordering::SeqCst) {
            return Err(Self::fault());
        }
        if self.is_incomplete(key) {
            return Ok(Lookup::Incomplete);
        }
        let objects = self.objects.read().unwrap();
        Ok(match objects.get(key.as_str()) {
            Some(data) => Lookup::Found(Self::meta(key, data)),
            None => Lookup::NotFound,
        })
    }

    async fn get(
        &self,
        key: &ObjectKey,
        range: Option<ByteRange>,
    ) -> StorageResult<Lookup<StoredObject>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(Self::fault());
        }
        if self.is_incomplete(key) {
            return Ok(Lookup::Incomplete);
        }
        let objects = self.objects.read().unwrap();
        let Some(data) = objects.get(key.as_str()) else {
            return Ok(Lookup::NotFound);
        };
        let meta = Self::meta(key, data);
        let size = data.len() as u64;

        let (body, served) = match range {
            Some(range) if range.offset < size => {
                let end = match range.length {
                    Some(length) => (range.offset + length).min(size),
                    None => size,
                };
                let served = match range.length {
                    Some(_) => ServedRange::Bounded {
                        offset: range.offset,
                        length: end - range.offset,
                    },
                    None => ServedRange::From {
                        offset: range.offset,
                    },
                };
                (data.slice(range.offset as usize..end as usize), Some(served))
            }
            _ => (data.clone(), None),
        };

        Ok(Lookup::Found(StoredObject {
            meta,
            body,
            range: served,
        }))
    }
}

pub enum FakeBehavior {
    Succeed(&'static [u8]),
    Fail,
    Hang,
}

pub struct FakeTransformer {
    behavior: FakeBehavior,
    pub calls: AtomicUsize,
}

impl FakeTransformer {
    pub fn new(behavior: FakeBehavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Transformer for FakeTransformer {
    async fn transform(
        &self,
        _key: &ObjectKey,
        options: &TransformRequest,
    ) -> Result<Rendition, TransformError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            FakeBehavior::Succeed(body) => Ok(Rendition {
                body: Bytes::from_static(body),
                content_type: options
                    .format
                    .map(|f| f.content_type())
                    .unwrap_or("image/jpeg")
                    .to_string(),
            }),
            FakeBehavior::Fail => Err(TransformError::Upstream { status: 500 }),
            FakeBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(TransformError::Upstream { status: 504 })
            }
        }
    }
}
