//! Turns a parsed asset request into a response envelope.
//!
//! Order of decisions:
//! 1. `HEAD` answers from a metadata probe, without a body.
//! 2. A transform combined with a `Range` header is rejected.
//! 3. A transform is attempted once; on any failure the original object is
//!    served instead and tagged `fallback-original`.
//! 4. Otherwise the original is fetched, honouring a parseable range.

use crate::{
    errors::AppError,
    models::{
        envelope::{ResponseEnvelope, TransformStatus},
        object::{Lookup, ObjectKey, ObjectMeta},
        transform::TransformRequest,
    },
    services::{
        range_negotiator,
        response_assembler::{assemble, assemble_head},
        storage_service::{ObjectStore, StorageError, StorageResult},
        transformer::{TransformError, Transformer},
    },
};
use axum::http::StatusCode;
use std::{future::Future, sync::Arc, time::Duration};
use tokio::time::timeout;
use tracing::{debug, error, warn};

#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    pub key: ObjectKey,
    pub transform: Option<TransformRequest>,
    pub is_head: bool,
    pub range_header: Option<String>,
}

#[derive(Clone)]
pub struct DeliveryPipeline {
    store: Arc<dyn ObjectStore>,
    transformer: Arc<dyn Transformer>,
    /// Deadline applied to every store and transformer call.
    upstream_timeout: Duration,
}

impl DeliveryPipeline {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        transformer: Arc<dyn Transformer>,
        upstream_timeout: Duration,
    ) -> Self {
        Self {
            store,
            transformer,
            upstream_timeout,
        }
    }

    pub async fn deliver(&self, request: DeliveryRequest) -> Result<ResponseEnvelope, AppError> {
        let DeliveryRequest {
            key,
            transform,
            is_head,
            range_header,
        } = request;

        if key.is_empty() {
            return Err(AppError::not_found());
        }

        if is_head {
            let meta = found(self.bounded(self.store.head(&key)).await?)?;
            return Ok(assemble_head(&meta));
        }

        match transform {
            Some(_) if range_header.is_some() => {
                debug!("rejecting range request combined with transform for {}", key);
                Err(AppError::range_not_supported())
            }
            Some(options) => self.deliver_transformed(&key, &options).await,
            None => self.deliver_original(&key, range_header.as_deref()).await,
        }
    }

    async fn deliver_transformed(
        &self,
        key: &ObjectKey,
        options: &TransformRequest,
    ) -> Result<ResponseEnvelope, AppError> {
        let source = found(self.bounded(self.store.head(key)).await?)?;

        let attempt = match timeout(self.upstream_timeout, self.transformer.transform(key, options))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(TransformError::Timeout(self.upstream_timeout)),
        };

        match attempt {
            Ok(rendition) => {
                let meta = ObjectMeta {
                    size: rendition.body.len() as u64,
                    etag: rendition_etag(&source.etag, options),
                    content_type: rendition.content_type,
                    last_modified: source.last_modified,
                };
                Ok(assemble(
                    &meta,
                    rendition.body,
                    StatusCode::OK,
                    TransformStatus::Success,
                    None,
                ))
            }
            Err(err) => {
                warn!(key = %key, error = %err, "transformation failed, serving original");
                self.deliver_fallback(key).await
            }
        }
    }

    async fn deliver_fallback(&self, key: &ObjectKey) -> Result<ResponseEnvelope, AppError> {
        let object = match self.bounded(self.store.get(key, None)).await {
            Ok(lookup) => found(lookup)?,
            Err(err) => {
                error!(key = %key, error = %err, "fallback to original failed");
                return Err(AppError::transform());
            }
        };
        Ok(assemble(
            &object.meta,
            object.body,
            StatusCode::OK,
            TransformStatus::FallbackOriginal,
            None,
        ))
    }

    async fn deliver_original(
        &self,
        key: &ObjectKey,
        range_header: Option<&str>,
    ) -> Result<ResponseEnvelope, AppError> {
        let range = range_header.and_then(|value| {
            let parsed = range_negotiator::parse(value);
            if parsed.is_none() {
                debug!("ignoring unsupported range {:?} for {}", value, key);
            }
            parsed
        });

        let object = found(self.bounded(self.store.get(key, range)).await?)?;

        if let Some(served) = object.range {
            if let Some(framing) = range_negotiator::frame(served, object.meta.size) {
                return Ok(assemble(
                    &object.meta,
                    object.body,
                    StatusCode::PARTIAL_CONTENT,
                    TransformStatus::NotApplicable,
                    Some(framing),
                ));
            }
            warn!(key = %key, served = ?served, "unframeable range from store, serving full object");
            let full = found(self.bounded(self.store.get(key, None)).await?)?;
            return Ok(assemble(
                &full.meta,
                full.body,
                StatusCode::OK,
                TransformStatus::NotApplicable,
                None,
            ));
        }

        Ok(assemble(
            &object.meta,
            object.body,
            StatusCode::OK,
            TransformStatus::NotApplicable,
            None,
        ))
    }

    async fn bounded<T>(&self, call: impl Future<Output = StorageResult<T>>) -> StorageResult<T> {
        match timeout(self.upstream_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StorageError::Timeout(self.upstream_timeout)),
        }
    }
}

fn found<T>(lookup: Lookup<T>) -> Result<T, AppError> {
    match lookup {
        Lookup::Found(value) => Ok(value),
        Lookup::NotFound => Err(AppError::not_found()),
        Lookup::Incomplete => Err(AppError::incomplete_object()),
    }
}

/// Renditions get their own entity tag so they never validate against the original.
fn rendition_etag(source_etag: &str, options: &TransformRequest) -> String {
    format!(
        "{:x}",
        md5::compute(format!("{}|{}", source_etag, options.canonical()))
    )
}
