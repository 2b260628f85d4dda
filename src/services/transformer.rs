//! Client for the external image transformation service.
//!
//! The pixel work happens elsewhere. This side only forwards the validated
//! options and reports whether a rendition came back.

use crate::models::{object::ObjectKey, transform::TransformRequest};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Url, header::CONTENT_TYPE};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("no transformation service configured")]
    Unavailable,
    #[error("transformation service returned {status}")]
    Upstream { status: u16 },
    #[error("transformation service returned an empty body")]
    EmptyBody,
    #[error("invalid transformation endpoint {0}")]
    InvalidEndpoint(String),
    #[error("transformation timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

/// A derived rendition of a stored object.
#[derive(Debug, Clone)]
pub struct Rendition {
    pub body: Bytes,
    pub content_type: String,
}

#[async_trait]
pub trait Transformer: Send + Sync + 'static {
    async fn transform(
        &self,
        key: &ObjectKey,
        options: &TransformRequest,
    ) -> Result<Rendition, TransformError>;
}

/// Calls `GET {endpoint}/{key}?width=&height=&quality=&fit=&format=`.
#[derive(Clone, Debug)]
pub struct HttpTransformer {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransformer {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        }
    }

    /// Endpoint URL with the key appended one percent-encoded segment at a time.
    fn rendition_url(&self, key: &ObjectKey) -> Result<Url, TransformError> {
        let mut url = Url::parse(&self.endpoint).map_err(|err| {
            TransformError::InvalidEndpoint(format!("{}: {}", self.endpoint, err))
        })?;
        url.path_segments_mut()
            .map_err(|_| TransformError::InvalidEndpoint(self.endpoint.clone()))?
            .pop_if_empty()
            .extend(key.as_str().split('/'));
        Ok(url)
    }
}

#[async_trait]
impl Transformer for HttpTransformer {
    async fn transform(
        &self,
        key: &ObjectKey,
        options: &TransformRequest,
    ) -> Result<Rendition, TransformError> {
        let url = self.rendition_url(key)?;
        debug!("requesting rendition {} ({})", url, options.canonical());

        let response = self
            .client
            .get(url)
            .query(&options.options())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransformError::Upstream {
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| options.format.map(|f| f.content_type().to_string()))
            .unwrap_or_else(|| "application/octet-stream".into());

        let body = response.bytes().await?;
        if body.is_empty() {
            return Err(TransformError::EmptyBody);
        }

        Ok(Rendition { body, content_type })
    }
}

/// Stand-in used when no transformation service is configured. Every
/// attempt fails, so transform requests degrade to the original object.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledTransformer;

#[async_trait]
impl Transformer for DisabledTransformer {
    async fn transform(
        &self,
        _key: &ObjectKey,
        _options: &TransformRequest,
    ) -> Result<Rendition, TransformError> {
        Err(TransformError::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::transform::{DEFAULT_QUALITY, OutputFormat};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn options() -> TransformRequest {
        TransformRequest {
            width: Some(300),
            height: None,
            quality: DEFAULT_QUALITY,
            fit: None,
            format: Some(OutputFormat::WebP),
        }
    }

    #[tokio::test]
    async fn test_forwards_options_and_returns_rendition() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/photos/cat.jpg"))
            .and(query_param("width", "300"))
            .and(query_param("quality", "85"))
            .and(query_param("format", "webp"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(b"RIFFwebp".to_vec(), "image/webp"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let transformer = HttpTransformer::new(format!("{}/", server.uri()));
        let rendition = transformer
            .transform(&ObjectKey::from_path("/photos/cat.jpg"), &options())
            .await
            .unwrap();

        assert_eq!(&rendition.body[..], b"RIFFwebp");
        assert_eq!(rendition.content_type, "image/webp");
    }

    #[tokio::test]
    async fn test_key_segments_are_percent_encoded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/render/albums/my%20photo%231.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(b"png".to_vec(), "image/png"))
            .expect(1)
            .mount(&server)
            .await;

        let transformer = HttpTransformer::new(format!("{}/render", server.uri()));
        let rendition = transformer
            .transform(&ObjectKey::from_path("albums/my photo#1.jpg"), &options())
            .await
            .unwrap();
        assert_eq!(&rendition.body[..], b"png");
    }

    #[tokio::test]
    async fn test_unparseable_endpoint_is_an_error() {
        let err = HttpTransformer::new("not a url")
            .transform(&ObjectKey::from_path("cat.jpg"), &options())
            .await
            .unwrap_err();
        assert!(matches!(err, TransformError::InvalidEndpoint(_)));
    }

    #[tokio::test]
    async fn test_non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(415))
            .mount(&server)
            .await;

        let transformer = HttpTransformer::new(server.uri());
        let err = transformer
            .transform(&ObjectKey::from_path("cat.jpg"), &options())
            .await
            .unwrap_err();
        assert!(matches!(err, TransformError::Upstream { status: 415 }));
    }

    #[tokio::test]
    async fn test_empty_body_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let transformer = HttpTransformer::new(server.uri());
        let err = transformer
            .transform(&ObjectKey::from_path("cat.jpg"), &options())
            .await
            .unwrap_err();
        assert!(matches!(err, TransformError::EmptyBody));
    }

    #[tokio::test]
    async fn test_disabled_transformer_always_fails() {
        let err = DisabledTransformer
            .transform(&ObjectKey::from_path("cat.jpg"), &options())
            .await
            .unwrap_err();
        assert!(matches!(err, TransformError::Unavailable));
    }
}
