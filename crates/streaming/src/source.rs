//! Imagery sources.
//!
//! `ImagerySource` is the seam between the pipeline and the network:
//! - `HttpImagerySource` talks to the imagery server.
//! - `MemoryImagerySource` serves canned images for tests and offline use.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use reqwest::Url;

use crate::cache::Image;
use crate::request::ImageryRequest;

/// Type alias for a boxed future that can be sent between threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageryError {
    InvalidUrl(String),
    Transport(String),
    Status(u16),
    NotFound,
}

impl std::fmt::Display for ImageryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageryError::InvalidUrl(msg) => write!(f, "invalid imagery url: {msg}"),
            ImageryError::Transport(msg) => write!(f, "imagery request failed: {msg}"),
            ImageryError::Status(code) => write!(f, "imagery server returned HTTP {code}"),
            ImageryError::NotFound => write!(f, "imagery not found"),
        }
    }
}

impl std::error::Error for ImageryError {}

/// Produces encoded image bytes for a request.
///
/// Implementations must be `Send + Sync` for use across async tasks.
pub trait ImagerySource: Send + Sync {
    fn fetch(&self, request: ImageryRequest) -> BoxFuture<'_, Result<Image, ImageryError>>;
}

/// Imagery server reached over HTTP.
///
/// Requests go to `{base}/images/{recording_id}/{item_id}?scale=..&yaw=..`.
pub struct HttpImagerySource {
    base_url: Url,
    client: reqwest::Client,
}

impl HttpImagerySource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ImageryError> {
        let base_url =
            Url::parse(base_url).map_err(|e| ImageryError::InvalidUrl(e.to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ImageryError::Transport(e.to_string()))?;
        Ok(Self { base_url, client })
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn request_url(&self, request: &ImageryRequest) -> Result<Url, ImageryError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ImageryError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend([
                "images",
                request.key.recording_id.as_str(),
                request.key.item_id.as_str(),
            ]);
        url.query_pairs_mut()
            .extend_pairs(request.query_pairs());
        Ok(url)
    }
}

impl ImagerySource for HttpImagerySource {
    fn fetch(&self, request: ImageryRequest) -> BoxFuture<'_, Result<Image, ImageryError>> {
        Box::pin(async move {
            let url = self.request_url(&request)?;
            let resp = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| ImageryError::Transport(e.to_string()))?;

            if resp.status() == reqwest::StatusCode::NOT_FOUND {
                return Err(ImageryError::NotFound);
            }
            if !resp.status().is_success() {
                return Err(ImageryError::Status(resp.status().as_u16()));
            }

            let content_type = resp
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);

            let bytes = resp
                .bytes()
                .await
                .map_err(|e| ImageryError::Transport(e.to_string()))?;

            let image = Image::new(bytes);
            Ok(match content_type {
                Some(ct) => image.with_content_type(ct),
                None => image,
            })
        })
    }
}

/// In-memory source keyed by `(recording_id, item_id)`; ignores camera
/// parameters. Counts every fetch so tests can assert cache behaviour.
#[derive(Debug, Default)]
pub struct MemoryImagerySource {
    images: RwLock<HashMap<(String, String), Image>>,
    fetches: AtomicUsize,
}

impl MemoryImagerySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_image(&self, recording_id: &str, item_id: &str, image: Image) {
        self.images
            .write()
            .insert((recording_id.to_string(), item_id.to_string()), image);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}

impl ImagerySource for MemoryImagerySource {
    fn fetch(&self, request: ImageryRequest) -> BoxFuture<'_, Result<Image, ImageryError>> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let found = self
            .images
            .read()
            .get(&(request.key.recording_id, request.key.item_id))
            .cloned();
        Box::pin(async move { found.ok_or(ImageryError::NotFound) })
    }
}

#[cfg(test)]
mod tests {
    use super::{HttpImagerySource, ImageryError, ImagerySource, MemoryImagerySource};
    use crate::cache::Image;
    use crate::request::{ImageryKey, ImageryRequest};
    use std::time::Duration;

    #[test]
    fn url_embeds_ids_and_encodes_them() {
        let src = HttpImagerySource::new("http://10.0.10.100:5050/web/", Duration::from_secs(5))
            .unwrap();
        let req = ImageryRequest::new(ImageryKey::new("Rotterdam 2023", "a/b")).with_size(600, 600);
        let url = src.request_url(&req).unwrap();
        assert_eq!(url.path(), "/web/images/Rotterdam%202023/a%2Fb");
        let query = url.query().unwrap();
        assert!(query.starts_with("yaw=0&pitch=-30&roll=0&fov=90"));
        assert!(query.ends_with("width=600&height=600"));
    }

    #[test]
    fn rejects_unparsable_base_url() {
        let err = HttpImagerySource::new("not a url", Duration::from_secs(1)).err();
        assert!(matches!(err, Some(ImageryError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn memory_source_serves_known_images() {
        let src = MemoryImagerySource::new();
        src.set_image("r", "i", Image::new(&b"jpeg"[..]));

        let hit = src.fetch(ImageryRequest::new(ImageryKey::new("r", "i"))).await;
        assert_eq!(hit.unwrap().bytes.as_ref(), b"jpeg");

        let miss = src.fetch(ImageryRequest::new(ImageryKey::new("r", "x"))).await;
        assert_eq!(miss, Err(ImageryError::NotFound));
        assert_eq!(src.fetch_count(), 2);
    }
}
