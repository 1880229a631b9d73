//! HTTP seam for feature queries.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use reqwest::Url;

use crate::error::FetchError;

/// Type alias for a boxed future that can be sent between threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Issues one GET with the given query-string pairs and returns the body.
///
/// Implementations must be `Send + Sync` for use across async tasks.
pub trait FeatureTransport: Send + Sync {
    fn get(&self, params: Vec<(String, String)>) -> BoxFuture<'_, Result<Bytes, FetchError>>;
}

/// Feature service reached over HTTP.
pub struct HttpTransport {
    endpoint: Url,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, FetchError> {
        let endpoint = Url::parse(endpoint).map_err(|e| {
            FetchError::invalid_query(format!("invalid feature service url {endpoint:?}: {e}"))
        })?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::transport_with("failed to build HTTP client", e))?;
        Ok(Self { endpoint, client })
    }

    /// Shares a client (and its connection pool) with other HTTP sources.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }
}

impl FeatureTransport for HttpTransport {
    fn get(&self, params: Vec<(String, String)>) -> BoxFuture<'_, Result<Bytes, FetchError>> {
        Box::pin(async move {
            let resp = self
                .client
                .get(self.endpoint.clone())
                .query(&params)
                .send()
                .await
                .map_err(|e| FetchError::transport_with("feature query failed", e))?;

            if !resp.status().is_success() {
                return Err(FetchError::transport(format!(
                    "feature service returned HTTP {}",
                    resp.status()
                )));
            }

            resp.bytes()
                .await
                .map_err(|e| FetchError::transport_with("failed to read feature response", e))
        })
    }
}

type Responder = dyn Fn(&[(String, String)]) -> Result<Bytes, FetchError> + Send + Sync;

/// Transport answering from a closure, for tests and offline runs.
/// Keeps every request it was asked to send.
pub struct FnTransport {
    respond: Box<Responder>,
    requests: Mutex<Vec<Vec<(String, String)>>>,
    calls: AtomicUsize,
}

impl FnTransport {
    pub fn new<F>(respond: F) -> Self
    where
        F: Fn(&[(String, String)]) -> Result<Bytes, FetchError> + Send + Sync + 'static,
    {
        Self {
            respond: Box::new(respond),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn requests(&self) -> Vec<Vec<(String, String)>> {
        self.requests.lock().clone()
    }
}

impl FeatureTransport for FnTransport {
    fn get(&self, params: Vec<(String, String)>) -> BoxFuture<'_, Result<Bytes, FetchError>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let result = (self.respond)(&params);
        self.requests.lock().push(params);
        Box::pin(async move { result })
    }
}
