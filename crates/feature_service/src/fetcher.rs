use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::encoder::{FilterEncoding, QueryEncoder, QueryParams, QuerySpec};
use crate::error::FetchError;
use crate::response::{FeatureCollection, parse_collection};
use crate::transport::FeatureTransport;

/// Retries of a single request after transport failures.
///
/// This is separate from the fallback cascade, which changes the filter
/// rather than repeating it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total tries per request, including the first. Zero behaves like one.
    pub attempts: u32,
    /// Delay before retry `n` is `backoff * n`.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 1,
            backoff: Duration::from_millis(250),
        }
    }
}

/// Result of a query walked through the fallback cascade.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub collection: FeatureCollection,
    /// Encoding that produced `collection`.
    pub encoding: FilterEncoding,
    /// Requests sent, primary included.
    pub attempts: usize,
    pub via_fallback: bool,
}

pub struct FeatureFetcher {
    transport: Arc<dyn FeatureTransport>,
    retry: RetryPolicy,
}

impl FeatureFetcher {
    pub fn new(transport: Arc<dyn FeatureTransport>) -> Self {
        Self {
            transport,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sends one request and decodes the response.
    pub async fn query(&self, spec: &QuerySpec) -> Result<FeatureCollection, FetchError> {
        let attempts = self.retry.attempts.max(1);
        let mut attempt = 1;
        loop {
            debug!(encoding = ?spec.encoding, attempt, "feature query");
            match self.transport.get(spec.params.clone()).await {
                Ok(body) => return parse_collection(&body),
                Err(err) if err.is_retryable() && attempt < attempts => {
                    warn!("feature query attempt {attempt}/{attempts} failed: {err}");
                    tokio::time::sleep(self.retry.backoff * attempt).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Runs the primary request, then each fallback in policy order until one
    /// returns at least one feature.
    ///
    /// When nothing returns features, the primary's own result is reported,
    /// empty or failed, so "nothing here" is never replaced by a fallback's
    /// transport error.
    pub async fn query_with_fallbacks(
        &self,
        encoder: &QueryEncoder,
        params: &QueryParams,
    ) -> Result<QueryOutcome, FetchError> {
        let primary_spec = encoder.build_primary(params)?;
        let primary = self.query(&primary_spec).await;
        let mut attempts = 1;

        match &primary {
            Ok(c) if !c.is_empty() => {
                return Ok(QueryOutcome {
                    collection: c.clone(),
                    encoding: primary_spec.encoding,
                    attempts,
                    via_fallback: false,
                });
            }
            Ok(_) => debug!("primary feature query returned no features"),
            Err(err) => warn!("primary feature query failed: {err}"),
        }

        for spec in encoder.build_fallbacks(params) {
            attempts += 1;
            match self.query(&spec).await {
                Ok(c) if !c.is_empty() => {
                    info!(
                        encoding = ?spec.encoding,
                        features = c.len(),
                        "feature query succeeded via fallback"
                    );
                    return Ok(QueryOutcome {
                        collection: c,
                        encoding: spec.encoding,
                        attempts,
                        via_fallback: true,
                    });
                }
                Ok(_) => debug!(encoding = ?spec.encoding, "fallback returned no features"),
                Err(err) => warn!(encoding = ?spec.encoding, "fallback failed: {err}"),
            }
        }

        primary.map(|collection| QueryOutcome {
            collection,
            encoding: primary_spec.encoding,
            attempts,
            via_fallback: false,
        })
    }
}
