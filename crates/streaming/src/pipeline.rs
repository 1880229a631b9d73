use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::cache::{CacheStats, Image, ImageryCache};
use crate::request::{ImageryKey, ImageryRequest};
use crate::source::{ImageryError, ImagerySource};

/// Claim on the imagery target taken at navigation time.
///
/// A ticket is relevant while its key is the current target key, so
/// navigating away and back makes an earlier ticket for that key relevant
/// again. Results for any other key are never displayed.
#[derive(Debug, Clone)]
pub struct Ticket {
    request: ImageryRequest,
}

impl Ticket {
    pub fn key(&self) -> &ImageryKey {
        &self.request.key
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Served from the cache and now displayed.
    Cached(Image),
    /// Fetched from the source, cached and now displayed.
    Fetched(Image),
    /// The target moved on before the result was ready; nothing displayed.
    Superseded,
    /// Another resolve is already fetching this key and will display it.
    InFlight,
}

#[derive(Debug, Default)]
struct Target {
    key: Option<ImageryKey>,
    displayed: Option<(ImageryKey, Image)>,
}

/// Holds a key in the in-flight set until dropped, including when the
/// resolving future is dropped mid-fetch.
struct InFlight<'a> {
    keys: &'a Mutex<BTreeSet<ImageryKey>>,
    key: ImageryKey,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.keys.lock().remove(&self.key);
    }
}

/// Cache-backed imagery fetching with last-writer-wins display.
///
/// Retargeting is synchronous and never waits on I/O, so navigation stays
/// responsive while an older fetch is still running. When that fetch lands
/// its bytes are cached under their own key and displayed only if that key
/// is the target by then. At most one fetch per key runs at a time.
pub struct ImageryPipeline {
    source: Arc<dyn ImagerySource>,
    cache: Mutex<ImageryCache>,
    target: Mutex<Target>,
    in_flight: Mutex<BTreeSet<ImageryKey>>,
}

impl ImageryPipeline {
    pub fn new(source: Arc<dyn ImagerySource>, cache: ImageryCache) -> Self {
        Self {
            source,
            cache: Mutex::new(cache),
            target: Mutex::new(Target::default()),
            in_flight: Mutex::new(BTreeSet::new()),
        }
    }

    /// Points the pipeline at `request`, superseding tickets for other keys.
    ///
    /// A cached image for the new key is displayed immediately.
    pub fn retarget(&self, request: ImageryRequest) -> Ticket {
        let cached = self.cache.lock().get(&request.key).cloned();

        let mut target = self.target.lock();
        target.key = Some(request.key.clone());
        target.displayed = cached.map(|img| (request.key.clone(), img));

        Ticket { request }
    }

    /// Drops the target, e.g. when the selection becomes empty.
    pub fn clear_target(&self) {
        let mut target = self.target.lock();
        target.key = None;
        target.displayed = None;
    }

    pub fn is_current(&self, ticket: &Ticket) -> bool {
        self.target.lock().key.as_ref() == Some(ticket.key())
    }

    pub fn current_key(&self) -> Option<ImageryKey> {
        self.target.lock().key.clone()
    }

    pub fn displayed(&self) -> Option<(ImageryKey, Image)> {
        self.target.lock().displayed.clone()
    }

    pub fn cached(&self, key: &ImageryKey) -> Option<Image> {
        self.cache.lock().get(key).cloned()
    }

    /// Resolves `ticket` from the cache, or from the source on a miss.
    ///
    /// A miss for a key that is already being fetched returns `InFlight`
    /// without a second request. Errors for a ticket that went stale in the
    /// meantime are reported as `Superseded`, since nobody is waiting for
    /// that image any more.
    pub async fn resolve(&self, ticket: Ticket) -> Result<FetchOutcome, ImageryError> {
        let key = ticket.request.key.clone();

        if let Some(image) = self.cached(&key) {
            if self.display_if_current(&ticket, &image) {
                return Ok(FetchOutcome::Cached(image));
            }
            return Ok(FetchOutcome::Superseded);
        }

        if !self.in_flight.lock().insert(key.clone()) {
            debug!(recording = %key.recording_id, item = %key.item_id, "imagery already in flight");
            return Ok(FetchOutcome::InFlight);
        }
        let _in_flight = InFlight {
            keys: &self.in_flight,
            key: key.clone(),
        };

        debug!(recording = %key.recording_id, item = %key.item_id, "imagery cache miss");
        let fetched = self.source.fetch(ticket.request.clone()).await;

        let image = match fetched {
            Ok(image) => image,
            Err(err) if !self.is_current(&ticket) => {
                debug!("ignoring error for superseded imagery request: {err}");
                return Ok(FetchOutcome::Superseded);
            }
            Err(err) => return Err(err),
        };

        self.cache.lock().put(key.clone(), image.clone());

        if self.display_if_current(&ticket, &image) {
            Ok(FetchOutcome::Fetched(image))
        } else {
            warn!(
                recording = %key.recording_id,
                item = %key.item_id,
                "discarding imagery for superseded selection"
            );
            Ok(FetchOutcome::Superseded)
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.lock().stats()
    }

    fn display_if_current(&self, ticket: &Ticket, image: &Image) -> bool {
        let mut target = self.target.lock();
        if target.key.as_ref() != Some(ticket.key()) {
            return false;
        }
        target.displayed = Some((ticket.request.key.clone(), image.clone()));
        true
    }
}
