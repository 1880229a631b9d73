//! Selection, navigation and imagery wired together for one viewer.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use feature_service::{FeatureFetcher, FetchError, QueryEncoder, QueryOutcome, QueryParams};
use scene::{FeatureId, FeatureSyncPort, SelectionState, SharedFeature};
use streaming::{
    BoxFuture, CameraParams, FetchOutcome, Image, ImageryError, ImageryKey, ImageryPipeline,
    ImageryRequest, Ticket,
};
use tracing::debug;

/// Output-only imagery parameters; they do not take part in the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutputOptions {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub mode: Option<String>,
}

/// One viewer's state: the last discovered features, the selection over
/// them, the camera, and the imagery target that follows the cursor.
///
/// Every method except `discover` is synchronous. Imagery for the current
/// feature is fetched by awaiting the future from `refresh_image`, which
/// holds no borrow of the session, so navigation can continue while it runs.
pub struct Session {
    encoder: QueryEncoder,
    fetcher: FeatureFetcher,
    pipeline: Arc<ImageryPipeline>,
    sync: Arc<dyn FeatureSyncPort>,
    selection: SelectionState,
    discovered: Vec<SharedFeature>,
    camera: CameraParams,
    output: OutputOptions,
    ticket: Option<Ticket>,
}

impl Session {
    pub fn new(
        fetcher: FeatureFetcher,
        pipeline: Arc<ImageryPipeline>,
        sync: Arc<dyn FeatureSyncPort>,
    ) -> Self {
        Self {
            encoder: QueryEncoder::new(),
            fetcher,
            pipeline,
            sync,
            selection: SelectionState::default(),
            discovered: Vec::new(),
            camera: CameraParams::default(),
            output: OutputOptions::default(),
            ticket: None,
        }
    }

    pub fn with_multi_select(mut self, multi_select: bool) -> Self {
        self.selection.set_multi_select(multi_select);
        self
    }

    pub fn with_output(mut self, output: OutputOptions) -> Self {
        self.output = output;
        self
    }

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    pub fn discovered(&self) -> &[SharedFeature] {
        &self.discovered
    }

    pub fn current(&self) -> Option<&SharedFeature> {
        self.selection.current()
    }

    pub fn camera(&self) -> CameraParams {
        self.camera
    }

    pub fn pipeline(&self) -> &Arc<ImageryPipeline> {
        &self.pipeline
    }

    pub fn displayed_image(&self) -> Option<(ImageryKey, Image)> {
        self.pipeline.displayed()
    }

    /// Queries the feature service and replaces the discovered set.
    ///
    /// The previous selection refers to features that are no longer listed,
    /// so it is released. On error nothing changes.
    pub async fn discover(&mut self, params: &QueryParams) -> Result<QueryOutcome, FetchError> {
        let outcome = self
            .fetcher
            .query_with_fallbacks(&self.encoder, params)
            .await?;

        let had_selection = !self.selection.is_empty();
        self.selection.clear();
        self.discovered = outcome.collection.features.clone();
        self.sync.on_features_discovered(&self.discovered);
        if had_selection {
            self.selection_changed();
        }
        Ok(outcome)
    }

    /// Selects the discovered feature `id`. Unknown ids are ignored.
    pub fn select(&mut self, id: &FeatureId) -> bool {
        let Some(feature) = self.discovered.iter().find(|f| &f.id == id).cloned() else {
            debug!(%id, "select ignored: feature not discovered");
            return false;
        };
        self.select_feature(&feature)
    }

    pub fn select_feature(&mut self, feature: &SharedFeature) -> bool {
        let changed = self.selection.add(feature);
        if changed {
            self.selection_changed();
        }
        changed
    }

    /// Selects every discovered feature in discovery order; the last one
    /// becomes current.
    pub fn select_all(&mut self) -> bool {
        let changed = self.selection.add_all(self.discovered.iter());
        if changed {
            self.selection_changed();
        }
        changed
    }

    pub fn deselect(&mut self, id: &FeatureId) -> bool {
        let changed = self.selection.remove(id);
        if changed {
            self.selection_changed();
        }
        changed
    }

    pub fn clear(&mut self) {
        if self.selection.is_empty() {
            return;
        }
        self.selection.clear();
        self.selection_changed();
    }

    pub fn next(&mut self) -> Option<SharedFeature> {
        let current = self.selection.next().cloned();
        self.retarget();
        current
    }

    pub fn previous(&mut self) -> Option<SharedFeature> {
        let current = self.selection.previous().cloned();
        self.retarget();
        current
    }

    pub fn first(&mut self) -> Option<SharedFeature> {
        let current = self.selection.first().cloned();
        self.retarget();
        current
    }

    pub fn last(&mut self) -> Option<SharedFeature> {
        let current = self.selection.last().cloned();
        self.retarget();
        current
    }

    pub fn seek_nearest(&mut self, target: DateTime<Utc>) -> Option<SharedFeature> {
        let current = self.selection.seek_nearest(target).cloned();
        self.retarget();
        current
    }

    /// Changing the view is a new imagery key for the same feature.
    pub fn set_camera(&mut self, camera: CameraParams) {
        self.camera = camera;
        self.retarget();
    }

    /// Fetch for the current imagery target, or `None` when nothing is
    /// selected or the current feature has no imagery ids.
    ///
    /// The result is shown only if the target has not moved on by the time
    /// it lands; otherwise it resolves to `FetchOutcome::Superseded`.
    pub fn refresh_image(
        &self,
    ) -> Option<BoxFuture<'static, Result<FetchOutcome, ImageryError>>> {
        let ticket = self.ticket.clone()?;
        let pipeline = Arc::clone(&self.pipeline);
        Some(Box::pin(async move { pipeline.resolve(ticket).await }))
    }

    fn selection_changed(&mut self) {
        self.sync.on_selection_changed(self.selection.items());
        self.retarget();
    }

    fn request_for(&self, feature: &SharedFeature) -> Option<ImageryRequest> {
        let key = ImageryKey::for_feature(feature, self.camera)?;
        let mut request = ImageryRequest::new(key);
        if let (Some(w), Some(h)) = (self.output.width, self.output.height) {
            request = request.with_size(w, h);
        }
        if let Some(mode) = &self.output.mode {
            request = request.with_mode(mode.clone());
        }
        Some(request)
    }

    fn retarget(&mut self) {
        let request = match self.selection.current() {
            Some(feature) => {
                let request = self.request_for(feature);
                if request.is_none() {
                    debug!(id = %feature.id, "current feature has no imagery ids");
                }
                request
            }
            None => None,
        };

        let Some(request) = request else {
            self.ticket = None;
            self.pipeline.clear_target();
            return;
        };

        // Same view still pending: keep the in-flight ticket.
        if let Some(ticket) = &self.ticket {
            if ticket.key() == &request.key && self.pipeline.is_current(ticket) {
                return;
            }
        }
        self.ticket = Some(self.pipeline.retarget(request));
    }
}
