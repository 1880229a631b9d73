use scene::{FeatureSyncPort, SharedFeature};
use tracing::info;

/// Host stand-in for headless runs: reports notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSync;

impl FeatureSyncPort for LogSync {
    fn on_selection_changed(&self, features: &[SharedFeature]) {
        let ids: Vec<&str> = features.iter().map(|f| f.id.as_str()).collect();
        info!(count = features.len(), "selection changed: {ids:?}");
    }

    fn on_features_discovered(&self, features: &[SharedFeature]) {
        info!(count = features.len(), "features discovered");
    }
}
