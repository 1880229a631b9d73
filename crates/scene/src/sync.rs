use parking_lot::Mutex;

use crate::feature::{FeatureId, SharedFeature};

/// One-way notifications from the core to whatever renders features.
///
/// Calls are fire-and-forget: implementations must not block for long and
/// the core ignores anything they do.
pub trait FeatureSyncPort: Send + Sync {
    /// The selection changed; `features` is the full new selection in order.
    fn on_selection_changed(&self, features: &[SharedFeature]);

    /// A query produced `features`.
    fn on_features_discovered(&self, features: &[SharedFeature]);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    SelectionChanged(Vec<FeatureId>),
    FeaturesDiscovered(Vec<FeatureId>),
}

/// Port that keeps every notification as a list of ids.
#[derive(Debug, Default)]
pub struct RecordingSync {
    events: Mutex<Vec<SyncEvent>>,
}

impl RecordingSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SyncEvent> {
        self.events.lock().clone()
    }

    pub fn drain(&self) -> Vec<SyncEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

fn ids_of(features: &[SharedFeature]) -> Vec<FeatureId> {
    features.iter().map(|f| f.id.clone()).collect()
}

impl FeatureSyncPort for RecordingSync {
    fn on_selection_changed(&self, features: &[SharedFeature]) {
        self.events
            .lock()
            .push(SyncEvent::SelectionChanged(ids_of(features)));
    }

    fn on_features_discovered(&self, features: &[SharedFeature]) {
        self.events
            .lock()
            .push(SyncEvent::FeaturesDiscovered(ids_of(features)));
    }
}

#[cfg(test)]
mod tests {
    use super::{FeatureSyncPort, RecordingSync, SyncEvent};
    use crate::feature::{Attributes, Feature, FeatureId, Geometry};

    #[test]
    fn records_events_in_call_order() {
        let port = RecordingSync::new();
        let a = Feature::new(FeatureId::new("a"), Geometry::new(1.0, 2.0), Attributes::new())
            .shared();

        port.on_features_discovered(&[a.clone()]);
        port.on_selection_changed(&[]);

        assert_eq!(
            port.events(),
            vec![
                SyncEvent::FeaturesDiscovered(vec![FeatureId::new("a")]),
                SyncEvent::SelectionChanged(vec![]),
            ]
        );
    }

    #[test]
    fn drain_clears_events() {
        let port = RecordingSync::new();
        port.on_selection_changed(&[]);
        assert_eq!(port.drain().len(), 1);
        assert!(port.events().is_empty());
    }
}
