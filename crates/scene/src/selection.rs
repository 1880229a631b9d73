use chrono::{DateTime, Utc};

use crate::feature::{FeatureId, SharedFeature};

/// Ordered selection of features with a circular "current" cursor.
///
/// Invariants, holding after every public method returns:
/// - `items` contains no two features with the same id.
/// - When `items` is non-empty, `current < items.len()`.
/// - Exactly the features in `items` report `is_selected() == true`; any
///   feature this selection has released reports `false`.
///
/// In single-select mode, `add` clears the selection first, so the same
/// structure and navigation logic serve both modes.
///
/// Navigation is O(1) and performs no I/O. Imagery for the new current
/// feature is fetched by the caller afterwards.
#[derive(Debug)]
pub struct SelectionState {
    items: Vec<SharedFeature>,
    current: usize,
    multi_select: bool,
}

impl Default for SelectionState {
    fn default() -> Self {
        Self::new(true)
    }
}

impl SelectionState {
    pub fn new(multi_select: bool) -> Self {
        Self {
            items: Vec::new(),
            current: 0,
            multi_select,
        }
    }

    pub fn multi_select(&self) -> bool {
        self.multi_select
    }

    /// Switching modes leaves the current items alone; single-select takes
    /// effect on the next `add`.
    pub fn set_multi_select(&mut self, multi_select: bool) {
        self.multi_select = multi_select;
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[SharedFeature] {
        &self.items
    }

    pub fn contains(&self, id: &FeatureId) -> bool {
        self.position(id).is_some()
    }

    pub fn current(&self) -> Option<&SharedFeature> {
        self.items.get(self.current)
    }

    pub fn current_index(&self) -> Option<usize> {
        if self.items.is_empty() {
            None
        } else {
            Some(self.current)
        }
    }

    /// Adds `feature` and makes it current.
    ///
    /// Returns `true` if the selection changed.
    pub fn add(&mut self, feature: &SharedFeature) -> bool {
        let mut changed = false;
        if !self.multi_select && !self.items.is_empty() {
            let only_self = self.items.len() == 1 && self.items[0].id == feature.id;
            if only_self {
                return false;
            }
            self.clear();
            changed = true;
        }

        if self.contains(&feature.id) {
            return changed;
        }

        feature.set_selected(true);
        self.items.push(feature.clone());
        self.current = self.items.len() - 1;
        true
    }

    /// Adds every feature in order. The last newly added one becomes current.
    pub fn add_all<'a>(&mut self, features: impl IntoIterator<Item = &'a SharedFeature>) -> bool {
        let mut changed = false;
        for f in features {
            changed |= self.add(f);
        }
        changed
    }

    /// Removes the feature with `id`.
    ///
    /// The cursor keeps pointing at the same feature when an earlier item is
    /// removed. Removing the current item moves the cursor to the item that
    /// followed it, or to the new last item.
    pub fn remove(&mut self, id: &FeatureId) -> bool {
        let Some(pos) = self.position(id) else {
            return false;
        };

        let removed = self.items.remove(pos);
        removed.set_selected(false);

        if self.items.is_empty() {
            self.current = 0;
        } else if pos < self.current {
            self.current -= 1;
        } else {
            self.current = self.current.min(self.items.len() - 1);
        }
        true
    }

    pub fn clear(&mut self) {
        for f in self.items.drain(..) {
            f.set_selected(false);
        }
        self.current = 0;
    }

    /// Makes the already-selected feature `id` current.
    pub fn set_current(&mut self, id: &FeatureId) -> Option<&SharedFeature> {
        let pos = self.position(id)?;
        self.current = pos;
        self.current()
    }

    /// Advances the cursor, wrapping from last to first.
    pub fn next(&mut self) -> Option<&SharedFeature> {
        if self.items.is_empty() {
            return None;
        }
        self.current = (self.current + 1) % self.items.len();
        self.current()
    }

    /// Moves the cursor back, wrapping from first to last.
    pub fn previous(&mut self) -> Option<&SharedFeature> {
        if self.items.is_empty() {
            return None;
        }
        self.current = if self.current == 0 {
            self.items.len() - 1
        } else {
            self.current - 1
        };
        self.current()
    }

    pub fn first(&mut self) -> Option<&SharedFeature> {
        if self.items.is_empty() {
            return None;
        }
        self.current = 0;
        self.current()
    }

    pub fn last(&mut self) -> Option<&SharedFeature> {
        if self.items.is_empty() {
            return None;
        }
        self.current = self.items.len() - 1;
        self.current()
    }

    /// Moves the cursor to the selected feature whose timestamp is closest
    /// to `target`. Features without a readable timestamp are skipped; ties
    /// go to the earlier item.
    pub fn seek_nearest(&mut self, target: DateTime<Utc>) -> Option<&SharedFeature> {
        let best = self
            .items
            .iter()
            .enumerate()
            .filter_map(|(i, f)| {
                let ts = f.timestamp()?;
                Some((i, (ts - target).num_milliseconds().unsigned_abs()))
            })
            .min_by(|(ia, da), (ib, db)| da.cmp(db).then_with(|| ia.cmp(ib)))
            .map(|(i, _)| i)?;
        self.current = best;
        self.current()
    }

    fn position(&self, id: &FeatureId) -> Option<usize> {
        self.items.iter().position(|f| &f.id == id)
    }
}
