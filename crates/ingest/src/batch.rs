use std::collections::BTreeMap;

use formats::Feature;

use crate::merge::FeatureSet;

/// Features staged per category, waiting for the next flush.
#[derive(Debug, Default, Clone)]
pub struct PendingBatch {
    categories: BTreeMap<String, FeatureSet>,
}

impl PendingBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages a feature; a later write with the same object id replaces it.
    pub fn stage(&mut self, category_id: &str, feature: Feature) {
        self.categories
            .entry(category_id.to_string())
            .or_default()
            .upsert(feature);
    }

    /// Total staged features across all categories.
    pub fn len(&self) -> usize {
        self.categories.values().map(FeatureSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.values().all(FeatureSet::is_empty)
    }

    pub fn category_ids(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }

    pub fn staged(&self, category_id: &str) -> Option<&FeatureSet> {
        self.categories.get(category_id)
    }

    /// Drops staged features with these object ids so an immediate write
    /// is not later overwritten by stale staged data.
    pub fn discard_keys<'a>(&mut self, category_id: &str, keys: impl IntoIterator<Item = &'a str>) -> usize {
        let Some(set) = self.categories.get_mut(category_id) else {
            return 0;
        };
        let removed = set.remove_keys(keys);
        if set.is_empty() {
            self.categories.remove(category_id);
        }
        removed
    }

    /// Drops `object_id` and its children from one category.
    pub fn remove_object(&mut self, category_id: &str, object_id: &str) -> usize {
        let Some(set) = self.categories.get_mut(category_id) else {
            return 0;
        };
        let removed = set.remove_object(object_id);
        if set.is_empty() {
            self.categories.remove(category_id);
        }
        removed
    }

    pub fn clear_category(&mut self, category_id: &str) -> usize {
        self.categories.remove(category_id).map_or(0, |set| set.len())
    }

    /// Takes everything staged, leaving the batch empty.
    pub fn take(&mut self) -> BTreeMap<String, FeatureSet> {
        std::mem::take(&mut self.categories)
    }

    pub fn clear(&mut self) {
        self.categories.clear();
    }
}
