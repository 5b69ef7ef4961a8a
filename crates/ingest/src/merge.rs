use std::collections::HashMap;

use formats::Feature;

/// Features keyed by `objectid`, in first-insertion order.
///
/// Inserting a feature whose key is already present replaces it in place.
/// Features without a key are always appended.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FeatureSet {
    features: Vec<Feature>,
    index: HashMap<String, usize>,
}

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from existing source data. Duplicate keys collapse onto
    /// the first position with the last value.
    pub fn from_features(features: Vec<Feature>) -> Self {
        let mut set = Self::new();
        set.extend(features);
        set
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn contains_key(&self, object_id: &str) -> bool {
        self.index.contains_key(object_id)
    }

    pub fn get(&self, object_id: &str) -> Option<&Feature> {
        self.index.get(object_id).map(|i| &self.features[*i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }

    /// Returns `true` when an existing feature was replaced.
    pub fn upsert(&mut self, feature: Feature) -> bool {
        let Some(key) = feature.object_id() else {
            self.features.push(feature);
            return false;
        };
        match self.index.get(&key) {
            Some(&i) => {
                self.features[i] = feature;
                true
            }
            None => {
                self.index.insert(key, self.features.len());
                self.features.push(feature);
                false
            }
        }
    }

    /// Upserts every feature; returns how many replaced existing ones.
    pub fn extend(&mut self, features: impl IntoIterator<Item = Feature>) -> usize {
        let mut replaced = 0;
        for feature in features {
            if self.upsert(feature) {
                replaced += 1;
            }
        }
        replaced
    }

    /// Drops `object_id` and any `<object_id>_<n>` children.
    pub fn remove_object(&mut self, object_id: &str) -> usize {
        self.retain(|key| key.is_none_or(|k| !is_same_object(k, object_id)))
    }

    pub fn remove_keys<'a>(&mut self, keys: impl IntoIterator<Item = &'a str>) -> usize {
        let keys: Vec<&str> = keys.into_iter().collect();
        if keys.is_empty() {
            return 0;
        }
        self.retain(|key| key.is_none_or(|k| !keys.contains(&k)))
    }

    pub fn into_features(self) -> Vec<Feature> {
        self.features
    }

    fn retain(&mut self, mut keep: impl FnMut(Option<&str>) -> bool) -> usize {
        let before = self.features.len();
        self.features.retain(|f| keep(f.object_id().as_deref()));
        let removed = before - self.features.len();
        if removed > 0 {
            self.reindex();
        }
        removed
    }

    fn reindex(&mut self) {
        self.index.clear();
        for (i, f) in self.features.iter().enumerate() {
            if let Some(key) = f.object_id() {
                self.index.insert(key, i);
            }
        }
    }
}

/// `key` is `object_id` itself or a generated child such as `obj_0` or `obj_2_1`.
pub fn is_same_object(key: &str, object_id: &str) -> bool {
    if key == object_id {
        return true;
    }
    key.strip_prefix(object_id)
        .and_then(|rest| rest.strip_prefix('_'))
        .is_some_and(|rest| rest.split('_').all(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit())))
}

/// Merges `incoming` into `existing` by object id and returns the new data.
pub fn upsert_features(existing: Vec<Feature>, incoming: Vec<Feature>) -> Vec<Feature> {
    let mut set = FeatureSet::from_features(existing);
    set.extend(incoming);
    set.into_features()
}
