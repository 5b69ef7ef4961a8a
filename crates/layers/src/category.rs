use std::collections::BTreeMap;

use foundation::GeometryBucket;
use formats::{CategoryDef, CategoryManifest, StyleFragment};
use tracing::{debug, warn};

use crate::symbology::{BucketStyle, ZoomPolicy, family_of, resolve_zoom_range};
use surface::ZoomRange;

/// A loaded category with its per-bucket styles already composed.
#[derive(Debug, Clone, PartialEq)]
pub struct Category {
    pub def: CategoryDef,
    pub zoom: ZoomRange,
    styles: BTreeMap<GeometryBucket, BucketStyle>,
}

impl Category {
    pub fn new(def: CategoryDef, policy: &ZoomPolicy) -> Self {
        let styles = GeometryBucket::ALL
            .into_iter()
            .filter(|b| def.includes_family(family_of(*b)))
            .map(|b| (b, BucketStyle::for_category(&def, b)))
            .collect();
        let zoom = resolve_zoom_range(&def, policy);
        Self { def, zoom, styles }
    }

    pub fn id(&self) -> &str {
        &self.def.id
    }

    pub fn fragment(&self) -> Option<&StyleFragment> {
        self.def.style.as_ref()
    }

    /// `None` when the category excludes this bucket's geometry family.
    pub fn style(&self, bucket: GeometryBucket) -> Option<&BucketStyle> {
        self.styles.get(&bucket)
    }

    pub fn buckets(&self) -> impl Iterator<Item = GeometryBucket> + '_ {
        self.styles.keys().copied()
    }
}

/// Category lookup table. Reloading replaces it wholesale.
#[derive(Debug, Default, Clone)]
pub struct CategoryRegistry {
    version: Option<String>,
    categories: BTreeMap<String, Category>,
    order: Vec<String>,
}

impl CategoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the table with `manifest`. Later duplicates win.
    pub fn load(&mut self, manifest: CategoryManifest, policy: &ZoomPolicy) -> usize {
        for rejected in &manifest.rejected {
            warn!(index = rejected.index, reason = %rejected.reason, "skipping category entry");
        }

        let mut categories = BTreeMap::new();
        let mut order = Vec::with_capacity(manifest.categories.len());
        for def in manifest.categories {
            let id = def.id.clone();
            let category = Category::new(def, policy);
            if categories.insert(id.clone(), category).is_some() {
                warn!(category = %id, "duplicate category id; later entry wins");
            } else {
                order.push(id);
            }
        }

        debug!(count = order.len(), version = ?manifest.version, "loaded categories");
        self.version = manifest.version;
        self.categories = categories;
        self.order = order;
        self.order.len()
    }

    pub fn get(&self, id: &str) -> Option<&Category> {
        self.categories.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.categories.contains_key(id)
    }

    pub fn style(&self, id: &str) -> Option<&StyleFragment> {
        self.get(id).and_then(Category::fragment)
    }

    /// Ids in manifest order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Category> {
        self.order.iter().filter_map(|id| self.categories.get(id))
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
