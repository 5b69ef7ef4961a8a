use std::collections::{BTreeMap, BTreeSet};

use foundation::{GeometryBucket, category_layer_id, legacy_layer_id};
use surface::{RenderSurface, SurfaceError, ZoomRange};
use tracing::warn;

/// Visibility, selectability and zoom bookkeeping that outlives surface
/// rebuilds. Layers recreated after a rebuild read their state from here.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct VisibilityState {
    layer_visible: BTreeMap<String, bool>,
    hidden_categories: BTreeSet<String>,
    selectable: BTreeMap<String, bool>,
    zoom_overrides: BTreeMap<String, ZoomRange>,
}

impl VisibilityState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Layers never toggled count as visible.
    pub fn is_layer_visible(&self, layer_id: &str) -> bool {
        self.layer_visible.get(layer_id).copied().unwrap_or(true)
    }

    /// The recorded flag, if the layer was ever toggled.
    pub fn layer_flag(&self, layer_id: &str) -> Option<bool> {
        self.layer_visible.get(layer_id).copied()
    }

    pub fn is_category_hidden(&self, category_id: &str) -> bool {
        self.hidden_categories.contains(category_id)
    }

    pub fn hidden_categories(&self) -> impl Iterator<Item = &str> {
        self.hidden_categories.iter().map(String::as_str)
    }

    pub fn set_category_hidden(&mut self, category_id: &str, hidden: bool) {
        if hidden {
            self.hidden_categories.insert(category_id.to_string());
        } else {
            self.hidden_categories.remove(category_id);
        }
    }

    pub fn set_selectable(&mut self, id: &str, selectable: bool) {
        self.selectable.insert(id.to_string(), selectable);
    }

    pub fn selectable(&self, id: &str) -> Option<bool> {
        self.selectable.get(id).copied()
    }

    pub fn set_zoom_override(&mut self, layer_id: &str, zoom: ZoomRange) {
        self.zoom_overrides.insert(layer_id.to_string(), zoom);
    }

    pub fn zoom_override(&self, layer_id: &str) -> Option<ZoomRange> {
        self.zoom_overrides.get(layer_id).copied()
    }

    /// Drops everything recorded for `id` and for the category or legacy
    /// layers derived from it.
    pub fn forget(&mut self, id: &str) {
        self.hidden_categories.remove(id);
        self.selectable.remove(id);
        let derived = GeometryBucket::ALL
            .into_iter()
            .flat_map(|b| [category_layer_id(id, b), legacy_layer_id(id, b)]);
        for key in std::iter::once(id.to_string()).chain(derived) {
            self.layer_visible.remove(&key);
            self.zoom_overrides.remove(&key);
        }
    }

    pub fn clear(&mut self) {
        self.layer_visible.clear();
        self.hidden_categories.clear();
        self.selectable.clear();
        self.zoom_overrides.clear();
    }

    /// Sets visibility on each layer, recording the flag even when the
    /// surface call fails. Returns how many layers were updated.
    pub fn apply<S: RenderSurface + ?Sized>(
        &mut self,
        surface: &mut S,
        layer_ids: &[String],
        visible: bool,
    ) -> usize {
        let mut applied = 0;
        for layer_id in layer_ids {
            self.layer_visible.insert(layer_id.clone(), visible);
            match surface.set_layer_visibility(layer_id, visible) {
                Ok(()) => applied += 1,
                Err(SurfaceError::MissingLayer(_)) => {}
                Err(err) => warn!(layer = %layer_id, %err, "failed to set layer visibility"),
            }
        }
        applied
    }
}

/// Layers a non-category visibility toggle on `id` should touch: the layer
/// itself if it exists, otherwise whichever legacy composites exist.
pub fn toggle_targets<S: RenderSurface + ?Sized>(surface: &S, id: &str) -> Vec<String> {
    if surface.has_layer(id) {
        return vec![id.to_string()];
    }
    GeometryBucket::ALL
        .into_iter()
        .map(|b| legacy_layer_id(id, b))
        .filter(|l| surface.has_layer(l))
        .collect()
}
