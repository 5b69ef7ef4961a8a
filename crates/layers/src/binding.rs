use std::collections::BTreeMap;

use foundation::{GeometryBucket, category_from_source_id, category_layer_id, category_source_id};
use surface::{LayerSpec, RenderSurface, SurfaceError};
use tracing::{debug, warn};

use crate::category::Category;
use crate::filter::geometry_filter;
use crate::symbology::{family_of, layer_type_of};
use crate::visibility::VisibilityState;

/// Surface objects owned by one category.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerBinding {
    pub category_id: String,
    pub source_id: String,
    pub layer_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BindingError {
    Surface(SurfaceError),
    /// The category's geometry restriction left nothing to draw.
    NoLayers(String),
}

impl std::fmt::Display for BindingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BindingError::Surface(err) => write!(f, "{err}"),
            BindingError::NoLayers(id) => write!(f, "category {id} has no drawable geometry types"),
        }
    }
}

impl std::error::Error for BindingError {}

impl From<SurfaceError> for BindingError {
    fn from(err: SurfaceError) -> Self {
        BindingError::Surface(err)
    }
}

/// Category id -> binding. A binding exists only while its source does and
/// at least one of its layers was created.
#[derive(Debug, Default, Clone)]
pub struct BindingTable {
    bindings: BTreeMap<String, LayerBinding>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, category_id: &str) -> Option<&LayerBinding> {
        self.bindings.get(category_id)
    }

    pub fn contains(&self, category_id: &str) -> bool {
        self.bindings.contains_key(category_id)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LayerBinding> {
        self.bindings.values()
    }

    pub fn clear(&mut self) {
        self.bindings.clear();
    }

    /// Returns the binding for `category`, creating its source and layers if needed.
    ///
    /// Idempotent: layers that already exist on the surface are adopted, not
    /// re-added. New layers take their recorded visibility flag and zoom
    /// override from `state`; untoggled layers start visible only if the
    /// category is visible and not hidden.
    pub fn ensure<S: RenderSurface + ?Sized>(
        &mut self,
        surface: &mut S,
        category: &Category,
        state: &VisibilityState,
    ) -> Result<&LayerBinding, BindingError> {
        let id = category.id();
        let category_visible = category.def.is_visible() && !state.is_category_hidden(id);
        let live = self
            .bindings
            .get(id)
            .is_some_and(|b| surface.has_source(&b.source_id));
        if live {
            return Ok(&self.bindings[id]);
        }
        if self.bindings.remove(id).is_some() {
            debug!(category = %id, "dropping stale binding");
        }

        let source_id = category_source_id(id);
        if !surface.has_source(&source_id) {
            surface.add_source(&source_id, Vec::new())?;
        }

        let mut layer_ids = Vec::new();
        for bucket in category.buckets() {
            let layer_id = category_layer_id(id, bucket);
            if !surface.has_layer(&layer_id) {
                let Some(style) = category.style(bucket) else {
                    continue;
                };
                let mut spec = LayerSpec::new(&layer_id, layer_type_of(bucket), &source_id);
                spec.filter = Some(geometry_filter(family_of(bucket)));
                spec.paint = style.paint.clone();
                spec.layout = style.layout.clone();
                spec.zoom = state.zoom_override(&layer_id).unwrap_or(category.zoom);
                spec.set_visible(state.layer_flag(&layer_id).unwrap_or(category_visible));
                if let Err(err) = surface.add_layer(spec) {
                    warn!(layer = %layer_id, %err, "failed to add category layer");
                    continue;
                }
            }
            layer_ids.push(layer_id);
        }

        if layer_ids.is_empty() {
            if let Err(err) = surface.remove_source(&source_id) {
                debug!(source = %source_id, %err, "left empty category source in place");
            }
            return Err(BindingError::NoLayers(id.to_string()));
        }

        debug!(category = %id, layers = layer_ids.len(), "created binding");
        self.bindings.insert(
            id.to_string(),
            LayerBinding {
                category_id: id.to_string(),
                source_id,
                layer_ids,
            },
        );
        Ok(&self.bindings[id])
    }

    /// Removes every layer and the source of a category, then forgets it.
    pub fn remove<S: RenderSurface + ?Sized>(
        &mut self,
        surface: &mut S,
        category_id: &str,
    ) -> Result<Option<LayerBinding>, SurfaceError> {
        let binding = self.bindings.remove(category_id);
        let mut layer_ids: Vec<String> = GeometryBucket::ALL
            .into_iter()
            .map(|b| category_layer_id(category_id, b))
            .collect();
        if let Some(b) = &binding {
            for id in &b.layer_ids {
                if !layer_ids.contains(id) {
                    layer_ids.push(id.clone());
                }
            }
        }
        for layer_id in &layer_ids {
            match surface.remove_layer(layer_id) {
                Ok(()) | Err(SurfaceError::MissingLayer(_)) => {}
                Err(err) => return Err(err),
            }
        }
        match surface.remove_source(&category_source_id(category_id)) {
            Ok(()) | Err(SurfaceError::MissingSource(_)) => Ok(binding),
            Err(err) => Err(err),
        }
    }

    /// Rebuilds the table from what the surface actually holds.
    pub fn rehydrate<S: RenderSurface + ?Sized>(&mut self, surface: &S) -> usize {
        self.bindings.clear();
        let layers = surface.layers();
        for source_id in surface.source_ids() {
            let Some(category_id) = category_from_source_id(&source_id) else {
                continue;
            };
            let layer_ids: Vec<String> = layers
                .iter()
                .filter(|l| l.source == source_id)
                .map(|l| l.id.clone())
                .collect();
            if layer_ids.is_empty() {
                continue;
            }
            self.bindings.insert(
                category_id.to_string(),
                LayerBinding {
                    category_id: category_id.to_string(),
                    source_id: source_id.clone(),
                    layer_ids,
                },
            );
        }
        self.bindings.len()
    }
}
