use std::collections::BTreeMap;

use formats::{Feature, feature_collection_value};
use serde_json::{Map, Value};

use crate::expr;
use crate::layer::{LayerSpec, ZoomRange};
use crate::surface::{RenderSurface, SurfaceError};

/// In-memory render surface.
///
/// Keeps sources in a `BTreeMap` and layers in draw order so snapshots are
/// stable. Counts `set_source_data` calls per source, which makes batching
/// observable in tests.
#[derive(Debug, Default, Clone)]
pub struct MemorySurface {
    sources: BTreeMap<String, Vec<Feature>>,
    layers: Vec<LayerSpec>,
    set_data_calls: BTreeMap<String, u64>,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every runtime source and layer, like a full style swap.
    pub fn rebuild(&mut self) {
        self.sources.clear();
        self.layers.clear();
    }

    pub fn set_data_calls(&self, source_id: &str) -> u64 {
        self.set_data_calls.get(source_id).copied().unwrap_or(0)
    }

    pub fn total_set_data_calls(&self) -> u64 {
        self.set_data_calls.values().sum()
    }

    pub fn feature_count(&self, source_id: &str) -> usize {
        self.sources.get(source_id).map_or(0, Vec::len)
    }

    /// Features a layer would draw at `zoom`: visibility, zoom range and
    /// filter all apply.
    pub fn rendered_features(&self, layer_id: &str, zoom: f64) -> Vec<Feature> {
        let Some(layer) = self.layers.iter().find(|l| l.id == layer_id) else {
            return Vec::new();
        };
        if !layer.is_visible() || !layer.zoom.contains(zoom) {
            return Vec::new();
        }
        let Some(features) = self.sources.get(&layer.source) else {
            return Vec::new();
        };
        features
            .iter()
            .filter(|f| layer.filter.as_ref().is_none_or(|flt| expr::matches(flt, f)))
            .cloned()
            .collect()
    }

    /// Style-document-like snapshot of everything on the surface.
    pub fn to_value(&self) -> Value {
        let mut sources = Map::new();
        for (id, features) in &self.sources {
            sources.insert(id.clone(), feature_collection_value(features));
        }
        let mut root = Map::new();
        root.insert("sources".to_string(), Value::Object(sources));
        root.insert(
            "layers".to_string(),
            Value::Array(self.layers.iter().map(LayerSpec::to_value).collect()),
        );
        Value::Object(root)
    }

    fn layer_mut(&mut self, id: &str) -> Result<&mut LayerSpec, SurfaceError> {
        self.layers
            .iter_mut()
            .find(|l| l.id == id)
            .ok_or_else(|| SurfaceError::MissingLayer(id.to_string()))
    }
}

impl RenderSurface for MemorySurface {
    fn add_source(&mut self, id: &str, features: Vec<Feature>) -> Result<(), SurfaceError> {
        if self.sources.contains_key(id) {
            return Err(SurfaceError::DuplicateSource(id.to_string()));
        }
        self.sources.insert(id.to_string(), features);
        Ok(())
    }

    fn remove_source(&mut self, id: &str) -> Result<(), SurfaceError> {
        if let Some(layer) = self.layers.iter().find(|l| l.source == id) {
            return Err(SurfaceError::SourceInUse {
                source: id.to_string(),
                layer: layer.id.clone(),
            });
        }
        self.sources
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| SurfaceError::MissingSource(id.to_string()))
    }

    fn has_source(&self, id: &str) -> bool {
        self.sources.contains_key(id)
    }

    fn source_ids(&self) -> Vec<String> {
        self.sources.keys().cloned().collect()
    }

    fn source_features(&self, id: &str) -> Option<Vec<Feature>> {
        self.sources.get(id).cloned()
    }

    fn set_source_data(&mut self, id: &str, features: Vec<Feature>) -> Result<(), SurfaceError> {
        let slot = self
            .sources
            .get_mut(id)
            .ok_or_else(|| SurfaceError::MissingSource(id.to_string()))?;
        *slot = features;
        *self.set_data_calls.entry(id.to_string()).or_insert(0) += 1;
        Ok(())
    }

    fn add_layer(&mut self, layer: LayerSpec) -> Result<(), SurfaceError> {
        if self.has_layer(&layer.id) {
            return Err(SurfaceError::DuplicateLayer(layer.id));
        }
        if !self.sources.contains_key(&layer.source) {
            return Err(SurfaceError::MissingSource(layer.source));
        }
        self.layers.push(layer);
        Ok(())
    }

    fn remove_layer(&mut self, id: &str) -> Result<(), SurfaceError> {
        let before = self.layers.len();
        self.layers.retain(|l| l.id != id);
        if self.layers.len() == before {
            return Err(SurfaceError::MissingLayer(id.to_string()));
        }
        Ok(())
    }

    fn has_layer(&self, id: &str) -> bool {
        self.layers.iter().any(|l| l.id == id)
    }

    fn layer(&self, id: &str) -> Option<LayerSpec> {
        self.layers.iter().find(|l| l.id == id).cloned()
    }

    fn layers(&self) -> Vec<LayerSpec> {
        self.layers.clone()
    }

    fn set_layer_visibility(&mut self, id: &str, visible: bool) -> Result<(), SurfaceError> {
        self.layer_mut(id)?.set_visible(visible);
        Ok(())
    }

    fn set_layer_filter(&mut self, id: &str, filter: Option<Value>) -> Result<(), SurfaceError> {
        self.layer_mut(id)?.filter = filter;
        Ok(())
    }

    fn set_layer_zoom_range(&mut self, id: &str, zoom: ZoomRange) -> Result<(), SurfaceError> {
        self.layer_mut(id)?.zoom = zoom;
        Ok(())
    }
}
