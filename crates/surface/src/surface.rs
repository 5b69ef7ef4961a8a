use formats::Feature;
use serde_json::Value;

use crate::layer::{LayerSpec, ZoomRange};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    DuplicateSource(String),
    DuplicateLayer(String),
    MissingSource(String),
    MissingLayer(String),
    SourceInUse { source: String, layer: String },
}

impl std::fmt::Display for SurfaceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SurfaceError::DuplicateSource(id) => write!(f, "source already exists: {id}"),
            SurfaceError::DuplicateLayer(id) => write!(f, "layer already exists: {id}"),
            SurfaceError::MissingSource(id) => write!(f, "no such source: {id}"),
            SurfaceError::MissingLayer(id) => write!(f, "no such layer: {id}"),
            SurfaceError::SourceInUse { source, layer } => {
                write!(f, "source {source} is still used by layer {layer}")
            }
        }
    }
}

impl std::error::Error for SurfaceError {}

/// The render surface the layer manager drives.
///
/// Sources only support whole-data replacement (`set_source_data`); there is
/// no incremental patching. Everything created at runtime can disappear when
/// the surface is rebuilt, so callers must be able to rediscover state
/// through `source_ids` and `layers`.
pub trait RenderSurface {
    fn add_source(&mut self, id: &str, features: Vec<Feature>) -> Result<(), SurfaceError>;
    /// Fails while any layer still references the source.
    fn remove_source(&mut self, id: &str) -> Result<(), SurfaceError>;
    fn has_source(&self, id: &str) -> bool;
    fn source_ids(&self) -> Vec<String>;
    /// Current data of a source, `None` if the source does not exist.
    fn source_features(&self, id: &str) -> Option<Vec<Feature>>;
    fn set_source_data(&mut self, id: &str, features: Vec<Feature>) -> Result<(), SurfaceError>;

    fn add_layer(&mut self, layer: LayerSpec) -> Result<(), SurfaceError>;
    fn remove_layer(&mut self, id: &str) -> Result<(), SurfaceError>;
    fn has_layer(&self, id: &str) -> bool;
    fn layer(&self, id: &str) -> Option<LayerSpec>;
    /// All layers in draw order.
    fn layers(&self) -> Vec<LayerSpec>;
    fn set_layer_visibility(&mut self, id: &str, visible: bool) -> Result<(), SurfaceError>;
    fn set_layer_filter(&mut self, id: &str, filter: Option<Value>) -> Result<(), SurfaceError>;
    fn set_layer_zoom_range(&mut self, id: &str, zoom: ZoomRange) -> Result<(), SurfaceError>;
}
