use serde_json::{Map, Value};

/// Inclusive zoom interval a layer renders in.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ZoomRange {
    pub min: f64,
    pub max: f64,
}

impl ZoomRange {
    pub const FULL: ZoomRange = ZoomRange {
        min: 0.0,
        max: 24.0,
    };

    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, zoom: f64) -> bool {
        zoom >= self.min && zoom <= self.max
    }
}

impl Default for ZoomRange {
    fn default() -> Self {
        Self::FULL
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum LayerType {
    Circle,
    Line,
    Fill,
}

impl LayerType {
    pub fn as_str(self) -> &'static str {
        match self {
            LayerType::Circle => "circle",
            LayerType::Line => "line",
            LayerType::Fill => "fill",
        }
    }
}

/// A render layer bound to one source.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerSpec {
    pub id: String,
    pub layer_type: LayerType,
    pub source: String,
    pub filter: Option<Value>,
    pub paint: Map<String, Value>,
    pub layout: Map<String, Value>,
    pub zoom: ZoomRange,
}

impl LayerSpec {
    pub fn new(id: impl Into<String>, layer_type: LayerType, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            layer_type,
            source: source.into(),
            filter: None,
            paint: Map::new(),
            layout: Map::new(),
            zoom: ZoomRange::FULL,
        }
    }

    /// Layers are visible unless their layout says `"visibility": "none"`.
    pub fn is_visible(&self) -> bool {
        self.layout.get("visibility").and_then(|v| v.as_str()) != Some("none")
    }

    pub fn set_visible(&mut self, visible: bool) {
        let v = if visible { "visible" } else { "none" };
        self.layout
            .insert("visibility".to_string(), Value::String(v.to_string()));
    }

    /// Style-document form of the layer.
    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("id".to_string(), Value::String(self.id.clone()));
        obj.insert(
            "type".to_string(),
            Value::String(self.layer_type.as_str().to_string()),
        );
        obj.insert("source".to_string(), Value::String(self.source.clone()));
        if let Some(filter) = &self.filter {
            obj.insert("filter".to_string(), filter.clone());
        }
        obj.insert("minzoom".to_string(), Value::from(self.zoom.min));
        obj.insert("maxzoom".to_string(), Value::from(self.zoom.max));
        obj.insert("paint".to_string(), Value::Object(self.paint.clone()));
        obj.insert("layout".to_string(), Value::Object(self.layout.clone()));
        Value::Object(obj)
    }
}
