use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::geojson::GeometryFamily;

pub const DEFAULT_CATEGORY_COLOR: &str = "#3388ff";

/// Paint/layout overrides for one render layer, in render-surface property names.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerStyleDef {
    #[serde(default)]
    pub paint: Map<String, Value>,
    #[serde(default)]
    pub layout: Map<String, Value>,
}

/// Optional per-category style, one entry per geometry bucket.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleFragment {
    #[serde(default, alias = "circle", skip_serializing_if = "Option::is_none")]
    pub point: Option<LayerStyleDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<LayerStyleDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<LayerStyleDef>,
    #[serde(default, alias = "outline", skip_serializing_if = "Option::is_none")]
    pub stroke: Option<LayerStyleDef>,
    #[serde(default, alias = "minzoom", skip_serializing_if = "Option::is_none")]
    pub min_zoom: Option<f64>,
    #[serde(default, alias = "maxzoom", skip_serializing_if = "Option::is_none")]
    pub max_zoom: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selectable: Option<bool>,
}

/// One category as pushed by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryDef {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// 0..=255; out-of-range values are clamped on use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alpha: Option<f64>,
    #[serde(default, alias = "minzoom", skip_serializing_if = "Option::is_none")]
    pub min_zoom: Option<f64>,
    #[serde(default, alias = "maxzoom", skip_serializing_if = "Option::is_none")]
    pub max_zoom: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selectable: Option<bool>,
    /// Restricts which geometry families get a layer. `None` means all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry_types: Option<Vec<GeometryFamily>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<StyleFragment>,
}

impl CategoryDef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            color: None,
            alpha: None,
            min_zoom: None,
            max_zoom: None,
            visible: None,
            selectable: None,
            geometry_types: None,
            style: None,
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn color(&self) -> &str {
        self.color.as_deref().unwrap_or(DEFAULT_CATEGORY_COLOR)
    }

    pub fn alpha(&self) -> u8 {
        match self.alpha {
            Some(a) if a.is_finite() => a.round().clamp(0.0, 255.0) as u8,
            _ => 255,
        }
    }

    /// Only an explicit `false` hides a category.
    pub fn is_visible(&self) -> bool {
        self.visible != Some(false)
    }

    pub fn is_selectable(&self) -> bool {
        self.selectable != Some(false)
    }

    pub fn includes_family(&self, family: GeometryFamily) -> bool {
        match &self.geometry_types {
            Some(types) => types.contains(&family),
            None => true,
        }
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "id must be a string or number, got {other}"
        ))),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedEntry {
    pub index: usize,
    pub reason: String,
}

/// Normalized category manifest.
///
/// Hosts send either a bare array of categories or
/// `{"version": ..., "categories": [...]}`; both land here.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CategoryManifest {
    pub version: Option<String>,
    pub categories: Vec<CategoryDef>,
    /// Entries dropped during parsing; the rest of the manifest still loads.
    pub rejected: Vec<RejectedEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestError {
    Json(String),
    UnexpectedShape,
}

impl std::fmt::Display for ManifestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManifestError::Json(msg) => write!(f, "category manifest is not valid JSON: {msg}"),
            ManifestError::UnexpectedShape => write!(
                f,
                "category manifest must be an array or an object with a categories array"
            ),
        }
    }
}

impl std::error::Error for ManifestError {}

impl CategoryManifest {
    pub fn from_json_str(text: &str) -> Result<Self, ManifestError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ManifestError::Json(e.to_string()))?;
        Self::from_json_value(&value)
    }

    pub fn from_json_value(value: &Value) -> Result<Self, ManifestError> {
        let (version, entries) = match value {
            Value::Array(entries) => (None, entries),
            Value::Object(obj) => {
                let entries = obj
                    .get("categories")
                    .and_then(|v| v.as_array())
                    .ok_or(ManifestError::UnexpectedShape)?;
                let version = match obj.get("version") {
                    Some(Value::String(s)) => Some(s.clone()),
                    Some(Value::Number(n)) => Some(n.to_string()),
                    _ => None,
                };
                (version, entries)
            }
            _ => return Err(ManifestError::UnexpectedShape),
        };

        let mut manifest = CategoryManifest {
            version,
            ..Default::default()
        };
        for (index, entry) in entries.iter().enumerate() {
            let has_id = entry
                .get("id")
                .is_some_and(|id| matches!(id, Value::String(s) if !s.is_empty()) || id.is_number());
            if !has_id {
                manifest.rejected.push(RejectedEntry {
                    index,
                    reason: "missing id".to_string(),
                });
                continue;
            }
            match CategoryDef::deserialize(entry) {
                Ok(def) => manifest.categories.push(def),
                Err(e) => manifest.rejected.push(RejectedEntry {
                    index,
                    reason: e.to_string(),
                }),
            }
        }
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn bare_and_wrapped_shapes_normalize_alike() {
        let bare = CategoryManifest::from_json_str(r##"[{"id":"c1","color":"#ff0000"}]"##)
            .expect("bare manifest");
        let wrapped = CategoryManifest::from_json_str(
            r##"{"version":2,"categories":[{"id":"c1","color":"#ff0000"}]}"##,
        )
        .expect("wrapped manifest");
        assert_eq!(bare.categories, wrapped.categories);
        assert_eq!(bare.version, None);
        assert_eq!(wrapped.version.as_deref(), Some("2"));
    }

    #[test]
    fn entries_without_id_are_rejected_not_fatal() {
        let manifest = CategoryManifest::from_json_str(
            r#"[{"name":"nameless"},{"id":""},{"id":12,"alpha":300},{"id":"x","visible":"nope"}]"#,
        )
        .expect("manifest");
        assert_eq!(manifest.categories.len(), 1);
        assert_eq!(manifest.categories[0].id, "12");
        assert_eq!(manifest.categories[0].alpha(), 255);
        let rejected: Vec<usize> = manifest.rejected.iter().map(|r| r.index).collect();
        assert_eq!(rejected, vec![0, 1, 3]);
    }

    #[test]
    fn parses_style_fragment_and_geometry_types() {
        let manifest = CategoryManifest::from_json_str(
            r##"[{"id":"roads","minzoom":5,"geometryTypes":["LineString"],
                 "style":{"line":{"paint":{"line-width":4}},"minZoom":3,"selectable":false}}]"##,
        )
        .expect("manifest");
        let def = &manifest.categories[0];
        assert_eq!(def.min_zoom, Some(5.0));
        assert!(def.includes_family(GeometryFamily::Line));
        assert!(!def.includes_family(GeometryFamily::Point));
        let style = def.style.as_ref().expect("style");
        assert_eq!(style.min_zoom, Some(3.0));
        assert_eq!(style.selectable, Some(false));
        assert_eq!(
            style.line.as_ref().and_then(|l| l.paint.get("line-width")),
            Some(&Value::from(4))
        );
    }

    #[test]
    fn rejects_wrong_top_level_shape() {
        assert_eq!(
            CategoryManifest::from_json_str(r#"{"cats":[]}"#),
            Err(ManifestError::UnexpectedShape)
        );
        assert!(matches!(
            CategoryManifest::from_json_str("nope"),
            Err(ManifestError::Json(_))
        ));
    }

    #[test]
    fn visibility_defaults_to_true() {
        let mut def = CategoryDef::new("c");
        assert!(def.is_visible());
        def.visible = Some(false);
        assert!(!def.is_visible());
        assert_eq!(def.display_name(), "c");
        assert_eq!(def.color(), DEFAULT_CATEGORY_COLOR);
    }
}
