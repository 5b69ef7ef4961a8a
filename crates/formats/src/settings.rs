use serde::Deserialize;
use serde_json::Value;

/// Per-layer (or per-category) overrides pushed by the host UI.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerSetting {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub visible: Option<bool>,
    #[serde(default)]
    pub selectable: Option<bool>,
    #[serde(default, alias = "minzoom")]
    pub min_zoom: Option<f64>,
    #[serde(default, alias = "maxzoom")]
    pub max_zoom: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    Json(String),
    UnexpectedShape,
    InvalidEntry { id: String, reason: String },
}

impl std::fmt::Display for SettingsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsError::Json(msg) => write!(f, "layer settings are not valid JSON: {msg}"),
            SettingsError::UnexpectedShape => write!(
                f,
                "layer settings must be an array, a {{\"layers\": [...]}} object, or an id map"
            ),
            SettingsError::InvalidEntry { id, reason } => {
                write!(f, "invalid layer setting {id:?}: {reason}")
            }
        }
    }
}

impl std::error::Error for SettingsError {}

/// Parses a settings blob. Accepted shapes:
///
/// - `[{"id": "a", "visible": false}, ...]`
/// - `{"layers": [{"id": "a", ...}, ...]}`
/// - `{"a": {"visible": false}, "b": {...}}`
///
/// Any bad entry fails the whole blob so nothing is applied partially.
pub fn parse_layer_settings(text: &str) -> Result<Vec<LayerSetting>, SettingsError> {
    let value: Value = serde_json::from_str(text).map_err(|e| SettingsError::Json(e.to_string()))?;

    let mut out = Vec::new();
    match &value {
        Value::Array(entries) => {
            for entry in entries {
                out.push(parse_entry(None, entry)?);
            }
        }
        Value::Object(obj) => {
            if let Some(layers) = obj.get("layers") {
                let entries = layers.as_array().ok_or(SettingsError::UnexpectedShape)?;
                for entry in entries {
                    out.push(parse_entry(None, entry)?);
                }
            } else {
                for (id, entry) in obj {
                    out.push(parse_entry(Some(id), entry)?);
                }
            }
        }
        _ => return Err(SettingsError::UnexpectedShape),
    }
    Ok(out)
}

fn parse_entry(key: Option<&str>, entry: &Value) -> Result<LayerSetting, SettingsError> {
    let label = key
        .map(str::to_string)
        .or_else(|| entry.get("id").map(|v| v.to_string()))
        .unwrap_or_default();
    let mut setting =
        LayerSetting::deserialize(entry).map_err(|e| SettingsError::InvalidEntry {
            id: label.clone(),
            reason: e.to_string(),
        })?;
    if let Some(key) = key {
        setting.id = key.to_string();
    }
    if setting.id.is_empty() {
        return Err(SettingsError::InvalidEntry {
            id: label,
            reason: "missing id".to_string(),
        });
    }
    Ok(setting)
}
