use formats::StyleFragment;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One inbound host operation.
///
/// Operations issued before a surface is attached are stored in this form
/// and replayed in order once it is. Payloads stay as JSON (or JSON text)
/// until the operation actually runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Command {
    LoadCategories {
        manifest: Value,
    },
    AddFeature {
        id: String,
        #[serde(default)]
        object_id: String,
        /// GeoJSON object, or GeoJSON text still to be parsed.
        payload: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        style: Option<StyleFragment>,
    },
    LoadFeatureCollection {
        id: String,
        collection: Value,
    },
    /// Layer id -> feature collection.
    BatchUpdateLayers {
        layers: Map<String, Value>,
    },
    RemoveObject {
        id: String,
        object_id: String,
    },
    ShowLayer {
        id: String,
    },
    HideLayer {
        id: String,
    },
    SetLayerVisibility {
        id: String,
        visible: bool,
    },
    SetLayerSelectable {
        id: String,
        selectable: bool,
    },
    /// Settings blob, as JSON or JSON text.
    UpdateLayerSettings {
        settings: Value,
    },
    CreateLayer {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        style: Option<StyleFragment>,
    },
    RemoveLayer {
        id: String,
    },
    ClearCategory {
        id: String,
    },
    SetCategoryFilter {
        layer_id: String,
        category_id: String,
        visible: bool,
    },
    ForceFlush,
    RestoreBindings,
}

impl Command {
    /// Operation name as it appears in the `op` tag.
    pub fn name(&self) -> &'static str {
        match self {
            Command::LoadCategories { .. } => "loadCategories",
            Command::AddFeature { .. } => "addFeature",
            Command::LoadFeatureCollection { .. } => "loadFeatureCollection",
            Command::BatchUpdateLayers { .. } => "batchUpdateLayers",
            Command::RemoveObject { .. } => "removeObject",
            Command::ShowLayer { .. } => "showLayer",
            Command::HideLayer { .. } => "hideLayer",
            Command::SetLayerVisibility { .. } => "setLayerVisibility",
            Command::SetLayerSelectable { .. } => "setLayerSelectable",
            Command::UpdateLayerSettings { .. } => "updateLayerSettings",
            Command::CreateLayer { .. } => "createLayer",
            Command::RemoveLayer { .. } => "removeLayer",
            Command::ClearCategory { .. } => "clearCategory",
            Command::SetCategoryFilter { .. } => "setCategoryFilter",
            Command::ForceFlush => "forceFlush",
            Command::RestoreBindings => "restoreBindings",
        }
    }
}
