/// Deterministic naming of render sources and layers.
///
/// Category sources are named `category-<id>` so bindings can be rediscovered
/// from the render surface alone, without a side table.
pub const CATEGORY_SOURCE_PREFIX: &str = "category-";

/// One render layer per geometry family. Polygons get two (fill + stroke).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GeometryBucket {
    Point,
    Line,
    Fill,
    Stroke,
}

impl GeometryBucket {
    pub const ALL: [GeometryBucket; 4] = [
        GeometryBucket::Point,
        GeometryBucket::Line,
        GeometryBucket::Fill,
        GeometryBucket::Stroke,
    ];

    pub fn suffix(self) -> &'static str {
        match self {
            GeometryBucket::Point => "point",
            GeometryBucket::Line => "line",
            GeometryBucket::Fill => "fill",
            GeometryBucket::Stroke => "stroke",
        }
    }

    pub fn from_suffix(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.suffix() == s)
    }
}

pub fn category_source_id(category_id: &str) -> String {
    format!("{CATEGORY_SOURCE_PREFIX}{category_id}")
}

/// Inverse of [`category_source_id`]. Returns `None` for foreign sources.
pub fn category_from_source_id(source_id: &str) -> Option<&str> {
    source_id
        .strip_prefix(CATEGORY_SOURCE_PREFIX)
        .filter(|rest| !rest.is_empty())
}

pub fn category_layer_id(category_id: &str, bucket: GeometryBucket) -> String {
    format!("{CATEGORY_SOURCE_PREFIX}{category_id}-{}", bucket.suffix())
}

/// Composite ids of a legacy (non-category) layer: `<id>-point`, `<id>-line`, ...
pub fn legacy_layer_id(id: &str, bucket: GeometryBucket) -> String {
    format!("{id}-{}", bucket.suffix())
}

/// Splits a `<id>-<bucket>` layer id back into its parts.
pub fn split_layer_id(layer_id: &str) -> Option<(&str, GeometryBucket)> {
    let (base, suffix) = layer_id.rsplit_once('-')?;
    let bucket = GeometryBucket::from_suffix(suffix)?;
    if base.is_empty() {
        return None;
    }
    Some((base, bucket))
}
