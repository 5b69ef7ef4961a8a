use foundation::GeometryBucket;
use formats::{CategoryDef, DEFAULT_CATEGORY_COLOR, GeometryFamily, LayerStyleDef, StyleFragment};
use serde::Deserialize;
use serde_json::{Map, Value};
use surface::{LayerType, ZoomRange};

/// Defensive bounds applied to configured zoom levels.
///
/// A `minZoom` above `max_sane_min_zoom` or a `maxZoom` below
/// `min_sane_max_zoom` would hide a category at ordinary zoom levels; such
/// values are ignored rather than rejected.
#[derive(Debug, Copy, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ZoomPolicy {
    pub max_sane_min_zoom: f64,
    pub min_sane_max_zoom: f64,
    pub default_min_zoom: f64,
    pub default_max_zoom: f64,
}

impl Default for ZoomPolicy {
    fn default() -> Self {
        Self {
            max_sane_min_zoom: 20.0,
            min_sane_max_zoom: 10.0,
            default_min_zoom: ZoomRange::FULL.min,
            default_max_zoom: ZoomRange::FULL.max,
        }
    }
}

impl ZoomPolicy {
    pub fn default_range(&self) -> ZoomRange {
        ZoomRange::new(self.default_min_zoom, self.default_max_zoom)
    }

    fn sane_min(&self, z: f64) -> bool {
        z.is_finite() && z >= self.default_min_zoom && z <= self.max_sane_min_zoom
    }

    fn sane_max(&self, z: f64) -> bool {
        z.is_finite() && z >= self.min_sane_max_zoom && z <= self.default_max_zoom
    }

    /// Picks each end independently from the first sane candidate, in order.
    pub fn resolve(&self, min_candidates: &[Option<f64>], max_candidates: &[Option<f64>]) -> ZoomRange {
        let min = min_candidates
            .iter()
            .flatten()
            .copied()
            .find(|z| self.sane_min(*z))
            .unwrap_or(self.default_min_zoom);
        let max = max_candidates
            .iter()
            .flatten()
            .copied()
            .find(|z| self.sane_max(*z))
            .unwrap_or(self.default_max_zoom);
        if min > max {
            return self.default_range();
        }
        ZoomRange::new(min, max)
    }
}

/// Zoom range for a category: style fragment first, then the category itself,
/// then the full default range.
pub fn resolve_zoom_range(def: &CategoryDef, policy: &ZoomPolicy) -> ZoomRange {
    let style = def.style.as_ref();
    policy.resolve(
        &[style.and_then(|s| s.min_zoom), def.min_zoom],
        &[style.and_then(|s| s.max_zoom), def.max_zoom],
    )
}

pub fn family_of(bucket: GeometryBucket) -> GeometryFamily {
    match bucket {
        GeometryBucket::Point => GeometryFamily::Point,
        GeometryBucket::Line => GeometryFamily::Line,
        GeometryBucket::Fill | GeometryBucket::Stroke => GeometryFamily::Polygon,
    }
}

pub fn layer_type_of(bucket: GeometryBucket) -> LayerType {
    match bucket {
        GeometryBucket::Point => LayerType::Circle,
        GeometryBucket::Line | GeometryBucket::Stroke => LayerType::Line,
        GeometryBucket::Fill => LayerType::Fill,
    }
}

/// Final paint/layout for one bucket of one category.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BucketStyle {
    pub paint: Map<String, Value>,
    pub layout: Map<String, Value>,
}

impl BucketStyle {
    /// Defaults for `bucket`, with `overrides` merged on top key by key.
    pub fn compose(
        bucket: GeometryBucket,
        color: &str,
        alpha: u8,
        overrides: Option<&LayerStyleDef>,
    ) -> Self {
        let mut style = default_style(bucket, color, alpha);
        if let Some(o) = overrides {
            for (k, v) in &o.paint {
                style.paint.insert(k.clone(), v.clone());
            }
            for (k, v) in &o.layout {
                style.layout.insert(k.clone(), v.clone());
            }
        }
        style
    }

    pub fn for_category(def: &CategoryDef, bucket: GeometryBucket) -> Self {
        let overrides = def.style.as_ref().and_then(|s| bucket_overrides(s, bucket));
        Self::compose(bucket, &normalize_color(def.color()), def.alpha(), overrides)
    }
}

pub fn bucket_overrides(fragment: &StyleFragment, bucket: GeometryBucket) -> Option<&LayerStyleDef> {
    match bucket {
        GeometryBucket::Point => fragment.point.as_ref(),
        GeometryBucket::Line => fragment.line.as_ref(),
        GeometryBucket::Fill => fragment.fill.as_ref(),
        GeometryBucket::Stroke => fragment.stroke.as_ref(),
    }
}

fn default_style(bucket: GeometryBucket, color: &str, alpha: u8) -> BucketStyle {
    let opacity = f64::from(alpha) / 255.0;
    let mut paint = Map::new();
    let mut layout = Map::new();
    match bucket {
        GeometryBucket::Point => {
            paint.insert("circle-color".into(), Value::from(color));
            paint.insert("circle-opacity".into(), Value::from(opacity));
            paint.insert("circle-radius".into(), Value::from(5));
            paint.insert("circle-stroke-color".into(), Value::from("#ffffff"));
            paint.insert("circle-stroke-width".into(), Value::from(1));
        }
        GeometryBucket::Line => {
            paint.insert("line-color".into(), Value::from(color));
            paint.insert("line-opacity".into(), Value::from(opacity));
            paint.insert("line-width".into(), Value::from(2));
            layout.insert("line-cap".into(), Value::from("round"));
            layout.insert("line-join".into(), Value::from("round"));
        }
        GeometryBucket::Fill => {
            paint.insert("fill-color".into(), Value::from(color));
            // Fills are drawn at half the category opacity so outlines stay readable.
            paint.insert("fill-opacity".into(), Value::from(opacity * 0.5));
        }
        GeometryBucket::Stroke => {
            paint.insert("line-color".into(), Value::from(color));
            paint.insert("line-opacity".into(), Value::from(opacity));
            paint.insert("line-width".into(), Value::from(1));
        }
    }
    BucketStyle { paint, layout }
}

/// Parses `#rgb` or `#rrggbb` into 0..=255 channels.
pub fn parse_hex_color(s: &str) -> Option<[u8; 3]> {
    let s = s.trim();
    let s = s.strip_prefix('#').unwrap_or(s);
    if !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    match s.len() {
        6 => {
            let r = u8::from_str_radix(&s[0..2], 16).ok()?;
            let g = u8::from_str_radix(&s[2..4], 16).ok()?;
            let b = u8::from_str_radix(&s[4..6], 16).ok()?;
            Some([r, g, b])
        }
        3 => {
            let mut out = [0u8; 3];
            for (i, c) in s.chars().enumerate() {
                let v = c.to_digit(16)? as u8;
                out[i] = v * 17;
            }
            Some(out)
        }
        _ => None,
    }
}

/// Hex colors become lowercase `#rrggbb`; other CSS colors pass through and
/// an empty string falls back to the default category color.
pub fn normalize_color(s: &str) -> String {
    if s.trim().is_empty() {
        return DEFAULT_CATEGORY_COLOR.to_string();
    }
    match parse_hex_color(s) {
        Some([r, g, b]) => format!("#{r:02x}{g:02x}{b:02x}"),
        None => s.trim().to_string(),
    }
}
