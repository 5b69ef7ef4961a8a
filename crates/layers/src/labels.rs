use std::collections::BTreeMap;

use formats::{Feature, GeoPoint, Geometry, GeometryFamily};
use serde::Deserialize;
use serde_json::Value;
use surface::RenderSurface;

/// Labels features carrying property `key`, optionally only one geometry family.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LabelRule {
    pub key: String,
    #[serde(default)]
    pub family: Option<GeometryFamily>,
    #[serde(default = "default_priority")]
    pub priority: f32,
}

fn default_priority() -> f32 {
    1.0
}

impl LabelRule {
    pub fn new(key: impl Into<String>, priority: f32) -> Self {
        Self {
            key: key.into(),
            family: None,
            priority,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LabelsConfig {
    pub rules: Vec<LabelRule>,
    pub max_labels: usize,
    pub max_text_len: usize,
}

impl Default for LabelsConfig {
    fn default() -> Self {
        Self {
            rules: vec![LabelRule::new("name", 1.0)],
            max_labels: 10_000,
            max_text_len: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelAnchor {
    pub object_id: Option<String>,
    pub text: String,
    pub position: GeoPoint,
    pub family: GeometryFamily,
    pub priority: f32,
}

/// Hook invoked after a source's data has been replaced.
pub trait LabelOverlay {
    fn update_source_labels(&mut self, surface: &dyn RenderSurface, source_id: &str);

    /// Forget everything, e.g. after the surface was rebuilt.
    fn clear(&mut self) {}
}

/// Overlay that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLabels;

impl LabelOverlay for NoLabels {
    fn update_source_labels(&mut self, _surface: &dyn RenderSurface, _source_id: &str) {}
}

/// Keeps label anchors per source, recomputed whenever the source is flushed.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SourceLabels {
    pub config: LabelsConfig,
    by_source: BTreeMap<String, Vec<LabelAnchor>>,
}

impl SourceLabels {
    pub fn new(config: LabelsConfig) -> Self {
        Self {
            config,
            by_source: BTreeMap::new(),
        }
    }

    pub fn labels(&self, source_id: &str) -> &[LabelAnchor] {
        self.by_source
            .get(source_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn label_count(&self) -> usize {
        self.by_source.values().map(Vec::len).sum()
    }

    pub fn extract(&self, features: &[Feature]) -> Vec<LabelAnchor> {
        let mut out = Vec::new();
        if self.config.rules.is_empty() {
            return out;
        }

        for feature in features {
            let Some(family) = feature.geometry.family() else {
                continue;
            };
            let Some(anchor) = label_anchor_for_geometry(&feature.geometry) else {
                continue;
            };

            for rule in &self.config.rules {
                if let Some(want) = rule.family
                    && want != family
                {
                    continue;
                }
                let Some(raw_text) = property_text(feature.properties.get(&rule.key)) else {
                    continue;
                };
                let trimmed = raw_text.trim();
                if trimmed.is_empty() || trimmed.len() > self.config.max_text_len {
                    continue;
                }

                out.push(LabelAnchor {
                    object_id: feature.object_id(),
                    text: trimmed.to_string(),
                    position: anchor.clone(),
                    family,
                    priority: rule.priority,
                });
            }
        }

        out.sort_by(|a, b| {
            b.priority
                .partial_cmp(&a.priority)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        out.truncate(self.config.max_labels);
        out
    }
}

impl LabelOverlay for SourceLabels {
    fn update_source_labels(&mut self, surface: &dyn RenderSurface, source_id: &str) {
        match surface.source_features(source_id) {
            Some(features) => {
                let labels = self.extract(&features);
                self.by_source.insert(source_id.to_string(), labels);
            }
            None => {
                self.by_source.remove(source_id);
            }
        }
    }

    fn clear(&mut self) {
        self.by_source.clear();
    }
}

fn property_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn label_anchor_for_geometry(geom: &Geometry) -> Option<GeoPoint> {
    match geom {
        Geometry::Point(p) => Some(p.clone()),
        Geometry::MultiPoint(points) => points.first().cloned(),
        Geometry::LineString(vertices) => line_midpoint(vertices),
        Geometry::MultiLineString(lines) => lines.first().and_then(|l| line_midpoint(l)),
        Geometry::Polygon(rings) => area_centroid(rings),
        Geometry::MultiPolygon(polys) => polys.first().and_then(|p| area_centroid(p)),
        Geometry::GeometryCollection(_) => None,
    }
}

fn line_midpoint(vertices: &[GeoPoint]) -> Option<GeoPoint> {
    if vertices.len() < 2 {
        return vertices.first().cloned();
    }

    let mut total = 0.0;
    let mut segments: Vec<(&GeoPoint, &GeoPoint, f64)> = Vec::with_capacity(vertices.len() - 1);
    for pair in vertices.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        let len = (b.lon_deg - a.lon_deg).hypot(b.lat_deg - a.lat_deg);
        if !len.is_finite() || len <= 0.0 {
            continue;
        }
        total += len;
        segments.push((a, b, len));
    }
    if total <= 0.0 {
        return vertices.first().cloned();
    }

    let mut acc = 0.0;
    let target = total * 0.5;
    for (a, b, len) in segments {
        if acc + len >= target {
            let t = (target - acc) / len;
            return Some(GeoPoint::new(
                a.lon_deg + (b.lon_deg - a.lon_deg) * t,
                a.lat_deg + (b.lat_deg - a.lat_deg) * t,
            ));
        }
        acc += len;
    }

    vertices.last().cloned()
}

fn area_centroid(rings: &[Vec<GeoPoint>]) -> Option<GeoPoint> {
    let outer = rings.first()?;
    // Closed rings repeat the first vertex; count it once.
    let open = match (outer.first(), outer.last()) {
        (Some(a), Some(b)) if outer.len() > 1 && a == b => &outer[..outer.len() - 1],
        _ => &outer[..],
    };
    let mut sum = (0.0, 0.0);
    let mut count = 0.0_f64;
    for v in open {
        if v.lon_deg.is_finite() && v.lat_deg.is_finite() {
            sum.0 += v.lon_deg;
            sum.1 += v.lat_deg;
            count += 1.0;
        }
    }
    if count <= 0.0 {
        return None;
    }
    Some(GeoPoint::new(sum.0 / count, sum.1 / count))
}
