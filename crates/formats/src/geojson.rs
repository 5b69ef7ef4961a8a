use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Property carrying a feature's identity within its category.
pub const OBJECT_ID_KEY: &str = "objectid";
/// Property carrying a feature's resolved category.
pub const CATEGORY_ID_KEY: &str = "categoryId";

#[derive(Debug, Clone, PartialEq)]
pub struct GeoPoint {
    pub lon_deg: f64,
    pub lat_deg: f64,
}

impl GeoPoint {
    pub fn new(lon_deg: f64, lat_deg: f64) -> Self {
        Self { lon_deg, lat_deg }
    }
}

/// Render family of a geometry. Each family maps to its own layer(s).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GeometryFamily {
    Point,
    Line,
    Polygon,
}

impl GeometryFamily {
    /// GeoJSON type names that belong to this family.
    pub fn type_names(self) -> [&'static str; 2] {
        match self {
            GeometryFamily::Point => ["Point", "MultiPoint"],
            GeometryFamily::Line => ["LineString", "MultiLineString"],
            GeometryFamily::Polygon => ["Polygon", "MultiPolygon"],
        }
    }

    pub fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "Point" | "MultiPoint" => Some(GeometryFamily::Point),
            "LineString" | "MultiLineString" | "Line" => Some(GeometryFamily::Line),
            "Polygon" | "MultiPolygon" => Some(GeometryFamily::Polygon),
            _ => None,
        }
    }
}

impl Serialize for GeometryFamily {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.type_names()[0])
    }
}

impl<'de> Deserialize<'de> for GeometryFamily {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Self::from_type_name(&name)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown geometry type: {name}")))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(GeoPoint),
    MultiPoint(Vec<GeoPoint>),
    LineString(Vec<GeoPoint>),
    MultiLineString(Vec<Vec<GeoPoint>>),
    Polygon(Vec<Vec<GeoPoint>>),
    MultiPolygon(Vec<Vec<Vec<GeoPoint>>>),
    GeometryCollection(Vec<Geometry>),
}

impl Geometry {
    pub fn type_name(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "Point",
            Geometry::MultiPoint(_) => "MultiPoint",
            Geometry::LineString(_) => "LineString",
            Geometry::MultiLineString(_) => "MultiLineString",
            Geometry::Polygon(_) => "Polygon",
            Geometry::MultiPolygon(_) => "MultiPolygon",
            Geometry::GeometryCollection(_) => "GeometryCollection",
        }
    }

    /// `None` for collections, which have no single family.
    pub fn family(&self) -> Option<GeometryFamily> {
        GeometryFamily::from_type_name(self.type_name())
    }

    /// Flattens nested collections into their leaf geometries, in order.
    pub fn into_leaves(self) -> Vec<Geometry> {
        match self {
            Geometry::GeometryCollection(children) => {
                children.into_iter().flat_map(Geometry::into_leaves).collect()
            }
            leaf => vec![leaf],
        }
    }

    pub fn to_value(&self) -> Value {
        geometry_to_geojson_value(self)
    }

    pub fn from_value(value: &Value) -> Result<Self, PayloadError> {
        parse_geometry(value).map_err(PayloadError::InvalidGeometry)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: Option<String>,
    pub properties: Map<String, Value>,
    pub geometry: Geometry,
}

impl Feature {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            id: None,
            properties: Map::new(),
            geometry,
        }
    }

    /// The `objectid` property, accepting string or numeric encodings.
    pub fn object_id(&self) -> Option<String> {
        match self.properties.get(OBJECT_ID_KEY) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn set_object_id(&mut self, object_id: &str) {
        self.properties.insert(
            OBJECT_ID_KEY.to_string(),
            Value::String(object_id.to_string()),
        );
    }

    pub fn category_id(&self) -> Option<&str> {
        self.properties
            .get(CATEGORY_ID_KEY)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    pub fn set_category_id(&mut self, category_id: &str) {
        self.properties.insert(
            CATEGORY_ID_KEY.to_string(),
            Value::String(category_id.to_string()),
        );
    }

    pub fn to_value(&self) -> Value {
        let mut fobj = Map::new();
        fobj.insert("type".to_string(), Value::String("Feature".to_string()));
        if let Some(id) = &self.id {
            fobj.insert("id".to_string(), Value::String(id.clone()));
        }
        fobj.insert(
            "properties".to_string(),
            Value::Object(self.properties.clone()),
        );
        fobj.insert("geometry".to_string(), self.geometry.to_value());
        Value::Object(fobj)
    }
}

/// Serializes features as a GeoJSON FeatureCollection.
pub fn feature_collection_value(features: &[Feature]) -> Value {
    let mut root = Map::new();
    root.insert(
        "type".to_string(),
        Value::String("FeatureCollection".to_string()),
    );
    root.insert(
        "features".to_string(),
        Value::Array(features.iter().map(Feature::to_value).collect()),
    );
    Value::Object(root)
}

#[derive(Debug, Clone, PartialEq)]
pub enum PayloadError {
    Json(String),
    NotAnObject,
    UnsupportedType(String),
    InvalidFeature { index: usize, reason: String },
    InvalidGeometry(String),
}

impl std::fmt::Display for PayloadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayloadError::Json(msg) => write!(f, "JSON parse error: {msg}"),
            PayloadError::NotAnObject => write!(f, "GeoJSON payload must be an object"),
            PayloadError::UnsupportedType(ty) => write!(f, "unsupported GeoJSON type: {ty}"),
            PayloadError::InvalidFeature { index, reason } => {
                write!(f, "invalid feature at index {index}: {reason}")
            }
            PayloadError::InvalidGeometry(reason) => write!(f, "invalid geometry: {reason}"),
        }
    }
}

impl std::error::Error for PayloadError {}

/// Every shape a host may send to `add_feature`.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Feature(Feature),
    FeatureCollection {
        features: Vec<Feature>,
        /// Collection-level properties; only `categoryId` is inherited.
        properties: Map<String, Value>,
    },
    Geometry(Geometry),
}

impl Payload {
    pub fn from_geojson_str(text: &str) -> Result<Self, PayloadError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| PayloadError::Json(e.to_string()))?;
        Self::from_geojson_value(&value)
    }

    pub fn from_geojson_value(value: &Value) -> Result<Self, PayloadError> {
        let obj = value.as_object().ok_or(PayloadError::NotAnObject)?;
        let ty = obj
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| PayloadError::UnsupportedType("<missing>".to_string()))?;

        match ty {
            "Feature" => parse_feature(obj)
                .map(Payload::Feature)
                .map_err(|reason| PayloadError::InvalidFeature { index: 0, reason }),
            "FeatureCollection" => {
                let features_val = obj
                    .get("features")
                    .and_then(|v| v.as_array())
                    .ok_or_else(|| PayloadError::InvalidFeature {
                        index: 0,
                        reason: "FeatureCollection missing features array".to_string(),
                    })?;
                let mut features = Vec::with_capacity(features_val.len());
                for (index, feat_val) in features_val.iter().enumerate() {
                    let feat_obj =
                        feat_val
                            .as_object()
                            .ok_or_else(|| PayloadError::InvalidFeature {
                                index,
                                reason: "feature must be an object".to_string(),
                            })?;
                    let feature = parse_feature(feat_obj)
                        .map_err(|reason| PayloadError::InvalidFeature { index, reason })?;
                    features.push(feature);
                }

                let mut properties = obj
                    .get("properties")
                    .and_then(|v| v.as_object())
                    .cloned()
                    .unwrap_or_default();
                // Some hosts put the category on the collection itself.
                if let Some(cat) = obj.get(CATEGORY_ID_KEY)
                    && !properties.contains_key(CATEGORY_ID_KEY)
                {
                    properties.insert(CATEGORY_ID_KEY.to_string(), cat.clone());
                }
                Ok(Payload::FeatureCollection {
                    features,
                    properties,
                })
            }
            "Point" | "MultiPoint" | "LineString" | "MultiLineString" | "Polygon"
            | "MultiPolygon" | "GeometryCollection" => {
                Geometry::from_value(value).map(Payload::Geometry)
            }
            other => Err(PayloadError::UnsupportedType(other.to_string())),
        }
    }

    /// Produces the uniform feature list the ingestion path works on.
    ///
    /// - A single feature takes `object_id` as its identity (falling back to
    ///   its own `objectid` or `id` when `object_id` is empty).
    /// - Collection members keep their own identity, or get
    ///   `<object_id>_<index>` when they have none.
    /// - Geometry collections split into one feature per leaf geometry,
    ///   identified `<base>_<index>`.
    /// - Collection members inherit the collection's `categoryId` only when
    ///   they carry none themselves.
    pub fn normalize(self, object_id: &str) -> Vec<Feature> {
        match self {
            Payload::Feature(mut feature) => {
                if !object_id.is_empty() {
                    feature.set_object_id(object_id);
                } else if feature.object_id().is_none()
                    && let Some(id) = feature.id.clone()
                {
                    feature.set_object_id(&id);
                }
                explode(feature)
            }
            Payload::FeatureCollection {
                features,
                properties,
            } => {
                let inherited = properties
                    .get(CATEGORY_ID_KEY)
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                let mut out = Vec::with_capacity(features.len());
                for (index, mut feature) in features.into_iter().enumerate() {
                    if feature.object_id().is_none() {
                        let id = match &feature.id {
                            Some(id) => id.clone(),
                            None => indexed_id(object_id, index),
                        };
                        feature.set_object_id(&id);
                    }
                    if feature.category_id().is_none()
                        && let Some(cat) = &inherited
                    {
                        feature.set_category_id(cat);
                    }
                    out.extend(explode(feature));
                }
                out
            }
            Payload::Geometry(geometry) => {
                let mut feature = Feature::new(geometry);
                if !object_id.is_empty() {
                    feature.set_object_id(object_id);
                }
                explode(feature)
            }
        }
    }
}

fn indexed_id(base: &str, index: usize) -> String {
    if base.is_empty() {
        index.to_string()
    } else {
        format!("{base}_{index}")
    }
}

fn explode(feature: Feature) -> Vec<Feature> {
    if !matches!(feature.geometry, Geometry::GeometryCollection(_)) {
        return vec![feature];
    }
    let Feature {
        id,
        properties,
        geometry,
    } = feature;
    let base = properties
        .get(OBJECT_ID_KEY)
        .and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .unwrap_or_default();

    geometry
        .into_leaves()
        .into_iter()
        .enumerate()
        .map(|(index, leaf)| {
            let mut child = Feature {
                id: id.as_ref().map(|id| format!("{id}_{index}")),
                properties: properties.clone(),
                geometry: leaf,
            };
            child.set_object_id(&indexed_id(&base, index));
            child
        })
        .collect()
}

fn parse_feature(obj: &Map<String, Value>) -> Result<Feature, String> {
    let ty = obj
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or("feature missing type".to_string())?;
    if ty != "Feature" {
        return Err(format!("unexpected feature type: {ty}"));
    }

    let id = match obj.get("id") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };

    let properties = obj
        .get("properties")
        .and_then(|v| v.as_object())
        .cloned()
        .unwrap_or_default();

    let geometry_val = obj
        .get("geometry")
        .filter(|v| !v.is_null())
        .ok_or("feature missing geometry".to_string())?;
    let geometry = parse_geometry(geometry_val)?;

    Ok(Feature {
        id,
        properties,
        geometry,
    })
}

fn geometry_to_geojson_value(geom: &Geometry) -> Value {
    let mut obj = Map::new();
    obj.insert(
        "type".to_string(),
        Value::String(geom.type_name().to_string()),
    );
    match geom {
        Geometry::Point(p) => {
            obj.insert("coordinates".to_string(), point_coords(p));
        }
        Geometry::MultiPoint(ps) | Geometry::LineString(ps) => {
            obj.insert("coordinates".to_string(), line_coords(ps));
        }
        Geometry::MultiLineString(rings) | Geometry::Polygon(rings) => {
            obj.insert(
                "coordinates".to_string(),
                Value::Array(rings.iter().map(|r| line_coords(r)).collect()),
            );
        }
        Geometry::MultiPolygon(polys) => {
            let coords = polys
                .iter()
                .map(|poly| Value::Array(poly.iter().map(|r| line_coords(r)).collect()))
                .collect();
            obj.insert("coordinates".to_string(), Value::Array(coords));
        }
        Geometry::GeometryCollection(children) => {
            obj.insert(
                "geometries".to_string(),
                Value::Array(children.iter().map(geometry_to_geojson_value).collect()),
            );
        }
    }
    Value::Object(obj)
}

fn point_coords(p: &GeoPoint) -> Value {
    Value::Array(vec![Value::from(p.lon_deg), Value::from(p.lat_deg)])
}

fn line_coords(ps: &[GeoPoint]) -> Value {
    Value::Array(ps.iter().map(point_coords).collect())
}

fn parse_geometry(value: &Value) -> Result<Geometry, String> {
    let obj = value
        .as_object()
        .ok_or("geometry must be an object".to_string())?;
    let ty = obj
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or("geometry missing type".to_string())?;

    if ty == "GeometryCollection" {
        let children = obj
            .get("geometries")
            .and_then(|v| v.as_array())
            .ok_or("GeometryCollection missing geometries".to_string())?;
        let mut out = Vec::with_capacity(children.len());
        for child in children {
            out.push(parse_geometry(child)?);
        }
        return Ok(Geometry::GeometryCollection(out));
    }

    let coords = obj
        .get("coordinates")
        .ok_or("geometry missing coordinates".to_string())?;

    match ty {
        "Point" => Ok(Geometry::Point(parse_point(coords)?)),
        "MultiPoint" => Ok(Geometry::MultiPoint(parse_points(coords)?)),
        "LineString" => Ok(Geometry::LineString(parse_points(coords)?)),
        "MultiLineString" => Ok(Geometry::MultiLineString(parse_rings(coords)?)),
        "Polygon" => Ok(Geometry::Polygon(parse_rings(coords)?)),
        "MultiPolygon" => {
            let polys = coords
                .as_array()
                .ok_or("MultiPolygon coordinates must be an array of polygons".to_string())?;
            let mut out = Vec::with_capacity(polys.len());
            for poly in polys {
                out.push(parse_rings(poly)?);
            }
            Ok(Geometry::MultiPolygon(out))
        }
        other => Err(format!("unsupported geometry type: {other}")),
    }
}

fn parse_point(coords: &Value) -> Result<GeoPoint, String> {
    let arr = coords
        .as_array()
        .ok_or("Point coordinates must be an array".to_string())?;
    if arr.len() < 2 {
        return Err("Point coordinates must have [lon, lat]".to_string());
    }
    let lon = arr[0]
        .as_f64()
        .ok_or("Point lon must be a number".to_string())?;
    let lat = arr[1]
        .as_f64()
        .ok_or("Point lat must be a number".to_string())?;
    Ok(GeoPoint::new(lon, lat))
}

fn parse_points(coords: &Value) -> Result<Vec<GeoPoint>, String> {
    let arr = coords
        .as_array()
        .ok_or("coordinates must be an array".to_string())?;
    let mut out = Vec::with_capacity(arr.len());
    for item in arr {
        out.push(parse_point(item)?);
    }
    Ok(out)
}

fn parse_rings(coords: &Value) -> Result<Vec<Vec<GeoPoint>>, String> {
    let arr = coords
        .as_array()
        .ok_or("coordinates must be an array of rings".to_string())?;
    let mut out = Vec::with_capacity(arr.len());
    for ring in arr {
        out.push(parse_points(ring)?);
    }
    Ok(out)
}
