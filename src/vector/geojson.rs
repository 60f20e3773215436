//! Minimal GeoJSON reader for hand-authored layers (offset-scenario polygons,
//! native range lines). Handles `FeatureCollection`, a bare `Feature`, and
//! `Polygon` / `MultiPolygon` / `LineString` / `MultiLineString` geometries.

use std::path::Path;

use geo::{Coord, LineString, MultiLineString, MultiPolygon, Polygon};
use serde_json::Value as JsonValue;

use super::{Feature, PolygonLayer, VectorError};
use crate::data::model::{AttributeValue, Attributes};

pub fn read_polygons(path: &Path) -> Result<PolygonLayer, VectorError> {
    let root = read_json(path)?;
    let mut features = Vec::new();
    for (geometry, attributes) in raw_features(&root)? {
        let geometry = match geometry_type(geometry)? {
            "Polygon" => MultiPolygon(vec![polygon(coordinates(geometry)?)?]),
            "MultiPolygon" => MultiPolygon(
                as_array(coordinates(geometry)?, "MultiPolygon coordinates")?
                    .iter()
                    .map(polygon)
                    .collect::<Result<_, _>>()?,
            ),
            other => {
                log::warn!("{}: skipping {other} geometry", path.display());
                continue;
            }
        };
        features.push(Feature {
            geometry,
            attributes,
        });
    }
    Ok(PolygonLayer::from_features(features))
}

pub fn read_lines(path: &Path) -> Result<Vec<Feature<MultiLineString<f64>>>, VectorError> {
    let root = read_json(path)?;
    let mut features = Vec::new();
    for (geometry, attributes) in raw_features(&root)? {
        let geometry = match geometry_type(geometry)? {
            "LineString" => MultiLineString(vec![line_string(coordinates(geometry)?)?]),
            "MultiLineString" => MultiLineString(
                as_array(coordinates(geometry)?, "MultiLineString coordinates")?
                    .iter()
                    .map(line_string)
                    .collect::<Result<_, _>>()?,
            ),
            other => {
                log::warn!("{}: skipping {other} geometry", path.display());
                continue;
            }
        };
        features.push(Feature {
            geometry,
            attributes,
        });
    }
    Ok(features)
}

fn read_json(path: &Path) -> Result<JsonValue, VectorError> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// `(geometry, properties)` pairs of every feature in the document.
fn raw_features(root: &JsonValue) -> Result<Vec<(&JsonValue, Attributes)>, VectorError> {
    let features: Vec<&JsonValue> = match root.get("type").and_then(JsonValue::as_str) {
        Some("FeatureCollection") => as_array(
            root.get("features")
                .ok_or_else(|| err("FeatureCollection without 'features'"))?,
            "features",
        )?
        .iter()
        .collect(),
        Some("Feature") => vec![root],
        Some(other) => return Err(err(&format!("unsupported top-level type '{other}'"))),
        None => return Err(err("missing top-level 'type'")),
    };

    features
        .into_iter()
        .enumerate()
        .map(|(i, f)| {
            let geometry = f
                .get("geometry")
                .filter(|g| !g.is_null())
                .ok_or_else(|| err(&format!("feature {i} has no geometry")))?;
            let attributes: Attributes = f
                .get("properties")
                .and_then(JsonValue::as_object)
                .map(|props| {
                    props
                        .iter()
                        .map(|(k, v)| (k.clone(), json_to_attribute(v)))
                        .collect()
                })
                .unwrap_or_default();
            Ok((geometry, attributes))
        })
        .collect()
}

fn geometry_type(geometry: &JsonValue) -> Result<&str, VectorError> {
    geometry
        .get("type")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| err("geometry without 'type'"))
}

fn coordinates(geometry: &JsonValue) -> Result<&JsonValue, VectorError> {
    geometry
        .get("coordinates")
        .ok_or_else(|| err("geometry without 'coordinates'"))
}

fn polygon(rings: &JsonValue) -> Result<Polygon<f64>, VectorError> {
    let mut rings = as_array(rings, "polygon rings")?
        .iter()
        .map(line_string)
        .collect::<Result<Vec<_>, _>>()?
        .into_iter();
    let exterior = rings.next().ok_or_else(|| err("polygon without rings"))?;
    Ok(Polygon::new(exterior, rings.collect()))
}

fn line_string(positions: &JsonValue) -> Result<LineString<f64>, VectorError> {
    as_array(positions, "positions")?
        .iter()
        .map(|pos| {
            let xy = as_array(pos, "position")?;
            match (xy.first().and_then(JsonValue::as_f64), xy.get(1).and_then(JsonValue::as_f64)) {
                (Some(x), Some(y)) => Ok(Coord { x, y }),
                _ => Err(err("position is not [lon, lat]")),
            }
        })
        .collect::<Result<Vec<_>, _>>()
        .map(LineString::from)
}

fn as_array<'a>(v: &'a JsonValue, what: &str) -> Result<&'a Vec<JsonValue>, VectorError> {
    v.as_array().ok_or_else(|| err(&format!("{what} is not an array")))
}

fn json_to_attribute(val: &JsonValue) -> AttributeValue {
    match val {
        JsonValue::String(s) => AttributeValue::String(s.clone()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                AttributeValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                AttributeValue::Float(f)
            } else {
                AttributeValue::String(n.to_string())
            }
        }
        JsonValue::Bool(b) => AttributeValue::Bool(*b),
        JsonValue::Null => AttributeValue::Null,
        other => AttributeValue::String(other.to_string()),
    }
}

fn err(msg: &str) -> VectorError {
    VectorError::GeoJson(msg.to_string())
}
