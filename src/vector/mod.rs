//! Vector layers: boundary polygons (countries, EEZs, offset scenarios) and
//! lines (native ranges), each feature carrying a set of attributes.
//!
//! Layers are read from ESRI shapefiles or GeoJSON feature collections and
//! are always in WGS84 lon/lat.

pub mod geojson;
pub mod shp;

use std::path::Path;

use geo::{BoundingRect, Contains, MultiLineString, MultiPolygon, Point, Rect};
use thiserror::Error;

use crate::data::model::{AttributeValue, Attributes};

/// Error type for vector layer operations.
#[derive(Debug, Error)]
pub enum VectorError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Shapefile error: {0}")]
    Shapefile(String),

    #[error("GeoJSON error: {0}")]
    GeoJson(String),

    #[error("unsupported vector format: .{0}")]
    UnsupportedFormat(String),
}

impl From<shapefile::Error> for VectorError {
    fn from(e: shapefile::Error) -> Self {
        VectorError::Shapefile(e.to_string())
    }
}

impl From<serde_json::Error> for VectorError {
    fn from(e: serde_json::Error) -> Self {
        VectorError::GeoJson(e.to_string())
    }
}

/// A geometry with attributes.
#[derive(Debug, Clone)]
pub struct Feature<G> {
    pub geometry: G,
    pub attributes: Attributes,
}

impl<G> Feature<G> {
    /// Text of the first present attribute among `fields`.
    pub fn label(&self, fields: &[&str]) -> Option<String> {
        fields
            .iter()
            .filter_map(|f| self.attributes.get(*f))
            .find(|v| !v.is_null())
            .map(AttributeValue::to_string)
    }
}

// ---------------------------------------------------------------------------
// PolygonLayer
// ---------------------------------------------------------------------------

/// Polygon features with cached bounding boxes for point-in-polygon tests.
#[derive(Debug, Clone, Default)]
pub struct PolygonLayer {
    features: Vec<Feature<MultiPolygon<f64>>>,
    bboxes: Vec<Option<Rect<f64>>>,
}

impl PolygonLayer {
    pub fn from_features(features: Vec<Feature<MultiPolygon<f64>>>) -> Self {
        let bboxes = features.iter().map(|f| f.geometry.bounding_rect()).collect();
        Self { features, bboxes }
    }

    /// Load polygons from a `.shp` or `.geojson`/`.json` file.
    pub fn load(path: &Path) -> Result<Self, VectorError> {
        let layer = match extension(path).as_str() {
            "shp" => shp::read_polygons(path)?,
            "geojson" | "json" => geojson::read_polygons(path)?,
            other => return Err(VectorError::UnsupportedFormat(other.to_string())),
        };
        log::debug!("{}: {} polygon features", path.display(), layer.len());
        Ok(layer)
    }

    pub fn features(&self) -> &[Feature<MultiPolygon<f64>>] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Index of the first feature whose interior contains the coordinate.
    pub fn feature_index_at(&self, lon: f64, lat: f64) -> Option<usize> {
        let point = Point::new(lon, lat);
        self.features.iter().zip(&self.bboxes).position(|(f, bbox)| {
            bbox.map(|b| rect_contains(&b, lon, lat)).unwrap_or(false)
                && f.geometry.contains(&point)
        })
    }

    /// Whether the coordinate lies inside any feature.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        self.feature_index_at(lon, lat).is_some()
    }

    /// Sub-layer of features matching a predicate.
    pub fn filter<F>(&self, mut keep: F) -> PolygonLayer
    where
        F: FnMut(&Feature<MultiPolygon<f64>>) -> bool,
    {
        PolygonLayer::from_features(self.features.iter().filter(|f| keep(f)).cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// LineLayer
// ---------------------------------------------------------------------------

/// Line features (e.g. native range limits of a species).
#[derive(Debug, Clone, Default)]
pub struct LineLayer {
    pub features: Vec<Feature<MultiLineString<f64>>>,
}

impl LineLayer {
    /// Load lines from a `.shp` or `.geojson`/`.json` file.
    pub fn load(path: &Path) -> Result<Self, VectorError> {
        let features = match extension(path).as_str() {
            "shp" => shp::read_lines(path)?,
            "geojson" | "json" => geojson::read_lines(path)?,
            other => return Err(VectorError::UnsupportedFormat(other.to_string())),
        };
        log::debug!("{}: {} line features", path.display(), features.len());
        Ok(Self { features })
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase()
}

fn rect_contains(rect: &Rect<f64>, lon: f64, lat: f64) -> bool {
    lon >= rect.min().x && lon <= rect.max().x && lat >= rect.min().y && lat <= rect.max().y
}

#[cfg(test)]
pub(crate) mod tests {
    use geo::{polygon, MultiPolygon};

    use super::*;

    /// Axis-aligned square feature named `name`.
    pub(crate) fn square(name: &str, x0: f64, y0: f64, x1: f64, y1: f64) -> Feature<MultiPolygon<f64>> {
        let poly = polygon![
            (x: x0, y: y0),
            (x: x1, y: y0),
            (x: x1, y: y1),
            (x: x0, y: y1),
            (x: x0, y: y0),
        ];
        Feature {
            geometry: MultiPolygon(vec![poly]),
            attributes: Attributes::from([(
                "name".to_string(),
                AttributeValue::String(name.to_string()),
            )]),
        }
    }

    #[test]
    fn point_in_polygon_lookup() {
        let layer = PolygonLayer::from_features(vec![
            square("A", 0.0, 0.0, 10.0, 10.0),
            square("B", 20.0, 0.0, 30.0, 10.0),
        ]);
        assert_eq!(layer.feature_index_at(5.0, 5.0), Some(0));
        let b = layer.feature_index_at(25.0, 1.0).unwrap();
        assert_eq!(layer.features()[b].label(&["name"]), Some("B".to_string()));
        assert!(!layer.contains(15.0, 5.0));
    }

    #[test]
    fn filter_keeps_matching_features() {
        let layer = PolygonLayer::from_features(vec![
            square("A", 0.0, 0.0, 10.0, 10.0),
            square("B", 20.0, -5.0, 30.0, 10.0),
        ]);
        let only_b = layer.filter(|f| f.label(&["name"]).as_deref() == Some("B"));
        assert_eq!(only_b.len(), 1);
        assert!(!only_b.contains(5.0, 5.0));
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        assert!(matches!(
            PolygonLayer::load(Path::new("eez.kml")),
            Err(VectorError::UnsupportedFormat(_))
        ));
    }
}
