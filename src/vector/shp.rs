//! ESRI shapefile reader (`.shp` geometry + `.dbf` attributes).

use std::path::Path;

use geo::{Coord, LineString, MultiLineString, MultiPolygon, Polygon};
use shapefile::dbase::{FieldValue, Record};
use shapefile::{PolygonRing, Reader, Shape};

use super::{Feature, PolygonLayer, VectorError};
use crate::data::model::{AttributeValue, Attributes};

/// Read every polygon shape; other shape types are skipped.
///
/// Rings are grouped the shapefile way: an outer ring starts a new polygon,
/// following inner rings become its holes.
pub fn read_polygons(path: &Path) -> Result<PolygonLayer, VectorError> {
    let mut reader = Reader::from_path(path)?;
    let mut features = Vec::new();
    let mut skipped = 0usize;

    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result?;
        let rings: Vec<Ring> = match &shape {
            Shape::Polygon(p) => p.rings().iter().map(|r| ring_coords(r, |p| (p.x, p.y))).collect(),
            Shape::PolygonM(p) => p.rings().iter().map(|r| ring_coords(r, |p| (p.x, p.y))).collect(),
            Shape::PolygonZ(p) => p.rings().iter().map(|r| ring_coords(r, |p| (p.x, p.y))).collect(),
            _ => {
                skipped += 1;
                continue;
            }
        };
        features.push(Feature {
            geometry: assemble_polygons(rings),
            attributes: attributes(record),
        });
    }

    if skipped > 0 {
        log::warn!("{}: skipped {skipped} non-polygon shapes", path.display());
    }
    Ok(PolygonLayer::from_features(features))
}

/// Read every polyline shape; other shape types are skipped.
pub fn read_lines(path: &Path) -> Result<Vec<Feature<MultiLineString<f64>>>, VectorError> {
    let mut reader = Reader::from_path(path)?;
    let mut features = Vec::new();

    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result?;
        let parts: Vec<LineString<f64>> = match &shape {
            Shape::Polyline(l) => l
                .parts()
                .iter()
                .map(|part| part.iter().map(|p| Coord { x: p.x, y: p.y }).collect())
                .collect(),
            Shape::PolylineM(l) => l
                .parts()
                .iter()
                .map(|part| part.iter().map(|p| Coord { x: p.x, y: p.y }).collect())
                .collect(),
            Shape::PolylineZ(l) => l
                .parts()
                .iter()
                .map(|part| part.iter().map(|p| Coord { x: p.x, y: p.y }).collect())
                .collect(),
            _ => continue,
        };
        features.push(Feature {
            geometry: MultiLineString(parts),
            attributes: attributes(record),
        });
    }
    Ok(features)
}

/// A ring as (is_outer, coords).
type Ring = (bool, Vec<Coord<f64>>);

fn ring_coords<P>(ring: &PolygonRing<P>, xy: impl Fn(&P) -> (f64, f64)) -> Ring {
    let (outer, points) = match ring {
        PolygonRing::Outer(pts) => (true, pts),
        PolygonRing::Inner(pts) => (false, pts),
    };
    let coords = points
        .iter()
        .map(|p| {
            let (x, y) = xy(p);
            Coord { x, y }
        })
        .collect();
    (outer, coords)
}

pub(crate) fn assemble_polygons(rings: Vec<Ring>) -> MultiPolygon<f64> {
    let mut polygons: Vec<(LineString<f64>, Vec<LineString<f64>>)> = Vec::new();
    for (outer, coords) in rings {
        let line = LineString::from(coords);
        match polygons.last_mut() {
            Some((_, holes)) if !outer => holes.push(line),
            _ => polygons.push((line, Vec::new())),
        }
    }
    MultiPolygon(
        polygons
            .into_iter()
            .map(|(exterior, holes)| Polygon::new(exterior, holes))
            .collect(),
    )
}

fn attributes(record: Record) -> Attributes {
    record
        .into_iter()
        .map(|(name, value)| (name, field_value(value)))
        .collect()
}

fn field_value(value: FieldValue) -> AttributeValue {
    match value {
        FieldValue::Character(Some(s)) | FieldValue::Memo(s) => {
            let s = s.trim();
            if s.is_empty() {
                AttributeValue::Null
            } else {
                AttributeValue::String(s.to_string())
            }
        }
        FieldValue::Numeric(Some(v)) | FieldValue::Double(v) | FieldValue::Currency(v) => {
            AttributeValue::Float(v)
        }
        FieldValue::Float(Some(v)) => AttributeValue::Float(v as f64),
        FieldValue::Integer(i) => AttributeValue::Integer(i as i64),
        FieldValue::Logical(Some(b)) => AttributeValue::Bool(b),
        _ => AttributeValue::Null,
    }
}

#[cfg(test)]
mod tests {
    use geo::Contains;

    use super::*;

    fn ring(outer: bool, pts: &[(f64, f64)]) -> Ring {
        (outer, pts.iter().map(|&(x, y)| Coord { x, y }).collect())
    }

    #[test]
    fn inner_rings_become_holes() {
        let mp = assemble_polygons(vec![
            ring(true, &[(0., 0.), (10., 0.), (10., 10.), (0., 10.), (0., 0.)]),
            ring(false, &[(4., 4.), (6., 4.), (6., 6.), (4., 6.), (4., 4.)]),
            ring(true, &[(20., 0.), (30., 0.), (30., 10.), (20., 10.), (20., 0.)]),
        ]);
        assert_eq!(mp.0.len(), 2);
        assert_eq!(mp.0[0].interiors().len(), 1);
        assert!(!mp.contains(&geo::Point::new(5.0, 5.0)));
        assert!(mp.contains(&geo::Point::new(2.0, 2.0)));
        assert!(mp.contains(&geo::Point::new(25.0, 5.0)));
    }

    #[test]
    fn dbf_values_map_to_attributes() {
        assert_eq!(
            field_value(FieldValue::Character(Some("Chile ".into()))),
            AttributeValue::String("Chile".into())
        );
        assert_eq!(field_value(FieldValue::Numeric(Some(2.5))), AttributeValue::Float(2.5));
        assert_eq!(field_value(FieldValue::Character(None)), AttributeValue::Null);
    }

    fn sovereign_table() -> shapefile::dbase::TableWriterBuilder {
        shapefile::dbase::TableWriterBuilder::new()
            .add_character_field("SOVEREIGN1".try_into().unwrap(), 50)
    }

    fn sovereign(name: &str) -> Record {
        let mut record = Record::default();
        record.insert(
            "SOVEREIGN1".to_string(),
            FieldValue::Character(Some(name.to_string())),
        );
        record
    }

    fn points(pts: &[(f64, f64)]) -> Vec<shapefile::Point> {
        pts.iter().map(|&(x, y)| shapefile::Point::new(x, y)).collect()
    }

    #[test]
    fn polygon_shapefile_loads_with_holes_and_labels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eez.shp");
        {
            let mut writer = shapefile::Writer::from_path(&path, sovereign_table()).unwrap();
            let shape = shapefile::Polygon::with_rings(vec![
                PolygonRing::Outer(points(&[(0., 0.), (0., 10.), (10., 10.), (10., 0.), (0., 0.)])),
                PolygonRing::Inner(points(&[(4., 4.), (6., 4.), (6., 6.), (4., 6.), (4., 4.)])),
                PolygonRing::Outer(points(&[(20., 0.), (20., 10.), (30., 10.), (30., 0.), (20., 0.)])),
            ]);
            writer.write_shape_and_record(&shape, &sovereign("Chile")).unwrap();
            let island = shapefile::Polygon::new(PolygonRing::Outer(points(&[
                (40., 0.),
                (40., 5.),
                (45., 5.),
                (45., 0.),
                (40., 0.),
            ])));
            writer.write_shape_and_record(&island, &sovereign("Norway")).unwrap();
        }

        let layer = PolygonLayer::load(&path).unwrap();
        assert_eq!(layer.len(), 2);

        let chile = &layer.features()[0];
        assert_eq!(chile.geometry.0.len(), 2);
        assert_eq!(chile.geometry.0[0].interiors().len(), 1);
        assert_eq!(chile.label(&["SOVEREIGN1"]).as_deref(), Some("Chile"));

        assert_eq!(layer.feature_index_at(2.0, 2.0), Some(0));
        assert_eq!(layer.feature_index_at(25.0, 5.0), Some(0));
        assert_eq!(layer.feature_index_at(5.0, 5.0), None);
        assert_eq!(layer.feature_index_at(42.0, 2.0), Some(1));
        assert_eq!(
            layer.features()[1].label(&["SOVEREIGN1"]).as_deref(),
            Some("Norway")
        );
    }

    #[test]
    fn polyline_shapefile_loads_every_part() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("range.shp");
        {
            let mut writer = shapefile::Writer::from_path(&path, sovereign_table()).unwrap();
            let limits = shapefile::Polyline::with_parts(vec![
                points(&[(-75., -40.), (-70., -45.)]),
                points(&[(-72., -50.), (-68., -52.), (-66., -54.)]),
            ]);
            writer.write_shape_and_record(&limits, &sovereign("Chile")).unwrap();
        }

        let layer = crate::vector::LineLayer::load(&path).unwrap();
        assert_eq!(layer.len(), 1);
        let parts = &layer.features[0].geometry.0;
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1].0.len(), 3);
        assert_eq!(parts[1].0[2], Coord { x: -66.0, y: -54.0 });
    }
}
