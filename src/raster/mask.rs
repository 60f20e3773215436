//! Restricting rasters and points to polygon boundaries or another raster.

use super::{GridError, Raster};
use crate::vector::PolygonLayer;

/// Keep cells whose centre lies inside any polygon of `layer`; all other
/// cells become empty.
pub fn mask_by_polygons(raster: &Raster, layer: &PolygonLayer) -> Raster {
    let spec = raster.spec;
    let cells = raster
        .cells
        .iter()
        .enumerate()
        .map(|(i, cell)| {
            let value = (*cell)?;
            let (row, col) = spec.row_col(i);
            let (lon, lat) = spec.cell_center(row, col);
            layer.contains(lon, lat).then_some(value)
        })
        .collect();
    Raster { spec, cells }
}

/// Keep cells where `mask` has a value.
pub fn mask_by_raster(raster: &Raster, mask: &Raster) -> Result<Raster, GridError> {
    raster.spec.ensure_aligned(&mask.spec)?;
    let cells = raster
        .cells
        .iter()
        .zip(&mask.cells)
        .map(|(v, m)| m.and(*v))
        .collect();
    Ok(Raster {
        spec: raster.spec,
        cells,
    })
}

/// Per-cell index of the polygon feature containing the cell centre.
///
/// Computed once and reused when several rasters are summarised by the same
/// boundary layer.
pub fn zone_index(raster: &Raster, layer: &PolygonLayer) -> Vec<Option<usize>> {
    let spec = raster.spec;
    (0..spec.len())
        .map(|i| {
            let (row, col) = spec.row_col(i);
            let (lon, lat) = spec.cell_center(row, col);
            layer.feature_index_at(lon, lat)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::GridSpec;
    use crate::vector::tests::square;

    fn global_filled() -> Raster {
        Raster::filled(GridSpec::new(-10.0, -10.0, 10.0, 10.0, 1.0).unwrap(), 1.0)
    }

    #[test]
    fn polygon_mask_drops_outside_cells() {
        let layer = PolygonLayer::from_features(vec![square("A", 0.0, 0.0, 5.0, 5.0)]);
        let masked = mask_by_polygons(&global_filled(), &layer);
        assert_eq!(masked.valid_count(), 25);
        assert_eq!(masked.value_at(2.5, 2.5), Some(1.0));
        assert_eq!(masked.value_at(-2.5, 2.5), None);
    }

    #[test]
    fn polygon_mask_is_idempotent() {
        let layer = PolygonLayer::from_features(vec![
            square("A", 0.0, 0.0, 5.0, 5.0),
            square("B", -8.0, -8.0, -3.0, 1.0),
        ]);
        let once = mask_by_polygons(&global_filled(), &layer);
        let twice = mask_by_polygons(&once, &layer);
        assert_eq!(once, twice);
    }

    #[test]
    fn raster_mask_keeps_present_cells() {
        let spec = GridSpec::new(0.0, 0.0, 2.0, 1.0, 1.0).unwrap();
        let data = Raster::from_cells(spec, vec![Some(3.0), Some(4.0)]).unwrap();
        let mask = Raster::from_cells(spec, vec![None, Some(0.0)]).unwrap();
        assert_eq!(mask_by_raster(&data, &mask).unwrap().cells(), &[None, Some(4.0)]);
    }

    #[test]
    fn zones() {
        let layer = PolygonLayer::from_features(vec![
            square("A", 0.0, 0.0, 5.0, 5.0),
            square("B", -5.0, -5.0, 0.0, 0.0),
        ]);
        let zones = zone_index(&global_filled(), &layer);
        assert_eq!(zones.iter().filter(|z| **z == Some(0)).count(), 25);
        assert_eq!(zones.iter().filter(|z| **z == Some(1)).count(), 25);
        assert_eq!(zones.iter().filter(|z| z.is_none()).count(), 400 - 50);
    }
}
