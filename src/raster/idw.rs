//! Inverse-distance-weighted gap filling.
//!
//! Each empty cell is estimated from the `neighbors` nearest populated cells,
//! weighted by `1 / d^power`, with distances measured between cell centres in
//! degrees. Neighbours are found by scanning square rings of growing radius
//! around the target cell, so cost scales with the size of the gaps rather
//! than the size of the grid. Longitude does not wrap at the antimeridian.

use log::debug;
use serde::{Deserialize, Serialize};

use super::{GridError, Raster};

/// IDW model parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdwParams {
    pub power: f64,
    pub neighbors: usize,
}

impl Default for IdwParams {
    fn default() -> Self {
        Self {
            power: 2.0,
            neighbors: 8,
        }
    }
}

/// Fill empty cells of `raster` by IDW, then restrict the result to `domain`
/// (cells where `domain` has a value) when one is given.
///
/// Populated cells keep their values. With no populated cells the raster is
/// returned unchanged apart from the domain mask.
pub fn gap_fill(
    raster: &Raster,
    params: IdwParams,
    domain: Option<&Raster>,
) -> Result<Raster, GridError> {
    if let Some(d) = domain {
        raster.spec.ensure_aligned(&d.spec)?;
    }
    let spec = raster.spec;
    let k = params.neighbors.max(1);
    let in_domain = |i: usize| domain.map(|d| d.cells[i].is_some()).unwrap_or(true);

    let mut cells = raster.cells.clone();
    let known = raster.valid_count();
    let mut filled = 0usize;

    if known > 0 {
        for (i, cell) in cells.iter_mut().enumerate() {
            if cell.is_some() || !in_domain(i) {
                continue;
            }
            let (row, col) = spec.row_col(i);
            let (nearest, _) = nearest_known(raster, row, col, k, known);

            let (num, den) = nearest.iter().fold((0.0, 0.0), |(num, den), (d, v)| {
                let w = 1.0 / d.powf(params.power);
                (num + w * v, den + w)
            });
            if den > 0.0 {
                *cell = Some(num / den);
                filled += 1;
            }
        }
    }
    debug!("idw: filled {filled} cells from {known} known (k = {k}, p = {})", params.power);

    let mut out = Raster { spec, cells };
    if let Some(d) = domain {
        out = super::mask::mask_by_raster(&out, d)?;
    }
    Ok(out)
}

/// Up to `k` populated cells nearest to (row, col) as (distance, value),
/// ascending, plus the number of rings scanned.
///
/// The scan stops once the k-th distance is closer than the next ring can
/// reach, or once all `known` populated cells have been seen.
fn nearest_known(
    raster: &Raster,
    row: usize,
    col: usize,
    k: usize,
    known: usize,
) -> (Vec<(f64, f64)>, usize) {
    let spec = raster.spec;
    let max_radius = spec.rows.max(spec.cols);
    let min_step = spec.cell_width.min(spec.cell_height);
    let mut nearest: Vec<(f64, f64)> = Vec::with_capacity(k + 1);
    let mut seen = 0usize;
    let mut scanned = 0usize;

    for radius in 1..=max_radius {
        if seen == known || (nearest.len() == k && radius as f64 * min_step >= nearest[k - 1].0) {
            break;
        }
        scanned = radius;
        for (r, c) in ring(row, col, radius, spec.rows, spec.cols) {
            let Some(v) = raster.get(r, c) else {
                continue;
            };
            seen += 1;
            let dx = (c as f64 - col as f64) * spec.cell_width;
            let dy = (r as f64 - row as f64) * spec.cell_height;
            let d = (dx * dx + dy * dy).sqrt();
            let pos = nearest.partition_point(|(nd, _)| *nd <= d);
            if pos < k {
                nearest.insert(pos, (d, v));
                nearest.truncate(k);
            }
        }
    }
    (nearest, scanned)
}

/// Cells at Chebyshev distance exactly `radius` from (row, col), clipped to
/// the grid.
fn ring(
    row: usize,
    col: usize,
    radius: usize,
    rows: usize,
    cols: usize,
) -> impl Iterator<Item = (usize, usize)> {
    let (row, col, radius) = (row as isize, col as isize, radius as isize);
    let (rows, cols) = (rows as isize, cols as isize);
    (-radius..=radius)
        .flat_map(move |dr| {
            let edge = dr.abs() == radius;
            let dcs: Vec<isize> = if edge {
                (-radius..=radius).collect()
            } else {
                vec![-radius, radius]
            };
            dcs.into_iter().map(move |dc| (row + dr, col + dc))
        })
        .filter(move |&(r, c)| r >= 0 && c >= 0 && r < rows && c < cols)
        .map(|(r, c)| (r as usize, c as usize))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::GridSpec;

    fn spec(cols: usize, rows: usize) -> GridSpec {
        GridSpec::from_origin(0.0, rows as f64, 1.0, 1.0, cols, rows).unwrap()
    }

    #[test]
    fn ring_sizes() {
        assert_eq!(ring(5, 5, 1, 10, 10).count(), 8);
        assert_eq!(ring(5, 5, 2, 10, 10).count(), 16);
        assert_eq!(ring(0, 0, 1, 10, 10).count(), 3);
    }

    #[test]
    fn single_gap_between_equal_neighbours() {
        let s = spec(3, 1);
        let r = Raster::from_cells(s, vec![Some(2.0), None, Some(4.0)]).unwrap();
        let out = gap_fill(&r, IdwParams::default(), None).unwrap();
        assert_eq!(out.cells(), &[Some(2.0), Some(3.0), Some(4.0)]);
    }

    #[test]
    fn closer_neighbours_weigh_more() {
        let s = spec(4, 1);
        let r = Raster::from_cells(s, vec![Some(0.0), None, None, Some(9.0)]).unwrap();
        let params = IdwParams {
            power: 2.0,
            neighbors: 2,
        };
        let out = gap_fill(&r, params, None).unwrap();
        // cell 1: d = 1 to 0.0, d = 2 to 9.0 → (0*1 + 9/4) / (1 + 1/4) = 1.8
        assert!((out.get(0, 1).unwrap() - 1.8).abs() < 1e-12);
        assert!((out.get(0, 2).unwrap() - 7.2).abs() < 1e-12);
    }

    #[test]
    fn neighbour_count_limits_contributors() {
        let s = spec(5, 1);
        let r = Raster::from_cells(s, vec![Some(1.0), Some(1.0), None, Some(1.0), Some(100.0)])
            .unwrap();
        let params = IdwParams {
            power: 1.0,
            neighbors: 2,
        };
        assert_eq!(gap_fill(&r, params, None).unwrap().get(0, 2), Some(1.0));
    }

    #[test]
    fn domain_mask_blocks_extrapolation() {
        let s = spec(3, 1);
        let r = Raster::from_cells(s, vec![Some(2.0), None, None]).unwrap();
        let domain = Raster::from_cells(s, vec![Some(1.0), Some(1.0), None]).unwrap();
        let out = gap_fill(&r, IdwParams::default(), Some(&domain)).unwrap();
        assert_eq!(out.cells(), &[Some(2.0), Some(2.0), None]);
    }

    #[test]
    fn known_cells_are_untouched() {
        let s = spec(3, 3);
        let mut cells = vec![None; 9];
        cells[0] = Some(5.0);
        cells[8] = Some(-1.0);
        let r = Raster::from_cells(s, cells).unwrap();
        let out = gap_fill(&r, IdwParams::default(), None).unwrap();
        assert_eq!(out.get(0, 0), Some(5.0));
        assert_eq!(out.get(2, 2), Some(-1.0));
        assert_eq!(out.valid_count(), 9);
        assert!((out.get(1, 1).unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn search_stops_after_the_last_known_cell() {
        let s = spec(60, 60);
        let mut cells = vec![None; 3600];
        cells[s.index(0, 0)] = Some(1.0);
        cells[s.index(0, 3)] = Some(4.0);
        let r = Raster::from_cells(s, cells).unwrap();

        // more neighbours asked for than exist: both are found by ring 2
        let (nearest, scanned) = nearest_known(&r, 0, 1, 8, 2);
        assert_eq!(nearest, vec![(1.0, 1.0), (2.0, 4.0)]);
        assert_eq!(scanned, 2);

        let params = IdwParams {
            power: 1.0,
            neighbors: 8,
        };
        let out = gap_fill(&r, params, None).unwrap();
        assert_eq!(out.valid_count(), 3600);
        // d = 1 to 1.0, d = 2 to 4.0 → (1 + 4/2) / (1 + 1/2) = 2
        assert!((out.get(0, 1).unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn all_empty_stays_empty() {
        let r = Raster::empty(spec(2, 2));
        assert_eq!(gap_fill(&r, IdwParams::default(), None).unwrap().valid_count(), 0);
    }
}
