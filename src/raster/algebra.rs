//! Cell-wise raster algebra: stacks, ratios, range filters, resampling.

use super::{GridError, GridSpec, Raster};

/// Inclusive value range used to keep or drop cells.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, v: f64) -> bool {
        v >= self.min && v <= self.max
    }
}

fn ensure_stack(stack: &[Raster]) -> Result<GridSpec, GridError> {
    let first = stack.first().ok_or(GridError::EmptyStack)?;
    for r in &stack[1..] {
        first.spec.ensure_aligned(&r.spec)?;
    }
    Ok(first.spec)
}

/// Cell-wise mean across a stack of aligned rasters.
///
/// Empty cells do not contribute; a cell is empty only when it is empty in
/// every layer.
pub fn stack_mean(stack: &[Raster]) -> Result<Raster, GridError> {
    let spec = ensure_stack(stack)?;
    let cells = (0..spec.len())
        .map(|i| {
            let (sum, n) = stack
                .iter()
                .filter_map(|r| r.cells[i])
                .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
            (n > 0).then(|| sum / n as f64)
        })
        .collect();
    Ok(Raster { spec, cells })
}

/// Cell-wise sample standard deviation (n − 1) across a stack.
/// Cells with fewer than two values are empty.
pub fn stack_std(stack: &[Raster]) -> Result<Raster, GridError> {
    let spec = ensure_stack(stack)?;
    let cells = (0..spec.len())
        .map(|i| {
            let values: Vec<f64> = stack.iter().filter_map(|r| r.cells[i]).collect();
            if values.len() < 2 {
                return None;
            }
            let n = values.len() as f64;
            let mean = values.iter().sum::<f64>() / n;
            let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
            Some(var.sqrt())
        })
        .collect();
    Ok(Raster { spec, cells })
}

/// Cell-wise quotient. Empty where either input is empty or the
/// denominator is zero.
pub fn ratio(numerator: &Raster, denominator: &Raster) -> Result<Raster, GridError> {
    numerator.spec.ensure_aligned(&denominator.spec)?;
    let cells = numerator
        .cells
        .iter()
        .zip(&denominator.cells)
        .map(|(n, d)| match (n, d) {
            (Some(n), Some(d)) if *d != 0.0 => Some(n / d),
            _ => None,
        })
        .collect();
    Ok(Raster {
        spec: numerator.spec,
        cells,
    })
}

/// Empty every cell whose value falls outside the inclusive `range`.
pub fn range_filter(raster: &Raster, range: ValueRange) -> Raster {
    raster.map(|v| range.contains(v).then_some(v))
}

/// Boolean layer: 1.0 where `raster` has a value, empty elsewhere.
pub fn presence(raster: &Raster) -> Raster {
    raster.map(|_| Some(1.0))
}

/// Nearest-neighbour resampling onto `target`: every target cell takes the
/// value of the source cell containing its centre.
pub fn resample_nearest(source: &Raster, target: GridSpec) -> Raster {
    if source.spec.is_aligned(&target) {
        return source.clone();
    }
    let cells = (0..target.len())
        .map(|i| {
            let (row, col) = target.row_col(i);
            let (lon, lat) = target.cell_center(row, col);
            source.value_at(lon, lat)
        })
        .collect();
    Raster {
        spec: target,
        cells,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> GridSpec {
        GridSpec::new(0.0, 0.0, 2.0, 2.0, 1.0).unwrap()
    }

    fn raster(cells: [Option<f64>; 4]) -> Raster {
        Raster::from_cells(spec(), cells.to_vec()).unwrap()
    }

    #[test]
    fn mean_skips_empty_layers() {
        let a = raster([Some(1.0), None, Some(4.0), None]);
        let b = raster([Some(3.0), Some(5.0), None, None]);
        let m = stack_mean(&[a, b]).unwrap();
        assert_eq!(m.cells(), &[Some(2.0), Some(5.0), Some(4.0), None]);
    }

    #[test]
    fn non_overlapping_seasons_keep_source_values() {
        let mut layers = Vec::new();
        for i in 0..4 {
            let mut cells = [None; 4];
            cells[i] = Some(10.0 * (i + 1) as f64 + 0.25);
            layers.push(raster(cells));
        }
        let m = stack_mean(&layers).unwrap();
        for i in 0..4 {
            assert_eq!(m.cells()[i], layers[i].cells()[i]);
        }
    }

    #[test]
    fn std_needs_two_values() {
        let a = raster([Some(2.0), Some(1.0), None, None]);
        let b = raster([Some(4.0), None, None, None]);
        let s = stack_std(&[a, b]).unwrap();
        assert!((s.cells()[0].unwrap() - 2f64.sqrt()).abs() < 1e-12);
        assert_eq!(s.cells()[1], None);
    }

    #[test]
    fn mismatched_stack_is_an_error() {
        let other = Raster::empty(GridSpec::new(0.0, 0.0, 4.0, 2.0, 1.0).unwrap());
        assert!(stack_mean(&[raster([None; 4]), other.clone()]).is_err());
        assert!(ratio(&raster([None; 4]), &other).is_err());
        assert!(matches!(stack_mean(&[]), Err(GridError::EmptyStack)));
    }

    #[test]
    fn ratio_handles_zero_denominator() {
        let n = raster([Some(8.0), Some(1.0), None, Some(3.0)]);
        let d = raster([Some(2.0), Some(0.0), Some(1.0), None]);
        assert_eq!(ratio(&n, &d).unwrap().cells(), &[Some(4.0), None, None, None]);
    }

    #[test]
    fn range_filter_is_inclusive_and_idempotent() {
        let r = raster([Some(4.0), Some(80.0), Some(3.99), Some(80.01)]);
        let range = ValueRange::new(4.0, 80.0);
        let once = range_filter(&r, range);
        assert_eq!(once.cells(), &[Some(4.0), Some(80.0), None, None]);
        assert_eq!(range_filter(&once, range), once);
    }

    #[test]
    fn nearest_resampling_to_finer_grid() {
        let coarse = raster([Some(1.0), Some(2.0), Some(3.0), Some(4.0)]);
        let fine = GridSpec::new(0.0, 0.0, 2.0, 2.0, 0.5).unwrap();
        let r = resample_nearest(&coarse, fine);
        assert_eq!(r.spec().cols, 4);
        assert_eq!(r.get(0, 0), Some(1.0));
        assert_eq!(r.get(1, 3), Some(2.0));
        assert_eq!(r.get(3, 0), Some(3.0));
        assert_eq!(r.get(3, 3), Some(4.0));
    }
}
