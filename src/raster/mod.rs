//! Gridded raster layer: a regular lon/lat lattice with one optional scalar
//! per cell.
//!
//! ```text
//!   points ──► rasterize ──► Raster ──► algebra / mask / idw ──► Raster
//!                               │                                  │
//!                               └────────── geotiff (read/write) ◄─┘
//! ```
//!
//! Rows run north → south, columns west → east, matching GeoTIFF pixel order.

pub mod algebra;
pub mod geotiff;
pub mod idw;
pub mod mask;
pub mod rasterize;

use std::fmt;

use thiserror::Error;

/// Tolerance used when comparing grid geometry between rasters.
const GRID_EPS: f64 = 1e-9;

/// Error type for grid construction and cell-wise operations.
#[derive(Debug, Error)]
pub enum GridError {
    #[error("invalid grid extent: {0}")]
    InvalidExtent(String),

    #[error("invalid resolution {0}: must be positive and finite")]
    InvalidResolution(f64),

    #[error("grid mismatch: {left} vs {right}")]
    Mismatch { left: String, right: String },

    #[error("cell buffer has {got} values, grid needs {expected}")]
    CellCount { expected: usize, got: usize },

    #[error("raster stack is empty")]
    EmptyStack,
}

// ---------------------------------------------------------------------------
// GridSpec – extent + resolution
// ---------------------------------------------------------------------------

/// Geometry of a raster: north-west origin, cell size and shape, WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSpec {
    pub west: f64,
    pub north: f64,
    pub cell_width: f64,
    pub cell_height: f64,
    pub cols: usize,
    pub rows: usize,
}

impl GridSpec {
    /// Build a grid covering `[west, east] × [south, north]` with square cells.
    ///
    /// The extent must be a whole number of cells wide and tall (within a
    /// small tolerance); the atlas grids always are.
    pub fn new(
        west: f64,
        south: f64,
        east: f64,
        north: f64,
        resolution: f64,
    ) -> Result<Self, GridError> {
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(GridError::InvalidResolution(resolution));
        }
        if !(east > west && north > south) {
            return Err(GridError::InvalidExtent(format!(
                "west {west}, south {south}, east {east}, north {north}"
            )));
        }
        let cols_f = (east - west) / resolution;
        let rows_f = (north - south) / resolution;
        if (cols_f - cols_f.round()).abs() > 1e-6 || (rows_f - rows_f.round()).abs() > 1e-6 {
            return Err(GridError::InvalidExtent(format!(
                "extent is not a multiple of resolution {resolution}"
            )));
        }
        Ok(Self {
            west,
            north,
            cell_width: resolution,
            cell_height: resolution,
            cols: cols_f.round() as usize,
            rows: rows_f.round() as usize,
        })
    }

    /// Build a grid from its north-west corner, cell size and shape.
    pub fn from_origin(
        west: f64,
        north: f64,
        cell_width: f64,
        cell_height: f64,
        cols: usize,
        rows: usize,
    ) -> Result<Self, GridError> {
        for res in [cell_width, cell_height] {
            if !(res.is_finite() && res > 0.0) {
                return Err(GridError::InvalidResolution(res));
            }
        }
        if cols == 0 || rows == 0 {
            return Err(GridError::InvalidExtent(format!("{cols}x{rows} cells")));
        }
        Ok(Self {
            west,
            north,
            cell_width,
            cell_height,
            cols,
            rows,
        })
    }

    /// Whole-globe grid at the given resolution.
    pub fn global(resolution: f64) -> Result<Self, GridError> {
        Self::new(-180.0, -90.0, 180.0, 90.0, resolution)
    }

    pub fn east(&self) -> f64 {
        self.west + self.cols as f64 * self.cell_width
    }

    pub fn south(&self) -> f64 {
        self.north - self.rows as f64 * self.cell_height
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.cols * self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flat index of a (row, col) pair.
    pub fn index(&self, row: usize, col: usize) -> usize {
        row * self.cols + col
    }

    /// (row, col) of a flat index.
    pub fn row_col(&self, index: usize) -> (usize, usize) {
        (index / self.cols, index % self.cols)
    }

    /// Centre of a cell as `(lon, lat)`.
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.west + (col as f64 + 0.5) * self.cell_width,
            self.north - (row as f64 + 0.5) * self.cell_height,
        )
    }

    /// Whether a coordinate lies within the closed extent.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.west && lon <= self.east() && lat >= self.south() && lat <= self.north
    }

    /// Cell holding a coordinate.
    ///
    /// Cells are half-open towards the east and south; a point exactly on the
    /// outer east or south edge belongs to the last column / row. Points
    /// outside the extent (or non-finite) map to `None`.
    pub fn locate(&self, lon: f64, lat: f64) -> Option<(usize, usize)> {
        if !lon.is_finite() || !lat.is_finite() || !self.contains(lon, lat) {
            return None;
        }
        let col = (((lon - self.west) / self.cell_width).floor() as usize).min(self.cols - 1);
        let row = (((self.north - lat) / self.cell_height).floor() as usize).min(self.rows - 1);
        Some((row, col))
    }

    /// Whether two grids describe the same lattice.
    pub fn is_aligned(&self, other: &GridSpec) -> bool {
        self.cols == other.cols
            && self.rows == other.rows
            && (self.west - other.west).abs() < GRID_EPS
            && (self.north - other.north).abs() < GRID_EPS
            && (self.cell_width - other.cell_width).abs() < GRID_EPS
            && (self.cell_height - other.cell_height).abs() < GRID_EPS
    }

    /// Error unless `other` is the same lattice.
    pub fn ensure_aligned(&self, other: &GridSpec) -> Result<(), GridError> {
        if self.is_aligned(other) {
            Ok(())
        } else {
            Err(GridError::Mismatch {
                left: self.to_string(),
                right: other.to_string(),
            })
        }
    }
}

impl fmt::Display for GridSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} cells of {}°x{}° from ({}, {})",
            self.cols, self.rows, self.cell_width, self.cell_height, self.west, self.north
        )
    }
}

// ---------------------------------------------------------------------------
// Raster
// ---------------------------------------------------------------------------

/// A single-band raster. `None` marks an empty cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    spec: GridSpec,
    cells: Vec<Option<f64>>,
}

impl Raster {
    /// Raster with every cell empty.
    pub fn empty(spec: GridSpec) -> Self {
        Self {
            cells: vec![None; spec.len()],
            spec,
        }
    }

    /// Raster with every cell set to `value`.
    pub fn filled(spec: GridSpec, value: f64) -> Self {
        Self {
            cells: vec![Some(value); spec.len()],
            spec,
        }
    }

    /// Wrap a row-major cell buffer.
    pub fn from_cells(spec: GridSpec, cells: Vec<Option<f64>>) -> Result<Self, GridError> {
        if cells.len() != spec.len() {
            return Err(GridError::CellCount {
                expected: spec.len(),
                got: cells.len(),
            });
        }
        Ok(Self { spec, cells })
    }

    pub fn spec(&self) -> &GridSpec {
        &self.spec
    }

    pub fn cells(&self) -> &[Option<f64>] {
        &self.cells
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        self.cells[self.spec.index(row, col)]
    }

    pub fn set(&mut self, row: usize, col: usize, value: Option<f64>) {
        let idx = self.spec.index(row, col);
        self.cells[idx] = value;
    }

    /// Value of the cell containing a coordinate.
    pub fn value_at(&self, lon: f64, lat: f64) -> Option<f64> {
        let (row, col) = self.spec.locate(lon, lat)?;
        self.get(row, col)
    }

    /// Apply `f` to every non-empty cell; `f` may empty the cell.
    pub fn map<F>(&self, mut f: F) -> Raster
    where
        F: FnMut(f64) -> Option<f64>,
    {
        Raster {
            spec: self.spec,
            cells: self.cells.iter().map(|c| c.and_then(&mut f)).collect(),
        }
    }

    /// Number of non-empty cells.
    pub fn valid_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    /// Iterate `(row, col, value)` over non-empty cells.
    pub fn iter_valid(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.cells.iter().enumerate().filter_map(move |(i, c)| {
            let (row, col) = self.spec.row_col(i);
            c.map(|v| (row, col, v))
        })
    }

    pub fn stats(&self) -> RasterStats {
        let mut valid = 0usize;
        let mut sum = 0.0f64;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for v in self.cells.iter().flatten() {
            valid += 1;
            sum += v;
            min = min.min(*v);
            max = max.max(*v);
        }
        RasterStats {
            cols: self.spec.cols,
            rows: self.spec.rows,
            valid,
            empty: self.cells.len() - valid,
            min: (valid > 0).then_some(min),
            max: (valid > 0).then_some(max),
            mean: (valid > 0).then(|| sum / valid as f64),
        }
    }
}

/// Summary of a raster's populated cells.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterStats {
    pub cols: usize,
    pub rows: usize,
    pub valid: usize,
    pub empty: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
}

impl fmt::Display for RasterStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}, {} valid / {} empty", self.cols, self.rows, self.valid, self.empty)?;
        if let (Some(min), Some(max), Some(mean)) = (self.min, self.max, self.mean) {
            write!(f, ", range [{min:.3}, {max:.3}], mean {mean:.3}")?;
        }
        Ok(())
    }
}
