//! The three analysis runs. Each is a linear sequence of load → raster
//! algebra → overlay → write steps; nothing is shared between runs except
//! the library modules.

pub mod hypoxia;
pub mod nutrients;
pub mod suitability;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{info, warn};

use crate::data::filter::{self, PointFilter};
use crate::data::model::PointSet;
use crate::raster::algebra::{stack_mean, ValueRange};
use crate::raster::rasterize::rasterize_records;
use crate::raster::{geotiff, GridSpec, Raster};

/// Rasterize every depth level of `set` inside `depths` and average the
/// levels cell-wise.
pub fn depth_mean_raster(set: &PointSet, spec: GridSpec, depths: ValueRange) -> Result<Raster> {
    let selected = filter::apply(set, &PointFilter::all().depths(depths.min, depths.max));
    let levels: Vec<Raster> = filter::split_by_depth(&selected)
        .into_iter()
        .map(|(_, records)| rasterize_records(spec, records))
        .collect();
    if levels.is_empty() {
        warn!(
            "no records between {} and {} m, layer is empty",
            depths.min, depths.max
        );
        return Ok(Raster::empty(spec));
    }
    Ok(stack_mean(&levels)?)
}

/// Create the output directory if needed.
pub fn prepare_out_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating output directory {}", dir.display()))
}

/// Write `raster` as `<dir>/<name>.tif` and log its summary.
pub fn write_layer(raster: &Raster, dir: &Path, name: &str) -> Result<PathBuf> {
    let path = dir.join(format!("{name}.tif"));
    geotiff::write(raster, &path).with_context(|| format!("writing {}", path.display()))?;
    info!("{name}: {}", raster.stats());
    Ok(path)
}

/// Read a GeoTIFF with the path in the error context.
pub fn read_layer(path: &Path) -> Result<Raster> {
    let raster = geotiff::read(path).with_context(|| format!("reading {}", path.display()))?;
    info!("{}: {}", path.display(), raster.stats());
    Ok(raster)
}

/// Shared ramp range over several rasters (populated cells only).
pub fn value_range<'a, I>(rasters: I) -> Option<(f64, f64)>
where
    I: IntoIterator<Item = &'a Raster>,
{
    rasters
        .into_iter()
        .map(Raster::stats)
        .filter_map(|s| Some((s.min?, s.max?)))
        .reduce(|(a0, a1), (b0, b1)| (a0.min(b0), a1.max(b1)))
}
