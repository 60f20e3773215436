//! Seaweed suitability: N:P ratio within range, inside an EEZ, and with a
//! sea-surface temperature within range.
//!
//! ```text
//!  nitrate ─┐
//!           ├─ ratio ─ range ─ EEZ mask ─ SST mask ─► feasible
//!  phosphate┘                              ▲
//!                         SST ─ resample ─ range
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::info;

use super::{depth_mean_raster, prepare_out_dir, read_layer, value_range, write_layer};
use crate::color::{ColorRamp, Color, HIGHLIGHT_RED, LAND_GREY, OUTLINE_DARK};
use crate::config::{PipelineConfig, Thresholds};
use crate::data::loader::{load_points, load_production};
use crate::raster::algebra::{range_filter, ratio, resample_nearest};
use crate::raster::mask::{mask_by_polygons, mask_by_raster};
use crate::raster::{GridError, Raster};
use crate::render::{Map, Mark};
use crate::stats::{country_key, farming_countries, feasible_countries, write_csv, FeasibleCountry};
use crate::vector::{LineLayer, PolygonLayer};

const NATIVE_RANGE_BLUE: Color = image::Rgba([31, 95, 191, 255]);
const OFFSET_FILL: Color = image::Rgba([255, 140, 0, 110]);
const EEZ_OUTLINE: Color = image::Rgba([150, 150, 150, 255]);

/// Input files of a suitability run.
#[derive(Debug, Clone)]
pub struct SuitabilityInputs {
    pub nitrate: PathBuf,
    pub phosphate: PathBuf,
    pub eez: PathBuf,
    pub sst: PathBuf,
    pub production: Option<PathBuf>,
    pub land: Option<PathBuf>,
    pub native_range: Option<PathBuf>,
    pub offsets: Option<PathBuf>,
}

#[derive(Debug)]
pub struct SuitabilityReport {
    pub ratio: Raster,
    pub feasible: Raster,
    pub countries: Vec<FeasibleCountry>,
    pub files: Vec<PathBuf>,
}

/// Combine a ratio layer and an SST layer on the same grid into the
/// feasibility layer: ratio values kept where the ratio is within range,
/// the cell centre lies inside an EEZ, and the SST is within range.
pub fn feasibility(
    np_ratio: &Raster,
    sst: &Raster,
    eez: &PolygonLayer,
    thresholds: &Thresholds,
) -> Result<Raster, GridError> {
    let in_range = range_filter(np_ratio, thresholds.np_ratio);
    let in_eez = mask_by_polygons(&in_range, eez);
    let sst_ok = range_filter(sst, thresholds.sst);
    mask_by_raster(&in_eez, &sst_ok)
}

pub fn run(
    config: &PipelineConfig,
    inputs: &SuitabilityInputs,
    out_dir: &Path,
) -> Result<SuitabilityReport> {
    prepare_out_dir(out_dir)?;
    let spec = config.grid_spec()?;
    let mut files = Vec::new();

    info!("rasterizing nitrate and phosphate");
    let nitrate = depth_mean_raster(&load_points(&inputs.nitrate)?, spec, config.suitability_depth)?;
    let phosphate =
        depth_mean_raster(&load_points(&inputs.phosphate)?, spec, config.suitability_depth)?;
    let np = ratio(&nitrate, &phosphate)?;
    files.push(write_layer(&np, out_dir, "np_ratio")?);

    info!("loading EEZ boundaries and SST");
    let eez = PolygonLayer::load(&inputs.eez)
        .with_context(|| format!("loading EEZ layer {}", inputs.eez.display()))?;
    let sst = resample_nearest(&read_layer(&inputs.sst)?, spec);
    files.push(write_layer(&sst, out_dir, "sst_resampled")?);

    let feasible = feasibility(&np, &sst, &eez, &config.thresholds)?;
    files.push(write_layer(&feasible, out_dir, "feasible")?);

    let farming: BTreeSet<String> = match &inputs.production {
        Some(path) => farming_countries(&load_production(path)?, config.recent_years),
        None => BTreeSet::new(),
    };
    info!("{} countries currently farm seaweed", farming.len());

    let countries = feasible_countries(&feasible, &eez, &config.country_fields, &farming);
    let table = out_dir.join("feasible_countries.csv");
    write_csv(&countries, &table)?;
    files.push(table);
    info!("{} countries with suitable cells", countries.len());

    files.push(render(config, inputs, &eez, &feasible, &farming, out_dir)?);

    Ok(SuitabilityReport {
        ratio: np,
        feasible,
        countries,
        files,
    })
}

/// Composite map: land, EEZ outlines (farming countries highlighted),
/// feasible cells, native range lines and offset scenario polygons.
fn render(
    config: &PipelineConfig,
    inputs: &SuitabilityInputs,
    eez: &PolygonLayer,
    feasible: &Raster,
    farming: &BTreeSet<String>,
    out_dir: &Path,
) -> Result<PathBuf> {
    let fields: Vec<&str> = config.country_fields.iter().map(String::as_str).collect();
    let land = inputs.land.as_deref().map(PolygonLayer::load).transpose()?;
    let native_range = inputs.native_range.as_deref().map(LineLayer::load).transpose()?;
    let offsets = inputs.offsets.as_deref().map(PolygonLayer::load).transpose()?;
    let farming_eez = eez.filter(|f| {
        f.label(&fields)
            .map(|name| farming.contains(&country_key(&name)))
            .unwrap_or(false)
    });
    let ramp = ColorRamp::for_range("greens", value_range([feasible]))?;

    let mut map = Map::new("Feasible seaweed farming areas", *feasible.spec(), &config.render);
    if let Some(land) = &land {
        map.fill_polygons(land, LAND_GREY);
    }
    map.raster(feasible, &ramp)
        .legend("N:P ratio (feasible)", Mark::Swatch, ramp.legend_entries(5))
        .polygon_outlines(eez, EEZ_OUTLINE)
        .polygon_outlines(&farming_eez, HIGHLIGHT_RED)
        .legend(
            "boundaries",
            Mark::Line,
            vec![
                ("EEZ".to_string(), EEZ_OUTLINE),
                ("farming country EEZ".to_string(), HIGHLIGHT_RED),
            ],
        );
    if let Some(lines) = &native_range {
        map.lines(lines, NATIVE_RANGE_BLUE, 2)
            .legend("species", Mark::Line, vec![("native range".to_string(), NATIVE_RANGE_BLUE)]);
    }
    if let Some(offsets) = &offsets {
        map.fill_polygons(offsets, OFFSET_FILL)
            .polygon_outlines(offsets, OUTLINE_DARK)
            .legend("scenario", Mark::Swatch, vec![("offset area".to_string(), OFFSET_FILL)]);
    }

    map.save(&out_dir.join("suitability.png"))
}
