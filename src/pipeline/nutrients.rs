//! Seasonal nutrient maps: one depth-averaged layer per season, the mean
//! across seasons, and the between-season standard deviation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use log::info;

use super::{depth_mean_raster, prepare_out_dir, value_range, write_layer};
use crate::color::ColorRamp;
use crate::config::PipelineConfig;
use crate::data::filter::{self, PointFilter};
use crate::data::loader::load_points;
use crate::data::model::{PointSet, Season};
use crate::raster::algebra::{stack_mean, stack_std};
use crate::raster::Raster;
use crate::render::{save_panel, Map, Mark};

/// One nutrient table. With no season tag the table's own `season` column
/// decides which season each record belongs to.
#[derive(Debug, Clone)]
pub struct SeasonInput {
    pub season: Option<Season>,
    pub path: PathBuf,
}

impl SeasonInput {
    /// Parse `SEASON=PATH`, or a bare path. A bare atlas file name carries
    /// its season code (e.g. `woa_all_n14_01.csv` → spring); any other bare
    /// path is a table with a season column.
    pub fn parse(arg: &str) -> Result<Self> {
        if let Some((season, path)) = arg.split_once('=') {
            return Ok(Self {
                season: Some(season.parse()?),
                path: PathBuf::from(path),
            });
        }
        let path = PathBuf::from(arg);
        Ok(Self {
            season: season_from_file_name(&path),
            path,
        })
    }
}

/// First two-digit number in the file stem that is an atlas season code.
pub fn season_from_file_name(path: &Path) -> Option<Season> {
    let stem = path.file_stem()?.to_str()?;
    stem.split(|c: char| !c.is_ascii_digit())
        .filter(|tok| tok.len() == 2)
        .filter_map(|tok| tok.parse::<u8>().ok())
        .find_map(Season::from_atlas_code)
}

/// Records of every input grouped by season.
///
/// Tagged inputs belong wholly to their season; untagged ones are split by
/// their season column. A season supplied by two inputs is an error.
fn seasonal_sets(inputs: &[SeasonInput]) -> Result<BTreeMap<Season, PointSet>> {
    let mut sets = BTreeMap::new();
    for input in inputs {
        let set = load_points(&input.path)?;
        let parts: Vec<(Season, PointSet)> = match input.season {
            Some(season) => vec![(season, set.with_season(season))],
            None => {
                if set.seasons.is_empty() {
                    bail!(
                        "{}: no season code in the file name and no season column, use SEASON=PATH",
                        input.path.display()
                    );
                }
                set.seasons
                    .iter()
                    .map(|&s| (s, filter::apply(&set, &PointFilter::all().season(s))))
                    .collect()
            }
        };
        for (season, part) in parts {
            info!("{season}: {} records from {}", part.len(), input.path.display());
            if sets.insert(season, part).is_some() {
                bail!("{season} is supplied more than once");
            }
        }
    }
    Ok(sets)
}

/// Outputs of a seasonal run.
#[derive(Debug)]
pub struct NutrientReport {
    pub seasonal: Vec<(Season, Raster)>,
    pub mean: Raster,
    pub std_dev: Raster,
    pub files: Vec<PathBuf>,
}

/// Run the seasonal nutrient pipeline for one variable (e.g. `nitrate`).
pub fn run(
    config: &PipelineConfig,
    variable: &str,
    inputs: &[SeasonInput],
    out_dir: &Path,
) -> Result<NutrientReport> {
    if inputs.is_empty() {
        bail!("no seasonal inputs given for {variable}");
    }
    prepare_out_dir(out_dir)?;
    let spec = config.grid_spec()?;
    let mut files = Vec::new();

    let mut seasonal: Vec<(Season, Raster)> = Vec::new();
    for (season, set) in seasonal_sets(inputs)? {
        let layer = depth_mean_raster(&set, spec, config.nutrient_depth)
            .with_context(|| format!("rasterizing {season} {variable}"))?;
        files.push(write_layer(&layer, out_dir, &format!("{variable}_{season}"))?);
        seasonal.push((season, layer));
    }

    let layers: Vec<Raster> = seasonal.iter().map(|(_, r)| r.clone()).collect();
    let mean = stack_mean(&layers)?;
    let std_dev = stack_std(&layers)?;
    files.push(write_layer(&mean, out_dir, &format!("{variable}_seasonal_mean"))?);
    files.push(write_layer(&std_dev, out_dir, &format!("{variable}_seasonal_sd"))?);

    files.extend(render(config, variable, &seasonal, &std_dev, out_dir)?);

    info!("{variable}: wrote {} files to {}", files.len(), out_dir.display());
    Ok(NutrientReport {
        seasonal,
        mean,
        std_dev,
        files,
    })
}

/// Seasonal panel on a shared scale, and the standard-deviation map.
fn render(
    config: &PipelineConfig,
    variable: &str,
    seasonal: &[(Season, Raster)],
    std_dev: &Raster,
    out_dir: &Path,
) -> Result<Vec<PathBuf>> {
    let spec = *std_dev.spec();
    let ramp = ColorRamp::for_range(&config.render.ramp, value_range(seasonal.iter().map(|(_, r)| r)))?;
    let panels: Vec<Map> = seasonal
        .iter()
        .map(|(season, layer)| {
            let mut map = Map::new(format!("{variable}, {season}"), spec, &config.render);
            map.raster(layer, &ramp)
                .legend(variable, Mark::Swatch, ramp.legend_entries(5));
            map
        })
        .collect();
    let panel = save_panel(&panels, 2, &out_dir.join(format!("{variable}_seasons.png")))?;

    let sd_ramp = ColorRamp::for_range(&config.render.sd_ramp, value_range([std_dev]))?;
    let mut sd_map = Map::new(format!("{variable}, between-season sd"), spec, &config.render);
    sd_map
        .raster(std_dev, &sd_ramp)
        .legend("sd", Mark::Swatch, sd_ramp.legend_entries(5));
    let sd = sd_map.save(&out_dir.join(format!("{variable}_seasonal_sd.png")))?;
    Ok(vec![panel, sd])
}
