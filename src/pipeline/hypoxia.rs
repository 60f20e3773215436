//! Eutrophication / hypoxia sites against ocean acidification.
//!
//! The aragonite saturation layer is gap-filled by IDW inside the ocean
//! domain, cells within the acidified range are kept, and sites are joined
//! to country boundaries for per-country counts.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::info;

use super::{prepare_out_dir, read_layer, write_layer};
use crate::color::{ColorMap, ColorRamp, HIGHLIGHT_RED, LAND_GREY, OUTLINE_DARK};
use crate::config::PipelineConfig;
use crate::data::loader::load_sites;
use crate::data::model::{SiteCondition, SiteRecord};
use crate::raster::algebra::{presence, range_filter, resample_nearest};
use crate::raster::idw::gap_fill;
use crate::raster::Raster;
use crate::render::{Map, Mark};
use crate::stats::{condition_counts, write_csv, ConditionCount};
use crate::vector::PolygonLayer;

#[derive(Debug, Clone)]
pub struct HypoxiaInputs {
    pub sites: PathBuf,
    pub aragonite: PathBuf,
    pub countries: PathBuf,
    /// Raster whose populated cells define the ocean domain for gap filling.
    pub domain: PathBuf,
}

#[derive(Debug)]
pub struct HypoxiaReport {
    pub filled: Raster,
    pub acidified: Raster,
    pub counts: Vec<ConditionCount>,
    pub files: Vec<PathBuf>,
}

pub fn run(config: &PipelineConfig, inputs: &HypoxiaInputs, out_dir: &Path) -> Result<HypoxiaReport> {
    prepare_out_dir(out_dir)?;
    let mut files = Vec::new();

    let sites = load_sites(&inputs.sites)?;
    info!("{} sites loaded", sites.len());
    let countries = PolygonLayer::load(&inputs.countries)
        .with_context(|| format!("loading country layer {}", inputs.countries.display()))?;

    let aragonite = read_layer(&inputs.aragonite)?;
    let domain = presence(&resample_nearest(&read_layer(&inputs.domain)?, *aragonite.spec()));
    info!("ocean domain: {} cells", domain.valid_count());

    let filled = gap_fill(&aragonite, config.idw, Some(&domain))?;
    files.push(write_layer(&filled, out_dir, "aragonite_filled")?);

    let acidified = range_filter(&filled, config.thresholds.aragonite);
    files.push(write_layer(&acidified, out_dir, "aragonite_acidified")?);

    let counts = condition_counts(&sites, &countries, &config.country_fields, Some(&acidified));
    let table = out_dir.join("condition_counts.csv");
    write_csv(&counts, &table)?;
    files.push(table);
    info!("{} countries with sites or acidified cells", counts.len());

    files.push(render(config, &sites, &countries, &acidified, out_dir)?);

    Ok(HypoxiaReport {
        filled,
        acidified,
        counts,
        files,
    })
}

fn render(
    config: &PipelineConfig,
    sites: &[SiteRecord],
    countries: &PolygonLayer,
    acidified: &Raster,
    out_dir: &Path,
) -> Result<PathBuf> {
    let range = config.thresholds.aragonite;
    // low saturation is the severe end, so the ramp runs max → min
    let ramp = ColorRamp::named("ylorrd", range.max, range.min)?;

    let conditions: BTreeSet<SiteCondition> = sites.iter().map(|s| s.condition.clone()).collect();
    let colors = ColorMap::new(&conditions).with_color(SiteCondition::Hypoxic, HIGHLIGHT_RED);

    let mut map = Map::new(
        "Hypoxic and eutrophic sites, acidified waters",
        *acidified.spec(),
        &config.render,
    );
    map.fill_polygons(countries, LAND_GREY)
        .raster(acidified, &ramp)
        .polygon_outlines(countries, OUTLINE_DARK)
        .points(
            sites
                .iter()
                .map(|s| (s.lon, s.lat, colors.color_for(&s.condition))),
            3,
        )
        .legend("aragonite saturation", Mark::Swatch, ramp.legend_entries(4))
        .legend("site condition", Mark::Dot, colors.legend_entries());

    map.save(&out_dir.join("hypoxia.png"))
}
