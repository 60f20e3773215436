use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::raster::algebra::ValueRange;
use crate::raster::idw::IdwParams;
use crate::raster::GridSpec;

/// Environment variable naming the shared data volume.
pub const DATA_ROOT_ENV: &str = "SEAWEED_DATA_ROOT";

// ---------------------------------------------------------------------------
// PipelineConfig – every tunable of the three pipelines
// ---------------------------------------------------------------------------

/// Run configuration, read from a JSON file. Every field has a default, so
/// `{}` is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub grid: GridConfig,
    pub thresholds: Thresholds,
    pub idw: IdwParams,
    /// Depth levels averaged by the seasonal nutrient maps.
    pub nutrient_depth: ValueRange,
    /// Depth levels averaged for the N:P suitability ratio.
    pub suitability_depth: ValueRange,
    pub render: RenderConfig,
    /// Window of most recent years in which production > 0 marks a country
    /// as currently farming seaweed.
    pub recent_years: i32,
    /// Attribute names tried, in order, to label a boundary polygon.
    pub country_fields: Vec<String>,
    /// Candidate data-volume roots, first existing one wins.
    pub data_roots: Vec<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            grid: GridConfig::default(),
            thresholds: Thresholds::default(),
            idw: IdwParams::default(),
            nutrient_depth: ValueRange::new(0.0, 100.0),
            suitability_depth: ValueRange::new(0.0, 0.0),
            render: RenderConfig::default(),
            recent_years: 5,
            country_fields: ["SOVEREIGN1", "TERRITORY1", "GEONAME", "ADMIN", "NAME", "name", "country"]
                .into_iter()
                .map(String::from)
                .collect(),
            data_roots: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
    pub resolution: f64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            west: -180.0,
            south: -90.0,
            east: 180.0,
            north: 90.0,
            resolution: 1.0,
        }
    }
}

/// Inclusive suitability ranges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Nitrogen : phosphorus ratio.
    pub np_ratio: ValueRange,
    /// Sea-surface temperature, °C.
    pub sst: ValueRange,
    /// Aragonite saturation state flagged as acidified.
    pub aragonite: ValueRange,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            np_ratio: ValueRange::new(4.0, 80.0),
            sst: ValueRange::new(0.0, 35.0),
            aragonite: ValueRange::new(0.0, 3.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Output pixels per raster cell edge.
    pub pixels_per_cell: u32,
    /// Continuous ramp for nutrient / ratio layers.
    pub ramp: String,
    /// Ramp for standard-deviation layers.
    pub sd_ramp: String,
    /// TrueType/OpenType file for map labels; common system fonts are
    /// tried when unset.
    pub font: Option<PathBuf>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            pixels_per_cell: 4,
            ramp: "viridis".into(),
            sd_ramp: "magma".into(),
            font: None,
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        debug!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn grid_spec(&self) -> Result<GridSpec> {
        let g = &self.grid;
        GridSpec::new(g.west, g.south, g.east, g.north, g.resolution).context("invalid grid config")
    }

    /// Data-volume root: explicit flag, then `SEAWEED_DATA_ROOT`, then the
    /// first existing configured root, then the working directory.
    pub fn data_root(&self, flag: Option<&Path>) -> PathBuf {
        if let Some(p) = flag {
            return p.to_path_buf();
        }
        if let Some(p) = std::env::var_os(DATA_ROOT_ENV).filter(|v| !v.is_empty()) {
            return PathBuf::from(p);
        }
        self.data_roots
            .iter()
            .find(|p| p.is_dir())
            .cloned()
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Resolve an input path against the data root unless it is absolute.
pub fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_gives_defaults() {
        let c: PipelineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(c, PipelineConfig::default());
        assert_eq!(c.thresholds.np_ratio, ValueRange::new(4.0, 80.0));
        assert_eq!(c.grid_spec().unwrap().cols, 360);
    }

    #[test]
    fn partial_override() {
        let c: PipelineConfig = serde_json::from_str(
            r#"{"grid": {"resolution": 0.5}, "idw": {"neighbors": 4}, "thresholds": {"sst": {"min": 5, "max": 30}}}"#,
        )
        .unwrap();
        assert_eq!(c.grid_spec().unwrap().cols, 720);
        assert_eq!(c.idw.neighbors, 4);
        assert_eq!(c.idw.power, 2.0);
        assert_eq!(c.thresholds.sst, ValueRange::new(5.0, 30.0));
        assert_eq!(c.thresholds.np_ratio, ValueRange::new(4.0, 80.0));
    }

    #[test]
    fn explicit_root_wins_and_relative_paths_join() {
        let c = PipelineConfig::default();
        let root = c.data_root(Some(Path::new("/mnt/share")));
        assert_eq!(root, PathBuf::from("/mnt/share"));
        assert_eq!(resolve(&root, Path::new("woa/n.csv")), PathBuf::from("/mnt/share/woa/n.csv"));
        assert_eq!(resolve(&root, Path::new("/abs/x.tif")), PathBuf::from("/abs/x.tif"));
    }
}
