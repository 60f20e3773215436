//! Writes a small synthetic data volume for trying the three pipelines:
//!
//! ```text
//! <out>/
//!   woa_all_{n,p}{13..16}_01.csv   seasonal atlas tables (0, 10, 50, 100 m)
//!   nitrate_surface.parquet        long tables used by the suitability run
//!   phosphate_surface.parquet
//!   sst.tif  aragonite.tif         1° GeoTIFFs (aragonite with gaps)
//!   ocean.tif                      fill domain for the hypoxia run
//!   eez.geojson  countries.geojson boundary boxes
//!   native_range.geojson           line features
//!   sites.csv  production.csv
//! ```

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use serde_json::json;

use seaweed_atlas::data::model::Season;
use seaweed_atlas::raster::{geotiff, GridSpec, Raster};

const DEPTHS: [f64; 4] = [0.0, 10.0, 50.0, 100.0];
/// Atlas tables are sampled every `STEP` degrees at cell centres.
const STEP: usize = 3;

/// (name, west, south, east, north)
const COUNTRIES: [(&str, f64, f64, f64, f64); 6] = [
    ("Chile", -80.0, -55.0, -70.0, -18.0),
    ("Indonesia", 95.0, -11.0, 141.0, 6.0),
    ("Norway", 0.0, 57.0, 20.0, 72.0),
    ("Japan", 129.0, 30.0, 146.0, 46.0),
    ("Tanzania", 39.0, -11.0, 45.0, -4.0),
    ("Greenland", -60.0, 60.0, -20.0, 83.0),
];

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

/// Nitrate-like field in µmol/kg: rich at high latitudes, deeper water
/// richer, seasonal swing opposite between hemispheres.
fn nitrate(lat: f64, depth: f64, season: Season, rng: &mut SimpleRng) -> f64 {
    let phase = match season {
        Season::Winter => 1.0,
        Season::Spring => 0.3,
        Season::Summer => -1.0,
        Season::Autumn => -0.3,
    };
    let base = 2.0 + 25.0 * (lat.abs() / 90.0).powf(1.3) + depth * 0.08;
    (base + 3.0 * phase * lat.signum() + rng.gauss(0.0, 0.5)).max(0.0)
}

fn phosphate(lat: f64, depth: f64, season: Season, rng: &mut SimpleRng) -> f64 {
    // roughly Redfield with a low-latitude phosphate excess
    let n = nitrate(lat, depth, season, rng);
    (n / 16.0 + 0.15 * (1.0 - lat.abs() / 90.0)).max(0.01)
}

fn write_atlas_csv<F>(path: &Path, season: Season, rng: &mut SimpleRng, value: F) -> Result<()>
where
    F: Fn(f64, f64, Season, &mut SimpleRng) -> f64,
{
    let mut text = String::new();
    writeln!(text, "#COMMENT: synthetic {season} field")?;
    let levels: Vec<String> = DEPTHS.iter().map(|d| d.to_string()).collect();
    writeln!(
        text,
        "#COMMA SEPARATED LATITUDE, LONGITUDE, AND VALUES AT DEPTHS (M):{}",
        levels.join(",")
    )?;
    for lat_i in (0..180).step_by(STEP) {
        let lat = 89.5 - lat_i as f64;
        for lon_i in (0..360).step_by(STEP) {
            let lon = -179.5 + lon_i as f64;
            let mut row = format!("{lat},{lon}");
            for &depth in &DEPTHS {
                // deep levels missing near the poles, as on the shelf
                if depth > 50.0 && lat.abs() > 70.0 {
                    row.push(',');
                } else {
                    write!(row, ",{:.3}", value(lat, depth, season, rng))?;
                }
            }
            writeln!(text, "{row}")?;
        }
    }
    std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))
}

fn write_surface_parquet<F>(path: &Path, rng: &mut SimpleRng, value: F) -> Result<()>
where
    F: Fn(f64, f64, Season, &mut SimpleRng) -> f64,
{
    let mut lats = Vec::new();
    let mut lons = Vec::new();
    let mut values = Vec::new();
    let mut depths = Vec::new();
    let mut seasons = Vec::new();
    for lat_i in 0..180 {
        let lat = 89.5 - lat_i as f64;
        for lon_i in 0..360 {
            lats.push(lat);
            lons.push(-179.5 + lon_i as f64);
            values.push(value(lat, 0.0, Season::Summer, rng));
            depths.push(0.0);
            seasons.push(Season::Summer.name());
        }
    }

    let schema = Arc::new(Schema::new(vec![
        Field::new("lat", DataType::Float64, false),
        Field::new("lon", DataType::Float64, false),
        Field::new("value", DataType::Float64, true),
        Field::new("depth", DataType::Float64, true),
        Field::new("season", DataType::Utf8, true),
    ]));
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(Float64Array::from(lats)),
            Arc::new(Float64Array::from(lons)),
            Arc::new(Float64Array::from(values)),
            Arc::new(Float64Array::from(depths)),
            Arc::new(StringArray::from(seasons)),
        ],
    )
    .context("building record batch")?;

    let file = std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}

fn write_rasters(out: &Path, rng: &mut SimpleRng) -> Result<()> {
    let spec = GridSpec::global(1.0)?;

    let mut sst = Raster::empty(spec);
    let mut aragonite = Raster::empty(spec);
    for row in 0..spec.rows {
        for col in 0..spec.cols {
            let (_, lat) = spec.cell_center(row, col);
            let polar = lat.abs() / 90.0;
            sst.set(row, col, Some(29.0 - 31.0 * polar.powf(1.4) + rng.gauss(0.0, 0.4)));
            // a fifth of the aragonite cells are left empty for the IDW fill
            if rng.next_f64() > 0.2 {
                let omega = 1.0 + 3.0 * (1.0 - polar).powi(2) + rng.gauss(0.0, 0.1);
                aragonite.set(row, col, Some(omega.max(0.0)));
            }
        }
    }
    geotiff::write(&sst, &out.join("sst.tif"))?;
    geotiff::write(&aragonite, &out.join("aragonite.tif"))?;
    geotiff::write(&ocean(spec), &out.join("ocean.tif"))?;
    Ok(())
}

/// Everything but the country interiors; a 2° coastal band of each box stays wet.
fn ocean(spec: GridSpec) -> Raster {
    let mut ocean = Raster::filled(spec, 1.0);
    for row in 0..spec.rows {
        for col in 0..spec.cols {
            let (lon, lat) = spec.cell_center(row, col);
            let inland = COUNTRIES.iter().any(|&(_, w, s, e, n)| {
                lon > w + 2.0 && lon < e - 2.0 && lat > s + 2.0 && lat < n - 2.0
            });
            if inland {
                ocean.set(row, col, None);
            }
        }
    }
    ocean
}

fn boxes(field: &str) -> serde_json::Value {
    let features: Vec<_> = COUNTRIES
        .iter()
        .map(|&(name, w, s, e, n)| {
            json!({
                "type": "Feature",
                "properties": { field: name },
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[w, s], [e, s], [e, n], [w, n], [w, s]]]
                }
            })
        })
        .collect();
    json!({ "type": "FeatureCollection", "features": features })
}

fn write_vectors(out: &Path) -> Result<()> {
    std::fs::write(out.join("eez.geojson"), boxes("SOVEREIGN1").to_string())?;
    std::fs::write(out.join("countries.geojson"), boxes("ADMIN").to_string())?;
    let range = json!({
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "properties": { "species": "Macrocystis pyrifera" },
            "geometry": {
                "type": "MultiLineString",
                "coordinates": [
                    [[-75.0, -50.0], [-72.0, -35.0], [-71.0, -20.0]],
                    [[145.0, -44.0], [150.0, -38.0]]
                ]
            }
        }]
    });
    std::fs::write(out.join("native_range.geojson"), range.to_string())?;
    Ok(())
}

fn write_tables(out: &Path, rng: &mut SimpleRng) -> Result<()> {
    let classes = ["hypoxic", "eutrophic", "improved", "in danger"];
    let mut sites = csv::Writer::from_path(out.join("sites.csv"))?;
    sites.write_record(["name", "country", "lat", "lon", "classification"])?;
    let mut n = 0;
    for &(country, w, s, e, north) in &COUNTRIES {
        for _ in 0..4 {
            let lat = s + (north - s) * rng.next_f64();
            let lon = w + (e - w) * rng.next_f64();
            let class = classes[(rng.next_u64() % classes.len() as u64) as usize];
            sites.write_record([
                format!("site {n}"),
                country.to_string(),
                format!("{lat:.3}"),
                format!("{lon:.3}"),
                class.to_string(),
            ])?;
            n += 1;
        }
    }
    sites.flush()?;

    let mut production = csv::Writer::from_path(out.join("production.csv"))?;
    production.write_record(["country", "year", "species", "tonnes"])?;
    let farming = [("Chile", 2021, 18_000.0), ("Indonesia", 2022, 9_100_000.0), ("Japan", 2022, 350_000.0)];
    for (country, year, tonnes) in farming {
        let (year, tonnes) = (year.to_string(), tonnes.to_string());
        production.write_record([country, year.as_str(), "seaweeds nei", tonnes.as_str()])?;
    }
    // stopped farming long ago
    production.write_record(["Norway", "2001", "Saccharina latissima", "12"])?;
    production.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    let out = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("sample_data"));
    std::fs::create_dir_all(&out).with_context(|| format!("creating {}", out.display()))?;
    let mut rng = SimpleRng::new(42);

    for season in Season::ALL {
        let code = season.atlas_code();
        write_atlas_csv(&out.join(format!("woa_all_n{code}_01.csv")), season, &mut rng, nitrate)?;
        write_atlas_csv(&out.join(format!("woa_all_p{code}_01.csv")), season, &mut rng, phosphate)?;
    }
    write_surface_parquet(&out.join("nitrate_surface.parquet"), &mut rng, nitrate)?;
    write_surface_parquet(&out.join("phosphate_surface.parquet"), &mut rng, phosphate)?;
    write_rasters(&out, &mut rng)?;
    write_vectors(&out)?;
    write_tables(&out, &mut rng)?;

    println!("Wrote sample data volume to {}", out.display());
    Ok(())
}
