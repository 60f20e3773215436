use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arrow::array::{Array, AsArray, Float32Array, Float64Array, Int32Array, Int64Array, StringArray};
use arrow::datatypes::DataType;
use log::{debug, warn};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::model::{PointRecord, PointSet, ProductionRecord, Season, SiteCondition, SiteRecord};

const LAT_NAMES: &[&str] = &["lat", "latitude"];
const LON_NAMES: &[&str] = &["lon", "long", "longitude", "lng"];

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load point measurements from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.csv`     – atlas layout (`lat,lon,<value per depth>…`) or a long table
///                with a `value` column
/// * `.json`    – `[{ "lat": .., "lon": .., "value": .., "depth": .. }, ...]`
/// * `.parquet` – columns `lat`, `lon`, `value`, optional `depth` / `season`
pub fn load_points(path: &Path) -> Result<PointSet> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let set = match ext.as_str() {
        "csv" => load_csv(path),
        "json" => load_json(path),
        "parquet" | "pq" => load_parquet(path),
        other => bail!("Unsupported point file extension: .{other}"),
    }
    .with_context(|| format!("loading points from {}", path.display()))?;

    debug!(
        "{}: {} records, {} depth levels",
        path.display(),
        set.len(),
        set.depths.len()
    );
    Ok(set)
}

/// Load the eutrophication / hypoxia site table (CSV export of the spreadsheet).
pub fn load_sites(path: &Path) -> Result<Vec<SiteRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("opening site table {}", path.display()))?;
    let headers = header_names(&mut reader)?;

    let lat_idx = find_column(&headers, LAT_NAMES).context("site table missing latitude column")?;
    let lon_idx = find_column(&headers, LON_NAMES).context("site table missing longitude column")?;
    let class_idx = find_column(&headers, &["classification", "class", "system", "condition"])
        .context("site table missing classification column")?;
    let country_idx = find_column(&headers, &["country", "nation"]);
    let name_idx = find_column(&headers, &["name", "site", "system_name", "location"]);

    let mut sites = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("site row {row_no}"))?;
        let lat = parse_f64_field(&record, lat_idx, row_no, "latitude")?;
        let lon = parse_f64_field(&record, lon_idx, row_no, "longitude")?;
        let (Some(lat), Some(lon)) = (lat, lon) else {
            warn!("site row {row_no}: missing coordinates, skipped");
            continue;
        };
        let text = |idx: Option<usize>| {
            idx.and_then(|i| record.get(i))
                .unwrap_or("")
                .to_string()
        };
        sites.push(SiteRecord {
            name: text(name_idx),
            country: text(country_idx),
            lat,
            lon,
            condition: SiteCondition::parse(record.get(class_idx).unwrap_or("")),
        });
    }
    Ok(sites)
}

/// Load an aquaculture production table (`country, year, species, tonnes`).
pub fn load_production(path: &Path) -> Result<Vec<ProductionRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("opening production table {}", path.display()))?;
    let headers = header_names(&mut reader)?;

    let country_idx = find_column(&headers, &["country", "country_name", "area", "entity"])
        .context("production table missing country column")?;
    let year_idx = find_column(&headers, &["year", "period"])
        .context("production table missing year column")?;
    let tonnes_idx = find_column(&headers, &["tonnes", "value", "quantity", "production"])
        .context("production table missing tonnes column")?;
    let species_idx = find_column(&headers, &["species", "asfis_species", "item"]);

    let mut rows = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("production row {row_no}"))?;
        let year_text = record.get(year_idx).unwrap_or("");
        let year: i32 = year_text
            .parse()
            .with_context(|| format!("production row {row_no}: '{year_text}' is not a year"))?;
        let tonnes = parse_f64_field(&record, tonnes_idx, row_no, "tonnes")?.unwrap_or(0.0);
        rows.push(ProductionRecord {
            country: record.get(country_idx).unwrap_or("").to_string(),
            year,
            species: species_idx
                .and_then(|i| record.get(i))
                .unwrap_or("")
                .to_string(),
            tonnes,
        });
    }
    Ok(rows)
}

// ---------------------------------------------------------------------------
// CSV loaders
// ---------------------------------------------------------------------------

/// Decide between the atlas layout and a long table by peeking at the header.
fn load_csv(path: &Path) -> Result<PointSet> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .context("opening CSV")?;

    let rows: Vec<csv::StringRecord> = reader
        .records()
        .collect::<std::result::Result<_, _>>()
        .context("reading CSV rows")?;

    let header = rows
        .iter()
        .find(|r| !is_data_row(r))
        .map(|r| r.iter().map(normalise_header).collect::<Vec<_>>());

    match header {
        Some(h) if h.iter().any(|c| c == "value") => parse_long_table(&rows, &h),
        _ => parse_atlas_table(&rows),
    }
}

/// Atlas layout: latitude, longitude, then one value column per depth level.
///
/// The header may be a plain `lat,lon,0,5,10` row or the atlas comment form
/// `#COMMA SEPARATED LATITUDE, LONGITUDE, AND VALUES AT DEPTHS (M):0,5,10`.
/// Empty value fields are missing measurements and produce no record.
fn parse_atlas_table(rows: &[csv::StringRecord]) -> Result<PointSet> {
    let mut depths: Option<Vec<f64>> = None;
    let mut records = Vec::new();

    for (row_no, row) in rows.iter().enumerate() {
        if !is_data_row(row) {
            if let Some(levels) = depth_levels(row) {
                depths = Some(levels);
            }
            continue;
        }
        let levels = depths
            .as_ref()
            .with_context(|| format!("row {row_no}: data before a depth header"))?;

        let lat = parse_f64_field(row, 0, row_no, "latitude")?;
        let lon = parse_f64_field(row, 1, row_no, "longitude")?;
        let (Some(lat), Some(lon)) = (lat, lon) else {
            bail!("row {row_no}: missing coordinates");
        };

        for (j, field) in row.iter().skip(2).enumerate() {
            if field.is_empty() {
                continue;
            }
            let Some(&depth) = levels.get(j) else {
                bail!(
                    "row {row_no}: {} values but only {} depth levels",
                    row.len() - 2,
                    levels.len()
                );
            };
            let value: f64 = field
                .parse()
                .with_context(|| format!("row {row_no}, depth {depth}: '{field}' is not a number"))?;
            records.push(PointRecord {
                lat,
                lon,
                value,
                depth: Some(depth),
                season: None,
            });
        }
    }

    if depths.is_none() {
        bail!("atlas CSV has no depth header");
    }
    Ok(PointSet::from_records(records))
}

/// Long table: one record per row with named columns.
fn parse_long_table(rows: &[csv::StringRecord], header: &[String]) -> Result<PointSet> {
    let lat_idx = find_column(header, LAT_NAMES).context("CSV missing latitude column")?;
    let lon_idx = find_column(header, LON_NAMES).context("CSV missing longitude column")?;
    let value_idx = find_column(header, &["value"]).context("CSV missing 'value' column")?;
    let depth_idx = find_column(header, &["depth"]);
    let season_idx = find_column(header, &["season"]);

    let mut records = Vec::new();
    for (row_no, row) in rows.iter().enumerate().filter(|(_, r)| is_data_row(r)) {
        let (Some(lat), Some(lon), Some(value)) = (
            parse_f64_field(row, lat_idx, row_no, "latitude")?,
            parse_f64_field(row, lon_idx, row_no, "longitude")?,
            parse_f64_field(row, value_idx, row_no, "value")?,
        ) else {
            continue;
        };
        let depth = match depth_idx {
            Some(i) => parse_f64_field(row, i, row_no, "depth")?,
            None => None,
        };
        let season = match season_idx.and_then(|i| row.get(i)).filter(|s| !s.is_empty()) {
            Some(s) => Some(s.parse::<Season>().with_context(|| format!("row {row_no}"))?),
            None => None,
        };
        records.push(PointRecord {
            lat,
            lon,
            value,
            depth,
            season,
        });
    }
    Ok(PointSet::from_records(records))
}

fn is_data_row(row: &csv::StringRecord) -> bool {
    row.get(0)
        .map(|f| f.parse::<f64>().is_ok())
        .unwrap_or(false)
}

/// Depth levels from a header row: every field after the two coordinate
/// columns, taking the text after the last `:` when present.
fn depth_levels(row: &csv::StringRecord) -> Option<Vec<f64>> {
    let levels: Vec<f64> = row
        .iter()
        .skip(2)
        .filter_map(|f| {
            let tail = f.rsplit(':').next().unwrap_or(f).trim();
            tail.parse::<f64>().ok()
        })
        .collect();
    (!levels.is_empty()).then_some(levels)
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented):
///
/// ```json
/// [
///   { "lat": -45.5, "lon": 170.5, "value": 12.1, "depth": 0, "season": "winter" },
///   ...
/// ]
/// ```
fn load_json(path: &Path) -> Result<PointSet> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let rows = root.as_array().context("Expected top-level JSON array")?;

    let mut records = Vec::with_capacity(rows.len());
    for (i, rec) in rows.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;

        let number = |names: &[&str]| names.iter().find_map(|n| obj.get(*n)).and_then(JsonValue::as_f64);

        let lat = number(LAT_NAMES).with_context(|| format!("Row {i}: missing latitude"))?;
        let lon = number(LON_NAMES).with_context(|| format!("Row {i}: missing longitude"))?;
        let Some(value) = number(&["value"]) else {
            continue;
        };
        let season = match obj.get("season") {
            Some(JsonValue::String(s)) => Some(s.parse::<Season>()?),
            Some(JsonValue::Number(n)) => n
                .as_u64()
                .and_then(|c| u8::try_from(c).ok())
                .and_then(Season::from_atlas_code),
            _ => None,
        };
        records.push(PointRecord {
            lat,
            lon,
            value,
            depth: number(&["depth"]),
            season,
        });
    }
    Ok(PointSet::from_records(records))
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet point table.
///
/// Expected schema:
/// - `lat`, `lon`, `value`: Float64 / Float32 (nulls in `value` are skipped)
/// - `depth`: optional numeric column
/// - `season`: optional Utf8 name or integer atlas code
fn load_parquet(path: &Path) -> Result<PointSet> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut records = Vec::new();

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();

        let column = |names: &[&str]| {
            names
                .iter()
                .find_map(|n| schema.index_of(n).ok())
                .map(|i| batch.column(i).clone())
        };
        let lat_col = column(LAT_NAMES).context("Parquet file missing 'lat' column")?;
        let lon_col = column(LON_NAMES).context("Parquet file missing 'lon' column")?;
        let value_col = column(&["value"]).context("Parquet file missing 'value' column")?;
        let depth_col = column(&["depth"]);
        let season_col = column(&["season"]);

        for row in 0..batch.num_rows() {
            let (Some(lat), Some(lon), Some(value)) = (
                extract_f64(&lat_col, row)?,
                extract_f64(&lon_col, row)?,
                extract_f64(&value_col, row)?,
            ) else {
                continue;
            };
            let depth = match &depth_col {
                Some(col) => extract_f64(col, row)?,
                None => None,
            };
            let season = match &season_col {
                Some(col) => extract_season(col, row)?,
                None => None,
            };
            records.push(PointRecord {
                lat,
                lon,
                value,
                depth,
                season,
            });
        }
    }

    Ok(PointSet::from_records(records))
}

// -- Parquet / Arrow helpers --

/// Extract a numeric cell as `f64`; nulls map to `None`.
fn extract_f64(col: &Arc<dyn Array>, row: usize) -> Result<Option<f64>> {
    if col.is_null(row) {
        return Ok(None);
    }
    let value = match col.data_type() {
        DataType::Float64 => col
            .as_any()
            .downcast_ref::<Float64Array>()
            .context("expected Float64Array")?
            .value(row),
        DataType::Float32 => col
            .as_any()
            .downcast_ref::<Float32Array>()
            .context("expected Float32Array")?
            .value(row) as f64,
        DataType::Int64 => col
            .as_any()
            .downcast_ref::<Int64Array>()
            .context("expected Int64Array")?
            .value(row) as f64,
        DataType::Int32 => col
            .as_any()
            .downcast_ref::<Int32Array>()
            .context("expected Int32Array")?
            .value(row) as f64,
        other => bail!("Expected a numeric column, got {other:?}"),
    };
    Ok(Some(value))
}

fn extract_season(col: &Arc<dyn Array>, row: usize) -> Result<Option<Season>> {
    if col.is_null(row) {
        return Ok(None);
    }
    match col.data_type() {
        DataType::Utf8 => {
            let arr = col
                .as_any()
                .downcast_ref::<StringArray>()
                .context("expected StringArray")?;
            Ok(Some(arr.value(row).parse()?))
        }
        DataType::LargeUtf8 => Ok(Some(col.as_string::<i64>().value(row).parse()?)),
        _ => Ok(extract_f64(col, row)?
            .and_then(|code| u8::try_from(code as i64).ok())
            .and_then(Season::from_atlas_code)),
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn header_names<R: std::io::Read>(reader: &mut csv::Reader<R>) -> Result<Vec<String>> {
    Ok(reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(normalise_header)
        .collect())
}

fn normalise_header(h: &str) -> String {
    h.trim().trim_start_matches('#').trim().to_ascii_lowercase()
}

fn find_column<S: AsRef<str>>(headers: &[S], names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| names.contains(&h.as_ref()))
}

/// Parse a numeric field; empty or `NA` fields are `None`.
fn parse_f64_field(
    record: &csv::StringRecord,
    idx: usize,
    row: usize,
    col: &str,
) -> Result<Option<f64>> {
    let raw = record.get(idx).unwrap_or("").trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("na") || raw.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    raw.parse::<f64>()
        .map(Some)
        .with_context(|| format!("Row {row}, {col}: '{raw}' is not a number"))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_temp(name: &str, contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn atlas_csv_with_comment_header() {
        let (_dir, path) = write_temp(
            "n_13.csv",
            "#DATASET=atlas nitrate\n\
             #COMMA SEPARATED LATITUDE, LONGITUDE, AND VALUES AT DEPTHS (M):0,5,10\n\
             -45.5,170.5,12.0,12.5,\n\
             -44.5,170.5,,11.0,13.0\n",
        );
        let set = load_points(&path).unwrap();
        assert_eq!(set.depths, vec![0.0, 5.0, 10.0]);
        assert_eq!(set.len(), 4);
        assert!(set
            .records
            .iter()
            .any(|r| r.lat == -44.5 && r.depth == Some(10.0) && r.value == 13.0));
    }

    #[test]
    fn atlas_csv_plain_header() {
        let (_dir, path) = write_temp("p.csv", "lat,lon,0,20\n10.5,20.5,0.5,0.7\n");
        let set = load_points(&path).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.records[1].depth, Some(20.0));
    }

    #[test]
    fn long_csv_with_season() {
        let (_dir, path) = write_temp(
            "long.csv",
            "lat,lon,depth,season,value\n1.5,2.5,0,summer,3.0\n1.5,2.5,0,,NA\n",
        );
        let set = load_points(&path).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.records[0].season, Some(Season::Summer));
    }

    #[test]
    fn json_points() {
        let (_dir, path) = write_temp(
            "p.json",
            r#"[{"lat": 1.0, "lon": 2.0, "value": 3.0, "season": 15}, {"lat": 1.0, "lon": 2.0}]"#,
        );
        let set = load_points(&path).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.records[0].season, Some(Season::Summer));
    }

    #[test]
    fn parquet_points_with_season_codes() {
        use arrow::datatypes::{Field, Schema};
        use arrow::record_batch::RecordBatch;
        use parquet::arrow::ArrowWriter;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("n.parquet");
        let schema = Arc::new(Schema::new(vec![
            Field::new("latitude", DataType::Float64, false),
            Field::new("lon", DataType::Float32, false),
            Field::new("value", DataType::Float64, true),
            Field::new("season", DataType::Int32, true),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Float64Array::from(vec![10.5, 11.5])),
                Arc::new(Float32Array::from(vec![20.5, 21.5])),
                Arc::new(Float64Array::from(vec![Some(4.0), None])),
                Arc::new(Int32Array::from(vec![14, 14])),
            ],
        )
        .unwrap();
        let mut writer = ArrowWriter::try_new(std::fs::File::create(&path).unwrap(), schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let set = load_points(&path).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.records[0].lon, 20.5);
        assert_eq!(set.records[0].season, Some(Season::Spring));
        assert_eq!(set.records[0].depth, None);
    }

    #[test]
    fn sites_with_aliases() {
        let (_dir, path) = write_temp(
            "sites.csv",
            "Name,Country,Latitude,Longitude,Classification\n\
             Bay A,Chile,-33.0,-71.6,Hypoxic\n\
             Bay B,Chile,,,-\n",
        );
        let sites = load_sites(&path).unwrap();
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].condition, SiteCondition::Hypoxic);
        assert_eq!(sites[0].country, "Chile");
    }

    #[test]
    fn production_table() {
        let (_dir, path) = write_temp(
            "prod.csv",
            "Country,Year,Species,Tonnes\nChile,2018,Gracilaria,100.5\nPeru,2019,Kelp,\n",
        );
        let rows = load_production(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].tonnes, 0.0);
    }

    #[test]
    fn unsupported_extension() {
        assert!(load_points(Path::new("points.xlsx")).is_err());
    }
}
