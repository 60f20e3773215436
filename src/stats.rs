//! Per-country summary tables derived from rasters, sites and production data.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::data::model::{ProductionRecord, SiteCondition, SiteRecord};
use crate::raster::mask::zone_index;
use crate::raster::{GridSpec, Raster};
use crate::vector::PolygonLayer;

const EARTH_RADIUS_KM: f64 = 6371.0088;

/// Case- and whitespace-insensitive key for matching country names across
/// tables.
pub fn country_key(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Surface area of a grid cell on a spherical Earth, km².
pub fn cell_area_km2(spec: &GridSpec, row: usize) -> f64 {
    let north = (spec.north - row as f64 * spec.cell_height).to_radians();
    let south = (spec.north - (row + 1) as f64 * spec.cell_height).to_radians();
    EARTH_RADIUS_KM.powi(2) * spec.cell_width.to_radians() * (north.sin() - south.sin()).abs()
}

/// Label of each feature of `layer`, from the first present attribute.
fn feature_labels(layer: &PolygonLayer, fields: &[String]) -> Vec<String> {
    let fields: Vec<&str> = fields.iter().map(String::as_str).collect();
    layer
        .features()
        .iter()
        .enumerate()
        .map(|(i, f)| f.label(&fields).unwrap_or_else(|| format!("feature {i}")))
        .collect()
}

// ---------------------------------------------------------------------------
// Farming countries
// ---------------------------------------------------------------------------

/// Countries (as [`country_key`]s) with positive production in the latest
/// `recent_years` years of the table.
pub fn farming_countries(production: &[ProductionRecord], recent_years: i32) -> BTreeSet<String> {
    let Some(latest) = production.iter().map(|r| r.year).max() else {
        return BTreeSet::new();
    };
    let first = latest - recent_years.max(1) + 1;
    production
        .iter()
        .filter(|r| r.year >= first && r.tonnes > 0.0)
        .map(|r| country_key(&r.country))
        .collect()
}

// ---------------------------------------------------------------------------
// Feasible countries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeasibleCountry {
    pub country: String,
    pub suitable_cells: usize,
    pub suitable_area_km2: f64,
    pub currently_farming: bool,
}

/// Countries whose boundary polygons contain at least one suitable cell,
/// sorted by descending cell count then name.
pub fn feasible_countries(
    suitable: &Raster,
    eez: &PolygonLayer,
    fields: &[String],
    farming: &BTreeSet<String>,
) -> Vec<FeasibleCountry> {
    let labels = feature_labels(eez, fields);
    let zones = zone_index(suitable, eez);
    let spec = suitable.spec();

    let mut per_country: BTreeMap<&str, (usize, f64)> = BTreeMap::new();
    for (i, (cell, zone)) in suitable.cells().iter().zip(&zones).enumerate() {
        if let (Some(_), Some(z)) = (cell, zone) {
            let (row, _) = spec.row_col(i);
            let entry = per_country.entry(labels[*z].as_str()).or_default();
            entry.0 += 1;
            entry.1 += cell_area_km2(spec, row);
        }
    }

    let mut rows: Vec<FeasibleCountry> = per_country
        .into_iter()
        .map(|(country, (cells, area))| FeasibleCountry {
            country: country.to_string(),
            suitable_cells: cells,
            suitable_area_km2: area,
            currently_farming: farming.contains(&country_key(country)),
        })
        .collect();
    rows.sort_by(|a, b| {
        b.suitable_cells
            .cmp(&a.suitable_cells)
            .then_with(|| a.country.cmp(&b.country))
    });
    rows
}

// ---------------------------------------------------------------------------
// Condition counts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConditionCount {
    pub country: String,
    pub hypoxic: usize,
    pub eutrophic: usize,
    pub improved: usize,
    pub other: usize,
    pub total_sites: usize,
    pub acidified_cells: usize,
}

/// Join sites to country polygons and count them by condition; add the
/// number of populated cells of `acidified` inside each country.
///
/// Sites outside every polygon are dropped. Countries appear when they
/// have at least one site or acidified cell.
pub fn condition_counts(
    sites: &[SiteRecord],
    countries: &PolygonLayer,
    fields: &[String],
    acidified: Option<&Raster>,
) -> Vec<ConditionCount> {
    let labels = feature_labels(countries, fields);
    let mut table: BTreeMap<&str, ConditionCount> = BTreeMap::new();

    for site in sites {
        let Some(z) = countries.feature_index_at(site.lon, site.lat) else {
            continue;
        };
        let row = table
            .entry(labels[z].as_str())
            .or_insert_with(|| ConditionCount {
                country: labels[z].clone(),
                ..Default::default()
            });
        match site.condition {
            SiteCondition::Hypoxic => row.hypoxic += 1,
            SiteCondition::Eutrophic => row.eutrophic += 1,
            SiteCondition::Improved => row.improved += 1,
            SiteCondition::Other(_) => row.other += 1,
        }
        row.total_sites += 1;
    }

    if let Some(raster) = acidified {
        let zones = zone_index(raster, countries);
        for (cell, zone) in raster.cells().iter().zip(&zones) {
            if let (Some(_), Some(z)) = (cell, zone) {
                table
                    .entry(labels[*z].as_str())
                    .or_insert_with(|| ConditionCount {
                        country: labels[*z].clone(),
                        ..Default::default()
                    })
                    .acidified_cells += 1;
            }
        }
    }

    table.into_values().collect()
}

/// Write serializable rows as a CSV table with a header.
pub fn write_csv<T: Serialize>(rows: &[T], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::tests::square;

    fn fields() -> Vec<String> {
        vec!["name".to_string()]
    }

    #[test]
    fn country_keys_normalise() {
        assert_eq!(country_key("  New   Zealand "), "new zealand");
    }

    #[test]
    fn equatorial_one_degree_cell_area() {
        let spec = GridSpec::global(1.0).unwrap();
        let a = cell_area_km2(&spec, 89);
        assert!((a - 12364.0).abs() < 10.0, "{a}");
        assert!(cell_area_km2(&spec, 0) < a);
    }

    #[test]
    fn farming_window_uses_latest_year() {
        let rec = |c: &str, year, tonnes| ProductionRecord {
            country: c.into(),
            year,
            species: "kelp".into(),
            tonnes,
        };
        let rows = vec![
            rec("Chile", 2019, 10.0),
            rec("Peru", 2010, 50.0),
            rec("Japan", 2015, 0.0),
            rec("Korea", 2015, 1.0),
        ];
        let farming = farming_countries(&rows, 5);
        assert_eq!(
            farming,
            BTreeSet::from(["chile".to_string(), "korea".to_string()])
        );
        assert!(farming_countries(&[], 5).is_empty());
    }

    #[test]
    fn feasible_countries_ranked() {
        let spec = GridSpec::new(0.0, 0.0, 10.0, 2.0, 1.0).unwrap();
        let suitable = Raster::filled(spec, 30.0);
        let eez = PolygonLayer::from_features(vec![
            square("Chile", 0.0, 0.0, 2.0, 2.0),
            square("Peru", 5.0, 0.0, 9.0, 2.0),
        ]);
        let farming = BTreeSet::from(["chile".to_string()]);
        let rows = feasible_countries(&suitable, &eez, &fields(), &farming);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].country, "Peru");
        assert_eq!(rows[0].suitable_cells, 8);
        assert!(!rows[0].currently_farming);
        assert!(rows[1].currently_farming);
        assert!(rows[1].suitable_area_km2 > 0.0);
    }

    #[test]
    fn sites_counted_per_country() {
        let layer = PolygonLayer::from_features(vec![
            square("A", 0.0, 0.0, 5.0, 5.0),
            square("B", 10.0, 0.0, 15.0, 5.0),
        ]);
        let site = |lon, cond: &str| SiteRecord {
            name: String::new(),
            country: String::new(),
            lat: 1.0,
            lon,
            condition: SiteCondition::parse(cond),
        };
        let sites = vec![
            site(1.0, "hypoxic"),
            site(2.0, "eutrophic"),
            site(3.0, "hypoxic"),
            site(11.0, "improved"),
            site(50.0, "hypoxic"),
        ];
        let spec = GridSpec::new(0.0, 0.0, 20.0, 5.0, 1.0).unwrap();
        let mut acid = Raster::empty(spec);
        acid.set(4, 12, Some(1.5));

        let rows = condition_counts(&sites, &layer, &fields(), Some(&acid));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].country, "A");
        assert_eq!((rows[0].hypoxic, rows[0].eutrophic, rows[0].total_sites), (2, 1, 3));
        assert_eq!(rows[1].improved, 1);
        assert_eq!(rows[1].acidified_cells, 1);
    }
}
