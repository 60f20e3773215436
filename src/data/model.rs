use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use anyhow::bail;

// ---------------------------------------------------------------------------
// AttributeValue – a single attribute cell (dbf field, GeoJSON property, CSV)
// ---------------------------------------------------------------------------

/// A dynamically-typed attribute value attached to boundary features.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::String(s) => write!(f, "{s}"),
            AttributeValue::Integer(i) => write!(f, "{i}"),
            AttributeValue::Float(v) => write!(f, "{v:.4}"),
            AttributeValue::Bool(b) => write!(f, "{b}"),
            AttributeValue::Null => write!(f, "<null>"),
        }
    }
}

impl AttributeValue {
    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }
}

/// Named attributes of one feature.
pub type Attributes = BTreeMap<String, AttributeValue>;

// ---------------------------------------------------------------------------
// Season
// ---------------------------------------------------------------------------

/// Climatological season of an atlas export (northern-hemisphere naming).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Autumn,
}

impl Season {
    pub const ALL: [Season; 4] = [Season::Winter, Season::Spring, Season::Summer, Season::Autumn];

    /// Time-period code used in atlas file names (`..._13_..` = winter).
    pub fn atlas_code(self) -> u8 {
        match self {
            Season::Winter => 13,
            Season::Spring => 14,
            Season::Summer => 15,
            Season::Autumn => 16,
        }
    }

    pub fn from_atlas_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.atlas_code() == code)
    }

    pub fn name(self) -> &'static str {
        match self {
            Season::Winter => "winter",
            Season::Spring => "spring",
            Season::Summer => "summer",
            Season::Autumn => "autumn",
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Season {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let s = s.trim().to_ascii_lowercase();
        if let Ok(code) = s.parse::<u8>() {
            if let Some(season) = Season::from_atlas_code(code) {
                return Ok(season);
            }
        }
        match s.as_str() {
            "winter" | "jfm" => Ok(Season::Winter),
            "spring" | "amj" => Ok(Season::Spring),
            "summer" | "jas" => Ok(Season::Summer),
            "autumn" | "fall" | "ond" => Ok(Season::Autumn),
            other => bail!("unknown season '{other}'"),
        }
    }
}

// ---------------------------------------------------------------------------
// PointRecord / PointSet – scattered measurements
// ---------------------------------------------------------------------------

/// One measured value at a location (and optionally a depth and season).
#[derive(Debug, Clone, PartialEq)]
pub struct PointRecord {
    pub lat: f64,
    pub lon: f64,
    pub value: f64,
    /// Depth in metres below the surface.
    pub depth: Option<f64>,
    pub season: Option<Season>,
}

impl PointRecord {
    /// Depth in metres; tables without a depth column hold surface samples.
    pub fn depth_or_surface(&self) -> f64 {
        self.depth.unwrap_or(0.0)
    }
}

/// The full parsed point table with pre-computed depth / season indices.
#[derive(Debug, Clone, Default)]
pub struct PointSet {
    pub records: Vec<PointRecord>,
    /// Sorted unique depth levels present.
    pub depths: Vec<f64>,
    pub seasons: BTreeSet<Season>,
}

impl PointSet {
    pub fn from_records(records: Vec<PointRecord>) -> Self {
        let mut depths: Vec<f64> = records.iter().filter_map(|r| r.depth).collect();
        depths.sort_by(f64::total_cmp);
        depths.dedup();
        let seasons = records.iter().filter_map(|r| r.season).collect();
        PointSet {
            records,
            depths,
            seasons,
        }
    }

    /// Tag every record with a season (atlas exports carry it in the file name).
    pub fn with_season(mut self, season: Season) -> Self {
        for r in &mut self.records {
            r.season = Some(season);
        }
        self.seasons = BTreeSet::from([season]);
        self
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Sites and production tables
// ---------------------------------------------------------------------------

/// Condition class of a coastal eutrophication / hypoxia site.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SiteCondition {
    Hypoxic,
    Eutrophic,
    Improved,
    Other(String),
}

impl SiteCondition {
    pub fn parse(s: &str) -> Self {
        let lower = s.trim().to_ascii_lowercase();
        if lower.starts_with("hypox") {
            SiteCondition::Hypoxic
        } else if lower.starts_with("eutroph") {
            SiteCondition::Eutrophic
        } else if lower.starts_with("improv") || lower.contains("recover") {
            SiteCondition::Improved
        } else {
            SiteCondition::Other(s.trim().to_string())
        }
    }

    pub fn label(&self) -> &str {
        match self {
            SiteCondition::Hypoxic => "hypoxic",
            SiteCondition::Eutrophic => "eutrophic",
            SiteCondition::Improved => "improved",
            SiteCondition::Other(s) => s,
        }
    }
}

impl fmt::Display for SiteCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One row of the eutrophication / hypoxia site spreadsheet.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteRecord {
    pub name: String,
    pub country: String,
    pub lat: f64,
    pub lon: f64,
    pub condition: SiteCondition,
}

/// Aquaculture production of one species in one country and year.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductionRecord {
    pub country: String,
    pub year: i32,
    pub species: String,
    pub tonnes: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn season_parses_codes_and_names() {
        assert_eq!("13".parse::<Season>().unwrap(), Season::Winter);
        assert_eq!("Fall".parse::<Season>().unwrap(), Season::Autumn);
        assert_eq!("JAS".parse::<Season>().unwrap(), Season::Summer);
        assert!("monsoon".parse::<Season>().is_err());
    }

    #[test]
    fn point_set_indexes_depths() {
        let rec = |depth| PointRecord {
            lat: 0.0,
            lon: 0.0,
            value: 1.0,
            depth: Some(depth),
            season: None,
        };
        let set = PointSet::from_records(vec![rec(10.0), rec(0.0), rec(10.0)]);
        assert_eq!(set.depths, vec![0.0, 10.0]);
        assert!(set.seasons.is_empty());
        let set = set.with_season(Season::Spring);
        assert!(set.records.iter().all(|r| r.season == Some(Season::Spring)));
    }

    #[test]
    fn site_condition_classification() {
        assert_eq!(SiteCondition::parse("Hypoxic"), SiteCondition::Hypoxic);
        assert_eq!(SiteCondition::parse(" eutrophic "), SiteCondition::Eutrophic);
        assert_eq!(SiteCondition::parse("In Recovery"), SiteCondition::Improved);
        assert_eq!(
            SiteCondition::parse("Unknown"),
            SiteCondition::Other("Unknown".into())
        );
    }

    #[test]
    fn attribute_labels() {
        assert_eq!(AttributeValue::String("Chile".into()).to_string(), "Chile");
        assert_eq!(AttributeValue::Integer(152).to_string(), "152");
        assert!(AttributeValue::Null.is_null());
    }
}
