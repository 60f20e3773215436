/// Data layer: point tables, site and production tables, record filtering.
///
/// Architecture:
/// ```text
///  .csv (atlas / long) / .json / .parquet
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → PointSet / SiteRecord / ProductionRecord
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │ PointSet  │  Vec<PointRecord>, depth + season index
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  filter   │  season / depth predicates → records to rasterize
///   └──────────┘
/// ```

pub mod filter;
pub mod loader;
pub mod model;
