//! Seaweed-farming feasibility mapping.
//!
//! Point atlas data is gridded, combined by raster algebra, restricted to
//! boundary polygons, gap-filled by IDW and rendered to PNG maps, with
//! per-country summary tables alongside.

pub mod color;
pub mod config;
pub mod data;
pub mod pipeline;
pub mod raster;
pub mod render;
pub mod stats;
pub mod vector;
