//! Single-band GeoTIFF reader and writer.
//!
//! Georeferencing uses the ModelPixelScale (33550) and ModelTiepoint (33922)
//! tags; GDAL_NODATA (42113) marks empty cells. Tiepoints of PixelIsPoint
//! rasters (GTRasterTypeGeoKey 1025 = 2) sit on the first cell centre and are
//! shifted by half a cell. Written files are Float64
//! with NaN as nodata and a WGS84 geographic GeoKey directory.
//! Uses the pure Rust `tiff` crate - no system dependencies required.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use thiserror::Error;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;

use super::{GridError, GridSpec, Raster};

const TAG_PIXEL_SCALE: Tag = Tag::ModelPixelScaleTag;
const TAG_TIEPOINT: Tag = Tag::ModelTiepointTag;
const TAG_GEO_KEYS: Tag = Tag::GeoKeyDirectoryTag;
const TAG_GDAL_NODATA: Tag = Tag::GdalNodata;

const KEY_RASTER_TYPE: u16 = 1025;
const PIXEL_IS_POINT: u16 = 2;

/// GeoKey directory: version 1.1.0, 3 keys: model type geographic,
/// raster pixel-is-area, geographic CRS EPSG:4326.
const WGS84_GEO_KEYS: [u16; 16] = [
    1, 1, 0, 3, //
    1024, 0, 1, 2, //
    1025, 0, 1, 1, //
    2048, 0, 1, 4326,
];

/// Error type for GeoTIFF operations.
#[derive(Debug, Error)]
pub enum GeoTiffError {
    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TIFF decoding / encoding error
    #[error("TIFF error: {0}")]
    Tiff(String),

    /// Missing or invalid geotransform tags
    #[error("Missing geotransform: {0}")]
    MissingGeotransform(String),

    /// Unsupported data layout
    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error(transparent)]
    Grid(#[from] GridError),
}

impl From<tiff::TiffError> for GeoTiffError {
    fn from(e: tiff::TiffError) -> Self {
        GeoTiffError::Tiff(e.to_string())
    }
}

/// Read the first band of a GeoTIFF into a [`Raster`].
pub fn read(path: &Path) -> Result<Raster, GeoTiffError> {
    let file = File::open(path)?;
    let mut decoder = Decoder::new(BufReader::new(file))?;

    let (width, height) = decoder.dimensions()?;
    let scale = decoder
        .get_tag_f64_vec(TAG_PIXEL_SCALE)
        .map_err(|_| GeoTiffError::MissingGeotransform("no ModelPixelScale tag".into()))?;
    let tiepoint = decoder
        .get_tag_f64_vec(TAG_TIEPOINT)
        .map_err(|_| GeoTiffError::MissingGeotransform("no ModelTiepoint tag".into()))?;
    if scale.len() < 2 || tiepoint.len() < 6 {
        return Err(GeoTiffError::MissingGeotransform(format!(
            "scale has {} values, tiepoint has {}",
            scale.len(),
            tiepoint.len()
        )));
    }
    let nodata: Option<f64> = decoder
        .get_tag_ascii_string(TAG_GDAL_NODATA)
        .ok()
        .and_then(|s| s.trim_matches(char::from(0)).trim().parse().ok());

    // ModelTiepoint: [I, J, K, X, Y, Z] maps raster (I, J) to model (X, Y)
    let (cell_width, cell_height) = (scale[0], scale[1]);
    let west = tiepoint[3] - tiepoint[0] * cell_width;
    let north = tiepoint[4] + tiepoint[1] * cell_height;
    let geo_keys = decoder.get_tag_u16_vec(TAG_GEO_KEYS).ok();
    let (west, north) = match geo_keys.as_deref().and_then(raster_type) {
        Some(PIXEL_IS_POINT) => {
            log::debug!("{}: PixelIsPoint, moving origin to cell corner", path.display());
            (west - cell_width / 2.0, north + cell_height / 2.0)
        }
        _ => (west, north),
    };
    let spec = GridSpec::from_origin(
        west,
        north,
        cell_width,
        cell_height,
        width as usize,
        height as usize,
    )?;

    let values: Vec<f64> = match decoder.read_image()? {
        DecodingResult::U8(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::U16(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::U32(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::U64(data) => data.into_iter().map(|v| v as f64).collect(),
        DecodingResult::F32(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::F64(data) => data,
        DecodingResult::I8(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::I16(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::I32(data) => data.into_iter().map(f64::from).collect(),
        DecodingResult::I64(data) => data.into_iter().map(|v| v as f64).collect(),
    };
    if values.len() != spec.len() {
        return Err(GeoTiffError::UnsupportedDataType(format!(
            "{} samples for {}x{} pixels (multi-band images are not supported)",
            values.len(),
            width,
            height
        )));
    }

    let cells = values
        .into_iter()
        .map(|v| {
            let is_nodata = nodata.map(|nd| v == nd).unwrap_or(false);
            (v.is_finite() && !is_nodata).then_some(v)
        })
        .collect();
    Ok(Raster::from_cells(spec, cells)?)
}

/// Value of GTRasterTypeGeoKey in a GeoKey directory, if present.
fn raster_type(keys: &[u16]) -> Option<u16> {
    let count = usize::from(*keys.get(3)?);
    keys.get(4..)?
        .chunks_exact(4)
        .take(count)
        // location 0: value stored inline
        .find(|entry| entry[0] == KEY_RASTER_TYPE && entry[1] == 0)
        .map(|entry| entry[3])
}

/// Write a raster as a Float64 GeoTIFF, empty cells as NaN.
pub fn write(raster: &Raster, path: &Path) -> Result<(), GeoTiffError> {
    let spec = raster.spec();
    encode(raster, path, (spec.west, spec.north), &WGS84_GEO_KEYS)
}

fn encode(
    raster: &Raster,
    path: &Path,
    (tie_x, tie_y): (f64, f64),
    geo_keys: &[u16],
) -> Result<(), GeoTiffError> {
    let spec = raster.spec();
    let file = File::create(path)?;
    let mut encoder = TiffEncoder::new(BufWriter::new(file))?;
    let mut image = encoder.new_image::<colortype::Gray64Float>(spec.cols as u32, spec.rows as u32)?;

    let scale = [spec.cell_width, spec.cell_height, 0.0];
    let tiepoint = [0.0, 0.0, 0.0, tie_x, tie_y, 0.0];
    image.encoder().write_tag(TAG_PIXEL_SCALE, &scale[..])?;
    image.encoder().write_tag(TAG_TIEPOINT, &tiepoint[..])?;
    image.encoder().write_tag(TAG_GEO_KEYS, geo_keys)?;
    image.encoder().write_tag(TAG_GDAL_NODATA, "nan")?;

    let data: Vec<f64> = raster
        .cells()
        .iter()
        .map(|c| c.unwrap_or(f64::NAN))
        .collect();
    image.write_data(&data)?;
    Ok(())
}
