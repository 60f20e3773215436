//! Point → grid conversion.

use log::debug;

use super::{GridSpec, Raster};
use crate::data::model::PointRecord;

/// Rasterize `(lon, lat, value)` triples: each cell holds the arithmetic mean
/// of the points it contains, cells without points are empty.
///
/// Points outside the grid or with a non-finite value are ignored.
pub fn rasterize_mean<I>(spec: GridSpec, points: I) -> Raster
where
    I: IntoIterator<Item = (f64, f64, f64)>,
{
    let mut sums = vec![0.0f64; spec.len()];
    let mut counts = vec![0u32; spec.len()];
    let mut dropped = 0usize;

    for (lon, lat, value) in points {
        match spec.locate(lon, lat) {
            Some((row, col)) if value.is_finite() => {
                let idx = spec.index(row, col);
                sums[idx] += value;
                counts[idx] += 1;
            }
            _ => dropped += 1,
        }
    }
    if dropped > 0 {
        debug!("rasterize: {dropped} points outside the grid or non-finite");
    }

    let cells = sums
        .into_iter()
        .zip(counts)
        .map(|(sum, n)| (n > 0).then(|| sum / n as f64))
        .collect();
    Raster { spec, cells }
}

/// Rasterize point records by their measured value.
pub fn rasterize_records<'a, I>(spec: GridSpec, records: I) -> Raster
where
    I: IntoIterator<Item = &'a PointRecord>,
{
    rasterize_mean(spec, records.into_iter().map(|r| (r.lon, r.lat, r.value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> GridSpec {
        GridSpec::new(0.0, 0.0, 3.0, 2.0, 1.0).unwrap()
    }

    #[test]
    fn cell_value_is_mean_of_points() {
        let r = rasterize_mean(
            spec(),
            vec![(0.2, 1.8, 1.0), (0.7, 1.1, 2.0), (0.5, 1.5, 6.0), (2.5, 0.5, 4.0)],
        );
        assert_eq!(r.get(0, 0), Some(3.0));
        assert_eq!(r.get(1, 2), Some(4.0));
        assert_eq!(r.get(0, 1), None);
        assert_eq!(r.valid_count(), 2);
    }

    #[test]
    fn boundary_points_follow_locate() {
        // x = 1.0 sits on the line between col 0 and col 1 → col 1
        let r = rasterize_mean(spec(), vec![(1.0, 1.5, 5.0), (1.5, 1.5, 7.0)]);
        assert_eq!(r.get(0, 0), None);
        assert_eq!(r.get(0, 1), Some(6.0));
        // outer corner clamps into the last cell
        let r = rasterize_mean(spec(), vec![(3.0, 0.0, 9.0)]);
        assert_eq!(r.get(1, 2), Some(9.0));
    }

    #[test]
    fn outside_and_nan_points_are_dropped() {
        let r = rasterize_mean(spec(), vec![(-1.0, 1.0, 1.0), (0.5, 0.5, f64::NAN)]);
        assert_eq!(r.valid_count(), 0);
    }
}
