use std::collections::BTreeSet;

use super::model::{PointRecord, PointSet, Season};

// ---------------------------------------------------------------------------
// Filter predicate: which seasons / depths are selected
// ---------------------------------------------------------------------------

/// Record selection applied before rasterization.
///
/// An absent constraint means "no filter". Records without a season pass
/// the season constraint only when it is absent; records without a depth
/// are surface samples (0 m).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointFilter {
    pub seasons: Option<BTreeSet<Season>>,
    /// Inclusive depth range in metres.
    pub depth_range: Option<(f64, f64)>,
}

impl PointFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn season(mut self, season: Season) -> Self {
        self.seasons.get_or_insert_with(BTreeSet::new).insert(season);
        self
    }

    pub fn depths(mut self, min: f64, max: f64) -> Self {
        self.depth_range = Some((min.min(max), min.max(max)));
        self
    }

    pub fn accepts(&self, record: &PointRecord) -> bool {
        if let Some(selected) = &self.seasons {
            match record.season {
                Some(s) if selected.contains(&s) => {}
                _ => return false,
            }
        }
        if let Some((lo, hi)) = self.depth_range {
            let d = record.depth_or_surface();
            if d < lo || d > hi {
                return false;
            }
        }
        true
    }
}

/// Return indices of records that pass the filter.
pub fn filtered_indices(set: &PointSet, filter: &PointFilter) -> Vec<usize> {
    set.records
        .iter()
        .enumerate()
        .filter(|(_, r)| filter.accepts(r))
        .map(|(i, _)| i)
        .collect()
}

/// Copy of the set restricted to records passing the filter.
pub fn apply(set: &PointSet, filter: &PointFilter) -> PointSet {
    let records = filtered_indices(set, filter)
        .into_iter()
        .map(|i| set.records[i].clone())
        .collect();
    PointSet::from_records(records)
}

/// Group records by depth level, in increasing depth order. Records
/// without a depth join the surface level.
pub fn split_by_depth(set: &PointSet) -> Vec<(f64, Vec<&PointRecord>)> {
    let mut levels: Vec<f64> = set.records.iter().map(PointRecord::depth_or_surface).collect();
    levels.sort_by(f64::total_cmp);
    levels.dedup();
    levels
        .into_iter()
        .map(|depth| {
            let level = set
                .records
                .iter()
                .filter(|r| r.depth_or_surface() == depth)
                .collect();
            (depth, level)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(depth: Option<f64>, season: Option<Season>) -> PointRecord {
        PointRecord {
            lat: 0.0,
            lon: 0.0,
            value: 1.0,
            depth,
            season,
        }
    }

    #[test]
    fn empty_filter_accepts_everything() {
        let set = PointSet::from_records(vec![rec(None, None), rec(Some(5.0), None)]);
        assert_eq!(filtered_indices(&set, &PointFilter::all()), vec![0, 1]);
    }

    #[test]
    fn depth_range_is_inclusive_and_missing_depth_is_surface() {
        let set = PointSet::from_records(vec![
            rec(Some(0.0), None),
            rec(Some(100.0), None),
            rec(Some(125.0), None),
            rec(None, None),
        ]);
        let f = PointFilter::all().depths(100.0, 0.0);
        assert_eq!(filtered_indices(&set, &f), vec![0, 1, 3]);
        let deep = PointFilter::all().depths(10.0, 100.0);
        assert_eq!(filtered_indices(&set, &deep), vec![1]);
    }

    #[test]
    fn season_selection() {
        let set = PointSet::from_records(vec![
            rec(None, Some(Season::Winter)),
            rec(None, Some(Season::Summer)),
            rec(None, None),
        ]);
        let f = PointFilter::all().season(Season::Summer);
        let out = apply(&set, &f);
        assert_eq!(out.len(), 1);
        assert!(out.seasons.contains(&Season::Summer));
    }

    #[test]
    fn depth_groups_are_ordered() {
        let set = PointSet::from_records(vec![
            rec(Some(10.0), None),
            rec(Some(0.0), None),
            rec(Some(10.0), None),
        ]);
        let groups = split_by_depth(&set);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, 0.0);
        assert_eq!(groups[1].1.len(), 2);
    }

    #[test]
    fn undepthed_records_join_the_surface_level() {
        let set = PointSet::from_records(vec![
            rec(None, None),
            rec(Some(0.0), None),
            rec(Some(50.0), None),
        ]);
        let groups = split_by_depth(&set);
        assert_eq!(groups.len(), 2);
        assert_eq!((groups[0].0, groups[0].1.len()), (0.0, 2));
    }
}
