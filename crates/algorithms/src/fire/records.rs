//! Splitting fire records into scoring ground truth and masked zones

use chrono::{DateTime, Duration, Utc};
use firescar_core::{DatedFire, FireRecord, Region};
use tracing::debug;

/// Fire records relevant to one analysis
#[derive(Debug, Clone, Default)]
pub struct FilteredFires {
    /// Valid records that started no later than `window_end + delta`
    pub in_scope: Vec<DatedFire>,
    /// Records inside the region with an unusable start or end date
    pub invalid: Vec<FireRecord>,
}

impl FilteredFires {
    /// Geometries of the in-scope fires
    pub fn burned_geometries(&self) -> impl Iterator<Item = &geo::Geometry<f64>> {
        self.in_scope.iter().map(|f| &f.geometry)
    }

    /// Geometries of the records to mask out
    pub fn invalid_geometries(&self) -> impl Iterator<Item = &geo::Geometry<f64>> {
        self.invalid.iter().map(|f| &f.geometry)
    }
}

/// Filter fire records for an analysis.
///
/// 1. Records whose geometry misses `region` are dropped.
/// 2. Records with either date field unusable go to `invalid`.
/// 3. Valid records are kept when `start <= window_end + delta_days`.
///
/// Date problems never abort the filter; they only move a record to
/// `invalid`, whose footprints are later masked out.
pub fn filter_fire_records(
    records: &[FireRecord],
    region: &Region,
    window_end: DateTime<Utc>,
    delta_days: u32,
) -> FilteredFires {
    let cutoff = window_end + Duration::days(i64::from(delta_days));
    let mut out = FilteredFires::default();
    let mut outside = 0usize;
    let mut late = 0usize;

    for record in records {
        if !region.intersects(&record.geometry) {
            outside += 1;
            continue;
        }
        match record.validate() {
            Ok(fire) => {
                if fire.start <= cutoff {
                    out.in_scope.push(fire);
                } else {
                    late += 1;
                }
            }
            Err(e) => {
                debug!(record = %record.id, error = %e, "fire record masked");
                out.invalid.push(record.clone());
            }
        }
    }

    debug!(
        in_scope = out.in_scope.len(),
        invalid = out.invalid.len(),
        outside,
        late,
        "filtered fire records"
    );
    out
}
