use tracing::debug;

use crate::constants::{LAT_MAX, LAT_MIN, LNG_MAX, LNG_MIN};
use crate::domain::PermitRecord;

/// Null-tolerant service-area test: each coordinate is only checked when it
/// is present, so a record with one (or both) coordinates missing passes.
/// Coordinates are commonly absent on older legacy rows.
pub fn within_service_area(rec: &PermitRecord) -> bool {
    let lat_ok = rec.lat.map_or(true, |lat| (LAT_MIN..=LAT_MAX).contains(&lat));
    let lng_ok = rec.lng.map_or(true, |lng| (LNG_MIN..=LNG_MAX).contains(&lng));
    lat_ok && lng_ok
}

/// Drop records whose coordinates fall outside the service-area box.
pub fn filter_service_area(records: Vec<PermitRecord>) -> Vec<PermitRecord> {
    let before = records.len();
    let kept: Vec<PermitRecord> = records.into_iter().filter(within_service_area).collect();
    if kept.len() < before {
        debug!("Geo filter dropped {} records", before - kept.len());
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(lat: Option<f64>, lng: Option<f64>) -> PermitRecord {
        PermitRecord {
            lat,
            lng,
            ..PermitRecord::default()
        }
    }

    #[test]
    fn in_bounds_record_is_kept() {
        assert!(within_service_area(&at(Some(32.72), Some(-117.16))));
    }

    #[test]
    fn out_of_bounds_latitude_is_dropped() {
        assert!(!within_service_area(&at(Some(34.0), Some(-117.16))));
    }

    #[test]
    fn out_of_bounds_longitude_is_dropped() {
        assert!(!within_service_area(&at(Some(32.72), Some(-118.5))));
    }

    #[test]
    fn missing_coordinates_are_tolerated() {
        assert!(within_service_area(&at(None, None)));
        // One coordinate present and valid, the other absent
        assert!(within_service_area(&at(None, Some(-117.0))));
        assert!(within_service_area(&at(Some(32.9), None)));
    }

    #[test]
    fn present_coordinate_is_still_checked_when_other_is_missing() {
        assert!(!within_service_area(&at(Some(40.7), None)));
        assert!(!within_service_area(&at(None, Some(-73.9))));
    }

    #[test]
    fn boundary_values_are_inclusive() {
        assert!(within_service_area(&at(Some(32.5), Some(-117.7))));
        assert!(within_service_area(&at(Some(33.3), Some(-116.8))));
    }
}
