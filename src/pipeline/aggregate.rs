//! The nine pre-aggregated views built from the canonical permit table.
//!
//! Every view is a pure function of the canonical slice and owns its output
//! ordering, so views can be built independently and each run reproduces
//! byte-identical tables. Group keys use `BTreeMap` so orderings are total,
//! never incidental hash order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{PermitRecord, SourceSystem};

/// Linearly interpolated quantile over a sorted slice (DuckDB
/// `QUANTILE_CONT` semantics). Empty input yields `None`, never a panic.
fn quantile_cont(sorted: &[i64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] as f64 + (sorted[hi] - sorted[lo]) as f64 * frac)
}

fn median_of_sorted(sorted: &[i64]) -> Option<f64> {
    quantile_cont(sorted, 0.5)
}

fn round_i64(v: f64) -> i64 {
    v.round() as i64
}

// ── 1. permit_volume_monthly ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyVolumeRow {
    pub year: i32,
    pub month: u32,
    pub approval_type_clean: String,
    pub source_system: String,
    pub permit_count: i64,
}

/// Monthly permit counts by cleaned type and source system.
pub fn permit_volume_monthly(permits: &[PermitRecord]) -> Vec<MonthlyVolumeRow> {
    let mut groups: BTreeMap<(i32, u32, String, SourceSystem), i64> = BTreeMap::new();
    for rec in permits {
        let (Some(year), Some(month)) = (rec.approval_year, rec.approval_month) else {
            continue;
        };
        *groups
            .entry((year, month, rec.approval_type_clean.clone(), rec.source_system))
            .or_insert(0) += 1;
    }
    groups
        .into_iter()
        .map(|((year, month, approval_type_clean, source), permit_count)| MonthlyVolumeRow {
            year,
            month,
            approval_type_clean,
            source_system: source.as_str().to_string(),
            permit_count,
        })
        .collect()
}

// ── 2. housing_units_by_year ──

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HousingUnitsRow {
    pub year: i32,
    pub du_extremely_low: i64,
    pub du_very_low: i64,
    pub du_low: i64,
    pub du_moderate: i64,
    pub du_above_moderate: i64,
    pub adu_total: i64,
    pub jadu_total: i64,
    pub total_du: i64,
}

/// Annual dwelling-unit production by income category, housing permits only.
pub fn housing_units_by_year(permits: &[PermitRecord]) -> Vec<HousingUnitsRow> {
    let mut groups: BTreeMap<i32, HousingUnitsRow> = BTreeMap::new();
    for rec in permits {
        let Some(year) = rec.approval_year else { continue };
        if !rec.is_housing {
            continue;
        }
        let row = groups.entry(year).or_insert_with(|| HousingUnitsRow {
            year,
            ..HousingUnitsRow::default()
        });
        row.du_extremely_low += rec.du_extremely_low.unwrap_or(0) as i64;
        row.du_very_low += rec.du_very_low.unwrap_or(0) as i64;
        row.du_low += rec.du_low.unwrap_or(0) as i64;
        row.du_moderate += rec.du_moderate.unwrap_or(0) as i64;
        row.du_above_moderate += rec.du_above_moderate.unwrap_or(0) as i64;
        row.adu_total += rec.adu_total.unwrap_or(0) as i64;
        row.jadu_total += rec.jadu_total.unwrap_or(0) as i64;
        row.total_du += rec.total_du;
    }
    groups.into_values().collect()
}

// ── 3. approval_timelines ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineRow {
    pub year: i32,
    pub approval_type_clean: String,
    pub zip_code: Option<String>,
    pub permit_count: i64,
    pub median_days: f64,
    pub avg_days: i64,
    pub p90_days: i64,
}

/// Approval-duration statistics per (year, type, zip), known durations only.
pub fn approval_timelines(permits: &[PermitRecord]) -> Vec<TimelineRow> {
    let mut groups: BTreeMap<(i32, String, Option<String>), Vec<i64>> = BTreeMap::new();
    for rec in permits {
        let (Some(year), Some(days)) = (rec.approval_year, rec.approval_days) else {
            continue;
        };
        groups
            .entry((year, rec.approval_type_clean.clone(), rec.zip_code.clone()))
            .or_default()
            .push(days);
    }
    groups
        .into_iter()
        .filter_map(|((year, approval_type_clean, zip_code), mut days)| {
            days.sort_unstable();
            let median_days = median_of_sorted(&days)?;
            let p90 = quantile_cont(&days, 0.9)?;
            let avg = days.iter().sum::<i64>() as f64 / days.len() as f64;
            Some(TimelineRow {
                year,
                approval_type_clean,
                zip_code,
                permit_count: days.len() as i64,
                median_days,
                avg_days: round_i64(avg),
                p90_days: round_i64(p90),
            })
        })
        .collect()
}

// ── 4. solar_permits_monthly ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolarMonthlyRow {
    pub year: i32,
    pub month: u32,
    pub zip_code: Option<String>,
    pub permit_count: i64,
    pub cumulative_total: i64,
}

/// Monthly solar permit counts per zip, with a running total.
///
/// The cumulative column is a single global prefix sum over the output
/// ordering (year, month, zip) — it is NOT reset per zip code. Rows in the
/// same month therefore share an in-month accumulation determined by the zip
/// sort, which keeps re-runs byte-identical.
pub fn solar_permits_monthly(permits: &[PermitRecord]) -> Vec<SolarMonthlyRow> {
    let mut groups: BTreeMap<(i32, u32, Option<String>), i64> = BTreeMap::new();
    for rec in permits {
        if !rec.is_solar {
            continue;
        }
        let (Some(year), Some(month)) = (rec.approval_year, rec.approval_month) else {
            continue;
        };
        *groups.entry((year, month, rec.zip_code.clone())).or_insert(0) += 1;
    }

    let mut running = 0i64;
    groups
        .into_iter()
        .map(|((year, month, zip_code), permit_count)| {
            running += permit_count;
            SolarMonthlyRow {
                year,
                month,
                zip_code,
                permit_count,
                cumulative_total: running,
            }
        })
        .collect()
}

// ── 5. map_points ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapPointRow {
    pub lat: f64,
    pub lng: f64,
    pub approval_type_clean: String,
    pub approval_year: Option<i32>,
    pub valuation: Option<f64>,
    pub total_du: i64,
    pub is_housing: bool,
    pub is_solar: bool,
    pub zip_code: Option<String>,
}

/// One row per geo-located permit; consumers sample it, this view does not.
pub fn map_points(permits: &[PermitRecord]) -> Vec<MapPointRow> {
    permits
        .iter()
        .filter_map(|rec| {
            let (lat, lng) = (rec.lat?, rec.lng?);
            Some(MapPointRow {
                lat,
                lng,
                approval_type_clean: rec.approval_type_clean.clone(),
                approval_year: rec.approval_year,
                valuation: rec.valuation,
                total_du: rec.total_du,
                is_housing: rec.is_housing,
                is_solar: rec.is_solar,
                zip_code: rec.zip_code.clone(),
            })
        })
        .collect()
}

// ── 6. top_permit_types ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopTypeRow {
    pub approval_type_clean: String,
    pub permit_count: i64,
    pub avg_valuation: Option<i64>,
    pub median_approval_days: Option<f64>,
}

/// Per-type counts, average valuation, and median approval duration, busiest
/// types first.
pub fn top_permit_types(permits: &[PermitRecord]) -> Vec<TopTypeRow> {
    struct Acc {
        count: i64,
        valuation_sum: f64,
        valuation_count: i64,
        days: Vec<i64>,
    }
    let mut groups: BTreeMap<String, Acc> = BTreeMap::new();
    for rec in permits {
        let acc = groups
            .entry(rec.approval_type_clean.clone())
            .or_insert_with(|| Acc {
                count: 0,
                valuation_sum: 0.0,
                valuation_count: 0,
                days: Vec::new(),
            });
        acc.count += 1;
        if let Some(v) = rec.valuation {
            acc.valuation_sum += v;
            acc.valuation_count += 1;
        }
        if let Some(d) = rec.approval_days {
            acc.days.push(d);
        }
    }

    let mut rows: Vec<TopTypeRow> = groups
        .into_iter()
        .map(|(approval_type_clean, mut acc)| {
            acc.days.sort_unstable();
            let avg_valuation = (acc.valuation_count > 0)
                .then(|| round_i64(acc.valuation_sum / acc.valuation_count as f64));
            TopTypeRow {
                approval_type_clean,
                permit_count: acc.count,
                avg_valuation,
                median_approval_days: median_of_sorted(&acc.days),
            }
        })
        .collect();
    rows.sort_by(|a, b| {
        b.permit_count
            .cmp(&a.permit_count)
            .then_with(|| a.approval_type_clean.cmp(&b.approval_type_clean))
    });
    rows
}

// ── 7. construction_by_zip ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZipConstructionRow {
    pub zip_code: String,
    pub year: i32,
    pub permit_count: i64,
    pub total_valuation: i64,
    pub total_du: i64,
}

/// Construction activity per (zip, year): counts, valuation, dwelling units.
pub fn construction_by_zip(permits: &[PermitRecord]) -> Vec<ZipConstructionRow> {
    let mut groups: BTreeMap<(String, i32), (i64, f64, i64)> = BTreeMap::new();
    for rec in permits {
        let (Some(zip), Some(year)) = (rec.zip_code.clone(), rec.approval_year) else {
            continue;
        };
        let entry = groups.entry((zip, year)).or_insert((0, 0.0, 0));
        entry.0 += 1;
        entry.1 += rec.valuation.unwrap_or(0.0);
        entry.2 += rec.total_du;
    }
    groups
        .into_iter()
        .map(|((zip_code, year), (permit_count, valuation, total_du))| ZipConstructionRow {
            zip_code,
            year,
            permit_count,
            total_valuation: round_i64(valuation),
            total_du,
        })
        .collect()
}

// ── 8. bc_code_summary ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BcCodeSummaryRow {
    pub year: i32,
    pub source_system: String,
    pub bc_code: String,
    pub bc_code_description: Option<String>,
    pub permit_count: i64,
    pub total_du: i64,
    pub total_valuation: i64,
}

/// Building-classification breakdown per (year, source, code, description),
/// most frequent first.
pub fn bc_code_summary(permits: &[PermitRecord]) -> Vec<BcCodeSummaryRow> {
    type Key = (i32, SourceSystem, String, Option<String>);
    let mut groups: BTreeMap<Key, (i64, i64, f64)> = BTreeMap::new();
    for rec in permits {
        let (Some(code), Some(year)) = (rec.bc_code.clone(), rec.approval_year) else {
            continue;
        };
        let entry = groups
            .entry((year, rec.source_system, code, rec.bc_code_description.clone()))
            .or_insert((0, 0, 0.0));
        entry.0 += 1;
        entry.1 += rec.total_du;
        entry.2 += rec.valuation.unwrap_or(0.0);
    }
    let mut rows: Vec<BcCodeSummaryRow> = groups
        .into_iter()
        .map(
            |((year, source, bc_code, bc_code_description), (count, du, valuation))| {
                BcCodeSummaryRow {
                    year,
                    source_system: source.as_str().to_string(),
                    bc_code,
                    bc_code_description,
                    permit_count: count,
                    total_du: du,
                    total_valuation: round_i64(valuation),
                }
            },
        )
        .collect();
    rows.sort_by(|a, b| {
        b.permit_count.cmp(&a.permit_count).then_with(|| {
            (a.year, &a.source_system, &a.bc_code).cmp(&(b.year, &b.source_system, &b.bc_code))
        })
    });
    rows
}

// ── 9. permit_summary ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermitSummaryRow {
    pub year: i32,
    pub approval_type_clean: String,
    pub zip_code: Option<String>,
    pub source_system: String,
    pub permit_count: i64,
    pub total_du: i64,
    pub total_valuation: i64,
    pub count_with_days: i64,
    pub sum_approval_days: Option<i64>,
    pub median_approval_days: Option<f64>,
}

/// Overview-level statistics per (year, type, zip, source).
///
/// Downstream overview and per-type duration stats are recombined from this
/// table by weighting each bucket's median by its `count_with_days` — a
/// documented approximation of the true global median (see the query layer).
pub fn permit_summary(permits: &[PermitRecord]) -> Vec<PermitSummaryRow> {
    type Key = (i32, String, Option<String>, SourceSystem);
    struct Acc {
        count: i64,
        total_du: i64,
        valuation: f64,
        days: Vec<i64>,
    }
    let mut groups: BTreeMap<Key, Acc> = BTreeMap::new();
    for rec in permits {
        let Some(year) = rec.approval_year else { continue };
        let acc = groups
            .entry((
                year,
                rec.approval_type_clean.clone(),
                rec.zip_code.clone(),
                rec.source_system,
            ))
            .or_insert_with(|| Acc {
                count: 0,
                total_du: 0,
                valuation: 0.0,
                days: Vec::new(),
            });
        acc.count += 1;
        acc.total_du += rec.total_du;
        acc.valuation += rec.valuation.unwrap_or(0.0);
        if let Some(d) = rec.approval_days {
            acc.days.push(d);
        }
    }
    groups
        .into_iter()
        .map(|((year, approval_type_clean, zip_code, source), mut acc)| {
            acc.days.sort_unstable();
            PermitSummaryRow {
                year,
                approval_type_clean,
                zip_code,
                source_system: source.as_str().to_string(),
                permit_count: acc.count,
                total_du: acc.total_du,
                total_valuation: round_i64(acc.valuation),
                count_with_days: acc.days.len() as i64,
                sum_approval_days: (!acc.days.is_empty()).then(|| acc.days.iter().sum()),
                median_approval_days: median_of_sorted(&acc.days),
            }
        })
        .collect()
}

/// All nine views, materialized together from one pass over the canonical
/// table. Each member is independently a pure function of the input.
#[derive(Debug)]
pub struct AggregateSet {
    pub permit_volume_monthly: Vec<MonthlyVolumeRow>,
    pub housing_units_by_year: Vec<HousingUnitsRow>,
    pub approval_timelines: Vec<TimelineRow>,
    pub solar_permits_monthly: Vec<SolarMonthlyRow>,
    pub map_points: Vec<MapPointRow>,
    pub top_permit_types: Vec<TopTypeRow>,
    pub construction_by_zip: Vec<ZipConstructionRow>,
    pub bc_code_summary: Vec<BcCodeSummaryRow>,
    pub permit_summary: Vec<PermitSummaryRow>,
}

pub fn build_all(permits: &[PermitRecord]) -> AggregateSet {
    AggregateSet {
        permit_volume_monthly: permit_volume_monthly(permits),
        housing_units_by_year: housing_units_by_year(permits),
        approval_timelines: approval_timelines(permits),
        solar_permits_monthly: solar_permits_monthly(permits),
        map_points: map_points(permits),
        top_permit_types: top_permit_types(permits),
        construction_by_zip: construction_by_zip(permits),
        bc_code_summary: bc_code_summary(permits),
        permit_summary: permit_summary(permits),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn permit(year: i32, month: u32) -> PermitRecord {
        PermitRecord {
            approval_year: Some(year),
            approval_month: Some(month),
            approval_type_clean: "Building Permit".to_string(),
            ..PermitRecord::default()
        }
    }

    #[test]
    fn quantile_cont_interpolates_linearly() {
        assert_eq!(quantile_cont(&[10, 20], 0.5), Some(15.0));
        assert_eq!(quantile_cont(&[1, 2, 3, 4], 0.5), Some(2.5));
        assert_eq!(quantile_cont(&[0, 10, 20, 30, 40], 0.9), Some(36.0));
        assert_eq!(quantile_cont(&[7], 0.9), Some(7.0));
        assert_eq!(quantile_cont(&[], 0.5), None);
    }

    #[test]
    fn monthly_volume_groups_and_orders_by_period() {
        let mut a = permit(2021, 3);
        let mut b = permit(2021, 3);
        let c = permit(2020, 12);
        a.source_system = SourceSystem::Legacy;
        b.source_system = SourceSystem::Legacy;

        let rows = permit_volume_monthly(&[a, b, c]);
        assert_eq!(rows.len(), 2);
        assert_eq!((rows[0].year, rows[0].month), (2020, 12));
        assert_eq!(rows[1].permit_count, 2);

        // Records with no derivable year are excluded
        let mut no_year = permit(2021, 1);
        no_year.approval_year = None;
        assert!(permit_volume_monthly(&[no_year]).is_empty());
    }

    #[test]
    fn housing_units_restricted_to_housing_permits() {
        let mut housing = permit(2022, 1);
        housing.is_housing = true;
        housing.du_low = Some(3);
        housing.adu_total = Some(1);
        housing.total_du = 4;

        let mut not_housing = permit(2022, 1);
        not_housing.du_low = Some(50);
        not_housing.total_du = 50;

        let rows = housing_units_by_year(&[housing, not_housing]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].du_low, 3);
        assert_eq!(rows[0].adu_total, 1);
        assert_eq!(rows[0].total_du, 4);
    }

    #[test]
    fn timelines_skip_unknown_durations() {
        let mut a = permit(2021, 5);
        a.approval_days = Some(10);
        let mut b = permit(2021, 6);
        b.approval_days = Some(30);
        let no_days = permit(2021, 7);

        let rows = approval_timelines(&[a, b, no_days]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].permit_count, 2);
        assert_eq!(rows[0].median_days, 20.0);
        assert_eq!(rows[0].avg_days, 20);
    }

    #[test]
    fn solar_cumulative_is_a_global_prefix_sum() {
        let mut records = Vec::new();
        for (year, month, zip, count) in [
            (2020, 1, Some("92101"), 2),
            (2020, 2, Some("92103"), 1),
            (2020, 2, Some("92101"), 3),
        ] {
            for _ in 0..count {
                let mut rec = permit(year, month);
                rec.is_solar = true;
                rec.zip_code = zip.map(str::to_string);
                records.push(rec);
            }
        }
        // A non-solar permit that must not be counted
        records.push(permit(2020, 1));

        let rows = solar_permits_monthly(&records);
        assert_eq!(rows.len(), 3);

        // Prefix sum equals the running count and never decreases
        let mut expected = 0;
        for row in &rows {
            expected += row.permit_count;
            assert_eq!(row.cumulative_total, expected);
        }
        assert_eq!(rows.last().unwrap().cumulative_total, 6);
    }

    #[test]
    fn map_points_require_both_coordinates() {
        let mut located = permit(2021, 1);
        located.lat = Some(32.7);
        located.lng = Some(-117.1);
        let mut half = permit(2021, 1);
        half.lat = Some(32.7);

        let rows = map_points(&[located, half]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].lat, 32.7);
    }

    #[test]
    fn top_types_sorted_by_count_with_null_safe_stats() {
        let mut solar = permit(2021, 1);
        solar.approval_type_clean = "Solar/PV".to_string();
        solar.valuation = Some(20_000.0);
        let building = permit(2021, 1);
        let building2 = permit(2021, 2);

        let rows = top_permit_types(&[solar, building, building2]);
        assert_eq!(rows[0].approval_type_clean, "Building Permit");
        assert_eq!(rows[0].permit_count, 2);
        // No valuations or durations in the building group
        assert_eq!(rows[0].avg_valuation, None);
        assert_eq!(rows[0].median_approval_days, None);
        assert_eq!(rows[1].avg_valuation, Some(20_000));
    }

    #[test]
    fn construction_by_zip_skips_unknown_zip() {
        let mut a = permit(2021, 1);
        a.zip_code = Some("92101".to_string());
        a.valuation = Some(100.6);
        a.total_du = 2;
        let no_zip = permit(2021, 1);

        let rows = construction_by_zip(&[a, no_zip]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].total_valuation, 101);
        assert_eq!(rows[0].total_du, 2);
    }

    #[test]
    fn permit_summary_carries_duration_tallies() {
        let mut a = permit(2021, 1);
        a.approval_days = Some(10);
        a.valuation = Some(1000.0);
        let mut b = permit(2021, 2);
        b.approval_days = Some(20);
        let c = permit(2021, 3);

        let rows = permit_summary(&[a, b, c]);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.permit_count, 3);
        assert_eq!(row.count_with_days, 2);
        assert_eq!(row.sum_approval_days, Some(30));
        assert_eq!(row.median_approval_days, Some(15.0));
        assert_eq!(row.total_valuation, 1000);
    }

    #[test]
    fn empty_input_builds_empty_views_without_panicking() {
        let set = build_all(&[]);
        assert!(set.permit_volume_monthly.is_empty());
        assert!(set.approval_timelines.is_empty());
        assert!(set.permit_summary.is_empty());
    }

    #[test]
    fn full_build_is_deterministic_across_runs() {
        let mut a = permit(2021, 4);
        a.is_solar = true;
        a.zip_code = Some("92101".to_string());
        a.approval_days = Some(12);
        let mut b = permit(2021, 4);
        b.zip_code = Some("92104".to_string());
        b.date_approval_close = NaiveDate::from_ymd_opt(2021, 6, 1);
        let records = vec![a, b];

        let first = build_all(&records);
        let second = build_all(&records);
        assert_eq!(first.permit_summary, second.permit_summary);
        assert_eq!(first.solar_permits_monthly, second.solar_permits_monthly);
    }
}
