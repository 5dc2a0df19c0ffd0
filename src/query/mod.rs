//! Shared query layer over the aggregate parquet files.
//!
//! Used by the API, dashboard, and tool-calling consumers. Filters are plain
//! typed predicates applied to decoded rows, so user-supplied type/zip
//! strings are never spliced into any query text. Every operation opens the
//! file it needs, reads, and drops it; there is no process-wide engine
//! state, so tests can point a store at any fixture directory.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::Result;
use crate::pipeline::aggregate::{
    BcCodeSummaryRow, HousingUnitsRow, MapPointRow, SolarMonthlyRow, TimelineRow, TopTypeRow,
    ZipConstructionRow,
};
use crate::pipeline::parquet_out::{self, AGGREGATE_FILES};

/// Optional filters shared by every read operation. Each aggregate applies
/// only the filters that exist in its grouping.
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    pub year_min: Option<i32>,
    pub year_max: Option<i32>,
    pub permit_type: Option<String>,
    pub zip_code: Option<String>,
}

impl QueryFilter {
    fn year_ok(&self, year: i32) -> bool {
        self.year_min.map_or(true, |min| year >= min)
            && self.year_max.map_or(true, |max| year <= max)
    }

    fn type_ok(&self, permit_type: &str) -> bool {
        self.permit_type
            .as_deref()
            .map_or(true, |t| t == permit_type)
    }

    fn zip_ok(&self, zip: Option<&str>) -> bool {
        self.zip_code.as_deref().map_or(true, |z| Some(z) == zip)
    }
}

/// Read access to one directory of aggregate parquet files.
pub struct AggregateStore {
    agg_dir: PathBuf,
}

/// Distinct filter values available to UI consumers.
#[derive(Debug, Serialize)]
pub struct FilterOptions {
    pub years: Vec<i32>,
    pub permit_types: Vec<String>,
    pub zip_codes: Vec<String>,
    pub source_systems: Vec<String>,
}

/// Headline totals recombined from `permit_summary`.
#[derive(Debug, PartialEq, Serialize)]
pub struct OverviewStats {
    pub total_permits: i64,
    pub total_du: i64,
    pub total_valuation: i64,
    /// Weighted blend of per-bucket medians (weights: `count_with_days`).
    /// An approximation of the true global median, kept for parity with the
    /// published figures; `None` when no bucket has a known duration.
    pub median_approval_days: Option<i64>,
}

/// Monthly volume with the source dimension summed away.
#[derive(Debug, PartialEq, Serialize)]
pub struct VolumeRow {
    pub year: i32,
    pub month: u32,
    pub approval_type_clean: String,
    pub permit_count: i64,
}

/// Per-type stats recombined from `permit_summary` under a filter.
#[derive(Debug, PartialEq, Serialize)]
pub struct TypeStatsRow {
    pub approval_type_clean: String,
    pub permit_count: i64,
    pub avg_valuation: Option<i64>,
    /// Same weighted-median approximation as [`OverviewStats`].
    pub median_approval_days: Option<i64>,
}

impl AggregateStore {
    pub fn new(agg_dir: impl Into<PathBuf>) -> Self {
        AggregateStore {
            agg_dir: agg_dir.into(),
        }
    }

    fn path(&self, file: &str) -> PathBuf {
        self.agg_dir.join(file)
    }

    /// Distinct years, permit types, zips, and source systems.
    pub fn filter_options(&self) -> Result<FilterOptions> {
        let mut years = BTreeSet::new();
        let mut permit_types = BTreeSet::new();
        for row in parquet_out::read_monthly_volume(&self.path(AGGREGATE_FILES[0]))? {
            years.insert(row.year);
            permit_types.insert(row.approval_type_clean);
        }
        let mut zip_codes = BTreeSet::new();
        for row in parquet_out::read_zip_construction(&self.path(AGGREGATE_FILES[6]))? {
            zip_codes.insert(row.zip_code);
        }
        Ok(FilterOptions {
            years: years.into_iter().collect(),
            permit_types: permit_types.into_iter().collect(),
            zip_codes: zip_codes.into_iter().collect(),
            source_systems: vec!["legacy".to_string(), "current".to_string()],
        })
    }

    /// Monthly permit counts by type, source systems combined.
    pub fn permit_volume(&self, filter: &QueryFilter) -> Result<Vec<VolumeRow>> {
        let mut groups: std::collections::BTreeMap<(i32, u32, String), i64> =
            std::collections::BTreeMap::new();
        for row in parquet_out::read_monthly_volume(&self.path(AGGREGATE_FILES[0]))? {
            if !filter.year_ok(row.year) || !filter.type_ok(&row.approval_type_clean) {
                continue;
            }
            *groups
                .entry((row.year, row.month, row.approval_type_clean))
                .or_insert(0) += row.permit_count;
        }
        Ok(groups
            .into_iter()
            .map(|((year, month, approval_type_clean), permit_count)| VolumeRow {
                year,
                month,
                approval_type_clean,
                permit_count,
            })
            .collect())
    }

    /// Annual dwelling-unit production rows.
    pub fn housing_units(&self, filter: &QueryFilter) -> Result<Vec<HousingUnitsRow>> {
        let rows = parquet_out::read_housing_units(&self.path(AGGREGATE_FILES[1]))?;
        Ok(rows
            .into_iter()
            .filter(|r| filter.year_ok(r.year))
            .collect())
    }

    /// Approval-duration statistics.
    pub fn approval_timelines(&self, filter: &QueryFilter) -> Result<Vec<TimelineRow>> {
        let rows = parquet_out::read_timelines(&self.path(AGGREGATE_FILES[2]))?;
        Ok(rows
            .into_iter()
            .filter(|r| {
                filter.year_ok(r.year)
                    && filter.type_ok(&r.approval_type_clean)
                    && filter.zip_ok(r.zip_code.as_deref())
            })
            .collect())
    }

    /// Monthly solar counts. The cumulative column keeps its stored global
    /// values even under a filter, matching the published behavior.
    pub fn solar_permits(&self, filter: &QueryFilter) -> Result<Vec<SolarMonthlyRow>> {
        let rows = parquet_out::read_solar_monthly(&self.path(AGGREGATE_FILES[3]))?;
        Ok(rows
            .into_iter()
            .filter(|r| filter.year_ok(r.year) && filter.zip_ok(r.zip_code.as_deref()))
            .collect())
    }

    /// Geo-located permit points for mapping.
    pub fn map_points(&self, filter: &QueryFilter) -> Result<Vec<MapPointRow>> {
        let rows = parquet_out::read_map_points(&self.path(AGGREGATE_FILES[4]))?;
        Ok(rows
            .into_iter()
            .filter(|r| {
                r.approval_year.map_or(true, |y| filter.year_ok(y))
                    && filter.type_ok(&r.approval_type_clean)
                    && filter.zip_ok(r.zip_code.as_deref())
            })
            .collect())
    }

    /// The stored per-type leaderboard, built over the full table at
    /// transform time. Only the type filter applies; year and zip are not
    /// dimensions of this view.
    pub fn top_permit_types(&self, filter: &QueryFilter) -> Result<Vec<TopTypeRow>> {
        let rows = parquet_out::read_top_types(&self.path(AGGREGATE_FILES[5]))?;
        Ok(rows
            .into_iter()
            .filter(|r| filter.type_ok(&r.approval_type_clean))
            .collect())
    }

    /// Construction activity per zip and year.
    pub fn construction_by_zip(&self, filter: &QueryFilter) -> Result<Vec<ZipConstructionRow>> {
        let rows = parquet_out::read_zip_construction(&self.path(AGGREGATE_FILES[6]))?;
        Ok(rows
            .into_iter()
            .filter(|r| filter.year_ok(r.year) && filter.zip_ok(Some(r.zip_code.as_str())))
            .collect())
    }

    /// Building-classification breakdown.
    pub fn bc_code_summary(&self, filter: &QueryFilter) -> Result<Vec<BcCodeSummaryRow>> {
        let rows = parquet_out::read_bc_code_summary(&self.path(AGGREGATE_FILES[7]))?;
        Ok(rows
            .into_iter()
            .filter(|r| filter.year_ok(r.year))
            .collect())
    }

    /// Headline totals for the current filter, from `permit_summary`.
    pub fn overview_stats(&self, filter: &QueryFilter) -> Result<OverviewStats> {
        let mut total_permits = 0i64;
        let mut total_du = 0i64;
        let mut total_valuation = 0i64;
        let mut weighted_median = 0f64;
        let mut weight = 0i64;
        for row in parquet_out::read_permit_summary(&self.path(AGGREGATE_FILES[8]))? {
            if !filter.year_ok(row.year)
                || !filter.type_ok(&row.approval_type_clean)
                || !filter.zip_ok(row.zip_code.as_deref())
            {
                continue;
            }
            total_permits += row.permit_count;
            total_du += row.total_du;
            total_valuation += row.total_valuation;
            if let Some(median) = row.median_approval_days {
                weighted_median += median * row.count_with_days as f64;
                weight += row.count_with_days;
            }
        }
        let median_approval_days =
            (weight > 0).then(|| (weighted_median / weight as f64).round() as i64);
        Ok(OverviewStats {
            total_permits,
            total_du,
            total_valuation,
            median_approval_days,
        })
    }

    /// Per-type counts, average valuation, and blended median durations,
    /// busiest types first.
    pub fn type_stats(&self, filter: &QueryFilter) -> Result<Vec<TypeStatsRow>> {
        struct Acc {
            count: i64,
            valuation: i64,
            weighted_median: f64,
            weight: i64,
        }
        let mut groups: std::collections::BTreeMap<String, Acc> =
            std::collections::BTreeMap::new();
        for row in parquet_out::read_permit_summary(&self.path(AGGREGATE_FILES[8]))? {
            if !filter.year_ok(row.year) || !filter.zip_ok(row.zip_code.as_deref()) {
                continue;
            }
            let acc = groups.entry(row.approval_type_clean).or_insert(Acc {
                count: 0,
                valuation: 0,
                weighted_median: 0.0,
                weight: 0,
            });
            acc.count += row.permit_count;
            acc.valuation += row.total_valuation;
            if let Some(median) = row.median_approval_days {
                acc.weighted_median += median * row.count_with_days as f64;
                acc.weight += row.count_with_days;
            }
        }
        let mut rows: Vec<TypeStatsRow> = groups
            .into_iter()
            .map(|(approval_type_clean, acc)| TypeStatsRow {
                approval_type_clean,
                permit_count: acc.count,
                avg_valuation: (acc.count > 0).then(|| acc.valuation / acc.count),
                median_approval_days: (acc.weight > 0)
                    .then(|| (acc.weighted_median / acc.weight as f64).round() as i64),
            })
            .collect();
        rows.sort_by(|a, b| {
            b.permit_count
                .cmp(&a.permit_count)
                .then_with(|| a.approval_type_clean.cmp(&b.approval_type_clean))
        });
        Ok(rows)
    }

    /// One aggregate view serialized as JSON rows, for the CLI and tool
    /// consumers. `view` is the aggregate file stem.
    pub fn view_as_json(&self, view: &str, filter: &QueryFilter) -> Result<serde_json::Value> {
        let value = match view {
            "permit_volume_monthly" => serde_json::to_value(self.permit_volume(filter)?)?,
            "housing_units_by_year" => serde_json::to_value(self.housing_units(filter)?)?,
            "approval_timelines" => serde_json::to_value(self.approval_timelines(filter)?)?,
            "solar_permits_monthly" => serde_json::to_value(self.solar_permits(filter)?)?,
            "map_points" => serde_json::to_value(self.map_points(filter)?)?,
            "top_permit_types" => serde_json::to_value(self.top_permit_types(filter)?)?,
            "type_stats" => serde_json::to_value(self.type_stats(filter)?)?,
            "construction_by_zip" => serde_json::to_value(self.construction_by_zip(filter)?)?,
            "bc_code_summary" => serde_json::to_value(self.bc_code_summary(filter)?)?,
            "permit_summary" | "overview" => serde_json::to_value(self.overview_stats(filter)?)?,
            "filter_options" => serde_json::to_value(self.filter_options()?)?,
            other => return Err(crate::error::PipelineError::UnknownView(other.to_string())),
        };
        Ok(value)
    }
}

/// Convenience constructor rooted at a data directory layout.
pub fn store_for_data_root(data_root: &Path) -> AggregateStore {
    AggregateStore::new(data_root.join("aggregated"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::aggregate::PermitSummaryRow;
    use crate::pipeline::parquet_out::write_permit_summary;

    fn summary_row(
        year: i32,
        permit_type: &str,
        count: i64,
        count_with_days: i64,
        median: Option<f64>,
    ) -> PermitSummaryRow {
        PermitSummaryRow {
            year,
            approval_type_clean: permit_type.to_string(),
            zip_code: Some("92101".to_string()),
            source_system: "current".to_string(),
            permit_count: count,
            total_du: count,
            total_valuation: count * 1000,
            count_with_days,
            sum_approval_days: median.map(|m| (m as i64) * count_with_days),
            median_approval_days: median,
        }
    }

    fn store_with_summary(rows: &[PermitSummaryRow]) -> (tempfile::TempDir, AggregateStore) {
        let dir = tempfile::tempdir().unwrap();
        write_permit_summary(&dir.path().join(AGGREGATE_FILES[8]), rows).unwrap();
        let store = AggregateStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn overview_blends_medians_weighted_by_duration_count() {
        let (_dir, store) = store_with_summary(&[
            summary_row(2021, "Building Permit", 10, 10, Some(10.0)),
            summary_row(2021, "Electrical", 30, 30, Some(50.0)),
        ]);
        let stats = store.overview_stats(&QueryFilter::default()).unwrap();
        assert_eq!(stats.total_permits, 40);
        // (10*10 + 50*30) / 40 = 40
        assert_eq!(stats.median_approval_days, Some(40));
    }

    #[test]
    fn overview_with_no_known_durations_has_no_median() {
        let (_dir, store) =
            store_with_summary(&[summary_row(2021, "Building Permit", 5, 0, None)]);
        let stats = store.overview_stats(&QueryFilter::default()).unwrap();
        assert_eq!(stats.total_permits, 5);
        assert_eq!(stats.median_approval_days, None);
    }

    #[test]
    fn year_range_filter_is_inclusive() {
        let (_dir, store) = store_with_summary(&[
            summary_row(2019, "Building Permit", 1, 0, None),
            summary_row(2020, "Building Permit", 2, 0, None),
            summary_row(2021, "Building Permit", 4, 0, None),
        ]);
        let filter = QueryFilter {
            year_min: Some(2020),
            year_max: Some(2020),
            ..QueryFilter::default()
        };
        assert_eq!(store.overview_stats(&filter).unwrap().total_permits, 2);
    }

    #[test]
    fn hostile_filter_strings_simply_match_nothing() {
        let (_dir, store) =
            store_with_summary(&[summary_row(2021, "Building Permit", 5, 0, None)]);
        let filter = QueryFilter {
            permit_type: Some("x'; DROP TABLE permits; --".to_string()),
            ..QueryFilter::default()
        };
        let stats = store.overview_stats(&filter).unwrap();
        assert_eq!(stats.total_permits, 0);
    }

    #[test]
    fn type_stats_sorted_by_count_desc() {
        let (_dir, store) = store_with_summary(&[
            summary_row(2021, "Electrical", 3, 3, Some(20.0)),
            summary_row(2021, "Building Permit", 9, 9, Some(40.0)),
            summary_row(2022, "Electrical", 1, 0, None),
        ]);
        let rows = store.type_stats(&QueryFilter::default()).unwrap();
        assert_eq!(rows[0].approval_type_clean, "Building Permit");
        assert_eq!(rows[1].permit_count, 4);
        assert_eq!(rows[1].median_approval_days, Some(20));
    }

    #[test]
    fn unknown_view_is_an_error() {
        let (_dir, store) = store_with_summary(&[]);
        let err = store
            .view_as_json("nope", &QueryFilter::default())
            .unwrap_err();
        assert!(matches!(err, crate::error::PipelineError::UnknownView(_)));
    }
}
