use anyhow::Result;
use std::fs;

use permit_pipeline::config::{Config, HttpConfig, SourcesConfig};
use permit_pipeline::pipeline::{parquet_out, transform};
use permit_pipeline::query::{store_for_data_root, QueryFilter};

const SET1_HEADER: &str = "APPROVAL_ID,DEVELOPMENT_ID,ADDRESS_JOB,JOB_BC_CODE,APPROVAL_TYPE,DATE_APPROVAL_CREATE,DATE_APPROVAL_ISSUE,DATE_APPROVAL_CLOSE,LAT_JOB,LNG_JOB,APPROVAL_VALUATION,APPROVAL_DU_LOW";
const SET2_HEADER: &str = "APPROVAL_ID,ADDRESS_JOB,JOB_BC_CODE,APPROVAL_TYPE,DATE_APPROVAL_CREATE,DATE_APPROVAL_ISSUE,DATE_APPROVAL_CLOSE,LAT_JOB,LNG_JOB,APPROVAL_VALUATION,APPROVAL_DU_LOW,APPROVAL_ADU_TOTAL";

fn write_fixtures(data_root: &std::path::Path) -> Result<()> {
    let raw = data_root.join("raw");
    fs::create_dir_all(&raw)?;

    // Legacy system: the overlap record with an early close date, plus a
    // building permit with no dwelling units.
    let set1_active = format!(
        "{SET1_HEADER}\n\
         A-200,D-7,777 C St San Diego CA 92101,3200,Building Permit - Combination,2021-01-10,2021-02-01,,32.72,-117.16,50000,\n"
    );
    let set1_closed = format!(
        "{SET1_HEADER}\n\
         A-100,D-1,123 Main St San Diego CA 92103,1010,Building Permit,2019-03-01,2019-04-01,2020-01-01,32.75,-117.12,200000,2\n"
    );

    // Current system: the overlap record with the later close date and an
    // ADU, a solar permit, and a record outside the service area.
    let set2_active = format!(
        "{SET2_HEADER}\n\
         B-300,900 Solar Way San Diego CA 92103,,Solar Photovoltaic Rooftop,2022-01-05,2022-01-20,,32.80,-117.10,20000,,\n\
         B-400,1 Far Away Rd,,Building Permit,2022-03-01,2022-03-15,,34.00,-117.10,10000,1,\n"
    );
    let set2_closed = format!(
        "{SET2_HEADER}\n\
         A-100,123 Main St San Diego CA 92103,1010,Building Permit,2019-03-01,2019-05-01,2023-06-01,32.75,-117.12,250000,1,1\n"
    );

    fs::write(raw.join("set1_active.csv"), set1_active)?;
    fs::write(raw.join("set1_closed.csv"), set1_closed)?;
    fs::write(raw.join("set2_active.csv"), set2_active)?;
    fs::write(raw.join("set2_closed.csv"), set2_closed)?;
    Ok(())
}

fn config_for(data_root: &std::path::Path) -> Config {
    Config {
        data_root: data_root.to_path_buf(),
        http: HttpConfig::default(),
        sources: SourcesConfig::default(),
    }
}

#[test]
fn overlapping_approval_resolves_to_later_close_date() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_fixtures(dir.path())?;
    let result = transform::run(&config_for(dir.path()))?;

    // 5 raw rows across both systems; dedup removes one A-100, the geo
    // filter removes B-400.
    assert_eq!(result.union_rows, 5);
    assert_eq!(result.final_rows, 3);

    let permits = parquet_out::read_permits(&dir.path().join("processed/permits.parquet"))?;
    let survivor = permits
        .iter()
        .find(|p| p.approval_id.as_deref() == Some("A-100"))
        .expect("A-100 survives dedup");

    // The current system's copy closed later, so it is authoritative and
    // total_du comes from its fields only (1 DU + 1 ADU).
    assert_eq!(survivor.source_system.as_str(), "current");
    assert_eq!(survivor.total_du, 2);
    assert_eq!(survivor.du_low, Some(1));
    assert_eq!(survivor.adu_total, Some(1));
    assert_eq!(survivor.zip_code.as_deref(), Some("92103"));
    // 2019-03-01 -> 2019-05-01
    assert_eq!(survivor.approval_days, Some(61));
    assert!(survivor.is_housing);
    assert!(survivor.is_adu);
    Ok(())
}

#[test]
fn combination_permit_without_units_is_not_housing() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_fixtures(dir.path())?;
    transform::run(&config_for(dir.path()))?;

    let permits = parquet_out::read_permits(&dir.path().join("processed/permits.parquet"))?;
    let rec = permits
        .iter()
        .find(|p| p.approval_id.as_deref() == Some("A-200"))
        .expect("A-200 present");

    assert_eq!(rec.approval_type_clean, "Building Permit");
    assert!(!rec.is_housing);
    assert!(!rec.is_solar);
    Ok(())
}

#[test]
fn aggregates_are_written_and_queryable() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_fixtures(dir.path())?;
    transform::run(&config_for(dir.path()))?;

    let store = store_for_data_root(dir.path());

    // The solar permit shows up in the solar view with a prefix-sum total
    let solar = store.solar_permits(&QueryFilter::default())?;
    assert_eq!(solar.len(), 1);
    assert_eq!(solar[0].permit_count, 1);
    assert_eq!(solar[0].cumulative_total, 1);
    assert_eq!(solar[0].zip_code.as_deref(), Some("92103"));

    // Stored per-type leaderboard, busiest type first
    let top = store.top_permit_types(&QueryFilter::default())?;
    assert_eq!(top[0].approval_type_clean, "Building Permit");
    assert_eq!(top[0].permit_count, 2);

    // The out-of-area record never reaches any view
    let options = store.filter_options()?;
    assert_eq!(options.years, vec![2019, 2021, 2022]);
    assert!(options.permit_types.contains(&"Solar/PV".to_string()));

    // Overview totals reflect only the canonical (deduped, in-area) rows
    // plus the solar permit from the current system.
    let stats = store.overview_stats(&QueryFilter::default())?;
    assert_eq!(stats.total_permits, 3);
    assert_eq!(stats.total_du, 2);

    // Type filtering is a typed predicate; hostile strings match nothing
    let hostile = QueryFilter {
        permit_type: Some("Solar/PV' OR '1'='1".to_string()),
        ..QueryFilter::default()
    };
    assert_eq!(store.overview_stats(&hostile)?.total_permits, 0);
    Ok(())
}

#[test]
fn rerunning_the_transform_is_idempotent() -> Result<()> {
    let dir = tempfile::tempdir()?;
    write_fixtures(dir.path())?;
    let config = config_for(dir.path());

    transform::run(&config)?;
    let first = parquet_out::read_permits(&dir.path().join("processed/permits.parquet"))?;
    transform::run(&config)?;
    let second = parquet_out::read_permits(&dir.path().join("processed/permits.parquet"))?;

    assert_eq!(first, second);
    Ok(())
}

#[test]
fn missing_raw_input_aborts_the_run() -> Result<()> {
    let dir = tempfile::tempdir()?;
    // No fixtures written
    let err = transform::run(&config_for(dir.path())).unwrap_err();
    assert!(err.to_string().contains("set1_active"));
    Ok(())
}
