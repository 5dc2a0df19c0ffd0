use std::fs;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::constants::{self, PERMITS_PARQUET};
use crate::domain::{PermitRecord, SourceSystem};
use crate::error::Result;
use crate::pipeline::{aggregate, dedup, derive, geo, normalize, parquet_out};

/// Row counts from a completed transform run.
#[derive(Debug, Serialize)]
pub struct TransformResult {
    pub legacy_rows: usize,
    pub current_rows: usize,
    pub union_rows: usize,
    pub final_rows: usize,
    pub permits_file: String,
}

/// Run the full transform: normalize both sources, union, derive, dedup,
/// geo-filter, export the canonical parquet, and build the nine aggregates.
///
/// Each stage fully materializes before the next reads it; re-running with
/// the same inputs reproduces identical output.
#[instrument(skip(config), fields(run_id = %Uuid::new_v4()))]
pub fn run(config: &Config) -> Result<TransformResult> {
    let t0 = Instant::now();
    let raw = config.raw_dir();
    fs::create_dir_all(config.processed_dir())?;
    fs::create_dir_all(config.aggregated_dir())?;

    // Stage 1: load & normalize the legacy system (set 1)
    info!("Loading set 1 (legacy)...");
    println!("  Loading Set 1 (legacy) ...");
    let legacy = normalize::load_source(
        &[
            raw.join(format!("{}.csv", constants::SET1_ACTIVE)),
            raw.join(format!("{}.csv", constants::SET1_CLOSED)),
        ],
        SourceSystem::Legacy,
    )?;
    info!("Set 1 rows: {}", legacy.len());
    println!("    Set 1 rows: {}", legacy.len());

    // Stage 2: load & normalize the current system (set 2)
    info!("Loading set 2 (current)...");
    println!("  Loading Set 2 (current) ...");
    let current = normalize::load_source(
        &[
            raw.join(format!("{}.csv", constants::SET2_ACTIVE)),
            raw.join(format!("{}.csv", constants::SET2_CLOSED)),
        ],
        SourceSystem::Current,
    )?;
    info!("Set 2 rows: {}", current.len());
    println!("    Set 2 rows: {}", current.len());

    // Stage 3: union + derived fields
    let legacy_rows = legacy.len();
    let current_rows = current.len();
    let mut union: Vec<PermitRecord> = legacy;
    union.extend(current);
    let union_rows = union.len();
    info!("Union total: {}", union_rows);
    println!("    Union total: {union_rows}");

    for rec in &mut union {
        derive::enrich(rec);
    }

    // Stages 4-5: dedup across the systems' overlap, then geo filter
    let permits = geo::filter_service_area(dedup::dedup(union));
    let final_rows = permits.len();
    info!("Final permits (deduped + geo-filtered): {}", final_rows);
    println!("    Final permits (deduped + geo-filtered): {final_rows}");

    // Export the canonical table
    let permits_path = config.processed_dir().join(PERMITS_PARQUET);
    parquet_out::write_permits(&permits_path, &permits)?;
    info!("Wrote {}", permits_path.display());
    println!("  Exported {}", permits_path.display());

    // Build the nine aggregates
    info!("Building aggregates...");
    println!("  Building aggregations ...");
    let set = aggregate::build_all(&permits);
    parquet_out::write_aggregates(&config.aggregated_dir(), &set)?;
    info!(
        "All aggregations complete in {:.1}s",
        t0.elapsed().as_secs_f64()
    );
    println!("  All aggregations complete.");

    Ok(TransformResult {
        legacy_rows,
        current_rows,
        union_rows,
        final_rows,
        permits_file: permits_path.display().to_string(),
    })
}
