use std::collections::HashMap;
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime};
use csv::StringRecord;
use tracing::{debug, warn};

use crate::domain::{PermitRecord, SourceSystem};
use crate::error::{PipelineError, Result};

/// A raw CSV loaded into memory with header-keyed column access.
///
/// The two systems publish an "active" and a "closed" file each; files are
/// loaded separately so each can carry its own header layout (the equivalent
/// of a union-by-name load).
#[derive(Debug)]
pub struct RawTable {
    header_index: HashMap<String, usize>,
    rows: Vec<StringRecord>,
}

impl RawTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = RawRow<'_>> {
        self.rows.iter().map(move |record| RawRow {
            header_index: &self.header_index,
            record,
        })
    }
}

/// One raw row with by-name field access. Values are trimmed; empty cells
/// read as `None`.
pub struct RawRow<'a> {
    header_index: &'a HashMap<String, usize>,
    record: &'a StringRecord,
}

impl RawRow<'_> {
    pub fn text(&self, column: &str) -> Option<String> {
        let idx = *self.header_index.get(column)?;
        let value = self.record.get(idx)?.trim();
        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    }

    /// Permissive date cast: unparseable values become `None`, never errors.
    pub fn date(&self, column: &str) -> Option<NaiveDate> {
        let raw = self.text(column)?;
        parse_date(&raw)
    }

    /// Permissive integer cast with a float fallback for values like "3.0".
    pub fn int(&self, column: &str) -> Option<i32> {
        let raw = self.text(column)?;
        if let Ok(v) = raw.parse::<i32>() {
            return Some(v);
        }
        raw.parse::<f64>().ok().map(|v| v.round() as i32)
    }

    pub fn float(&self, column: &str) -> Option<f64> {
        self.text(column)?.parse::<f64>().ok()
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.date());
    }
    NaiveDate::parse_from_str(raw, "%m/%d/%Y").ok()
}

/// Read one raw CSV leniently: malformed rows are dropped with a warning,
/// but a missing or unreadable file aborts the run.
pub fn read_raw_csv(path: &Path) -> Result<RawTable> {
    if !path.exists() {
        return Err(PipelineError::MissingInput(path.display().to_string()));
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)?;

    let header_index: HashMap<String, usize> = reader
        .headers()?
        .iter()
        .enumerate()
        .map(|(i, name)| (name.trim().to_string(), i))
        .collect();

    let mut rows = Vec::new();
    let mut dropped = 0usize;
    for result in reader.records() {
        match result {
            Ok(record) => rows.push(record),
            Err(e) => {
                dropped += 1;
                debug!("Dropping malformed row in {}: {}", path.display(), e);
            }
        }
    }
    if dropped > 0 {
        warn!(
            "Dropped {} malformed rows while reading {}",
            dropped,
            path.display()
        );
    }

    Ok(RawTable { header_index, rows })
}

/// Map a legacy-system (set 1) row onto the canonical shape. Set 1 carries a
/// development id and a net dwelling-unit delta but no ADU/JADU breakdown.
pub fn normalize_legacy(row: &RawRow<'_>) -> PermitRecord {
    PermitRecord {
        approval_id: row.text("APPROVAL_ID"),
        project_id: row.text("PROJECT_ID"),
        development_id: row.text("DEVELOPMENT_ID"),
        job_id: row.text("JOB_ID"),
        project_type: row.text("PROJECT_TYPE"),
        project_status: row.text("PROJECT_STATUS"),
        project_processing_code: row.text("PROJECT_PROCESSING_CODE"),
        project_title: row.text("PROJECT_TITLE"),
        project_scope: row.text("PROJECT_SCOPE"),
        address: row.text("ADDRESS_JOB"),
        apn: row.text("JOB_APN"),
        bc_code: row.text("JOB_BC_CODE"),
        bc_code_description: row.text("JOB_BC_CODE_DESCRIPTION"),
        approval_type: row.text("APPROVAL_TYPE"),
        approval_status: row.text("APPROVAL_STATUS"),
        approval_scope: row.text("APPROVAL_SCOPE"),
        permit_holder: row.text("APPROVAL_PERMIT_HOLDER"),
        date_project_create: row.date("DATE_PROJECT_CREATE"),
        date_project_complete: row.date("DATE_PROJECT_COMPLETE"),
        date_approval_create: row.date("DATE_APPROVAL_CREATE"),
        date_approval_issue: row.date("DATE_APPROVAL_ISSUE"),
        date_approval_expire: row.date("DATE_APPROVAL_EXPIRE"),
        date_approval_close: row.date("DATE_APPROVAL_CLOSE"),
        lat: row.float("LAT_JOB"),
        lng: row.float("LNG_JOB"),
        valuation: row.float("APPROVAL_VALUATION"),
        du_net_change: row.int("APPROVAL_DU_NET_CHANGE"),
        stories: row.int("APPROVAL_STORIES"),
        floor_area: row.float("APPROVAL_FLOOR_AREA"),
        du_extremely_low: row.int("APPROVAL_DU_EXTREMELY_LOW"),
        du_very_low: row.int("APPROVAL_DU_VERY_LOW"),
        du_low: row.int("APPROVAL_DU_LOW"),
        du_moderate: row.int("APPROVAL_DU_MODERATE"),
        du_above_moderate: row.int("APPROVAL_DU_ABOVE_MODERATE"),
        du_future_demo: row.int("APPROVAL_DU_FUTURE_DEMO"),
        du_bonus: row.int("APPROVAL_DU_BONUS"),
        // Set 1 has no ADU/JADU columns
        source_system: SourceSystem::Legacy,
        ..PermitRecord::default()
    }
}

/// Map a current-system (set 2) row onto the canonical shape. Set 2 carries
/// the full ADU/JADU breakdown but no development id, project type/status,
/// or net-change field.
pub fn normalize_current(row: &RawRow<'_>) -> PermitRecord {
    PermitRecord {
        approval_id: row.text("APPROVAL_ID"),
        project_id: row.text("PROJECT_ID"),
        job_id: row.text("JOB_ID"),
        project_processing_code: row.text("PROJECT_PROCESSING_CODE"),
        project_title: row.text("PROJECT_TITLE"),
        project_scope: row.text("PROJECT_SCOPE"),
        address: row.text("ADDRESS_JOB"),
        apn: row.text("JOB_APN"),
        bc_code: row.text("JOB_BC_CODE"),
        bc_code_description: row.text("JOB_BC_CODE_DESCRIPTION"),
        approval_type: row.text("APPROVAL_TYPE"),
        approval_status: row.text("APPROVAL_STATUS"),
        approval_scope: row.text("APPROVAL_SCOPE"),
        permit_holder: row.text("APPROVAL_PERMIT_HOLDER"),
        date_project_create: row.date("DATE_PROJECT_CREATE"),
        date_project_complete: row.date("DATE_PROJECT_COMPLETE"),
        date_approval_create: row.date("DATE_APPROVAL_CREATE"),
        date_approval_issue: row.date("DATE_APPROVAL_ISSUE"),
        date_approval_expire: row.date("DATE_APPROVAL_EXPIRE"),
        date_approval_close: row.date("DATE_APPROVAL_CLOSE"),
        lat: row.float("LAT_JOB"),
        lng: row.float("LNG_JOB"),
        valuation: row.float("APPROVAL_VALUATION"),
        stories: row.int("APPROVAL_STORIES"),
        floor_area: row.float("APPROVAL_FLOOR_AREA"),
        du_extremely_low: row.int("APPROVAL_DU_EXTREMELY_LOW"),
        du_very_low: row.int("APPROVAL_DU_VERY_LOW"),
        du_low: row.int("APPROVAL_DU_LOW"),
        du_moderate: row.int("APPROVAL_DU_MODERATE"),
        du_above_moderate: row.int("APPROVAL_DU_ABOVE_MODERATE"),
        du_future_demo: row.int("APPROVAL_DU_FUTURE_DEMO"),
        du_bonus: row.int("APPROVAL_DU_BONUS"),
        adu_extremely_low: row.int("APPROVAL_ADU_EXTREMELY_LOW"),
        adu_very_low: row.int("APPROVAL_ADU_VERY_LOW"),
        adu_low: row.int("APPROVAL_ADU_LOW"),
        adu_moderate: row.int("APPROVAL_ADU_MODERATE"),
        adu_above_moderate: row.int("APPROVAL_ADU_ABOVE_MODERATE"),
        adu_bonus: row.int("APPROVAL_ADU_BONUS"),
        adu_total: row.int("APPROVAL_ADU_TOTAL"),
        jadu_extremely_low: row.int("APPROVAL_JADU_EXTREMELY_LOW"),
        jadu_very_low: row.int("APPROVAL_JADU_VERY_LOW"),
        jadu_low: row.int("APPROVAL_JADU_LOW"),
        jadu_moderate: row.int("APPROVAL_JADU_MODERATE"),
        jadu_above_moderate: row.int("APPROVAL_JADU_ABOVE_MODERATE"),
        jadu_bonus: row.int("APPROVAL_JADU_BONUS"),
        jadu_total: row.int("APPROVAL_JADU_TOTAL"),
        source_system: SourceSystem::Current,
        ..PermitRecord::default()
    }
}

/// Load and normalize one source system from its active + closed files.
pub fn load_source(paths: &[std::path::PathBuf], system: SourceSystem) -> Result<Vec<PermitRecord>> {
    let normalize: fn(&RawRow<'_>) -> PermitRecord = match system {
        SourceSystem::Legacy => normalize_legacy,
        SourceSystem::Current => normalize_current,
    };

    let mut records = Vec::new();
    for path in paths {
        let table = read_raw_csv(path)?;
        debug!("{}: {} raw rows", path.display(), table.len());
        records.extend(table.rows().map(|row| normalize(&row)));
    }
    Ok(records)
}
