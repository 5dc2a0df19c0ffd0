//! Parquet encoding/decoding for the canonical permit table and the nine
//! aggregate views.
//!
//! One explicit Arrow schema per table; these schemas are the contract the
//! query layer and downstream consumers read. Every write lands in a `.tmp`
//! sibling first and is renamed into place so a concurrent reader never sees
//! a torn file.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanArray, Date32Array, Float64Array, Int32Array, Int64Array, StringArray,
};
use arrow::datatypes::{DataType, Date32Type, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::errors::ParquetError;
use parquet::file::properties::WriterProperties;

use crate::domain::{PermitRecord, SourceSystem};
use crate::error::{PipelineError, Result};
use crate::pipeline::aggregate::{
    AggregateSet, BcCodeSummaryRow, HousingUnitsRow, MapPointRow, MonthlyVolumeRow,
    PermitSummaryRow, SolarMonthlyRow, TimelineRow, TopTypeRow, ZipConstructionRow,
};

fn writer_properties() -> WriterProperties {
    WriterProperties::builder()
        .set_compression(Compression::ZSTD(ZstdLevel::default()))
        .build()
}

/// Write one batch to `path` atomically (tmp file + rename).
fn write_batch(path: &Path, schema: Arc<Schema>, columns: Vec<ArrayRef>) -> Result<()> {
    let batch = RecordBatch::try_new(schema.clone(), columns)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "out.parquet".to_string());
    let tmp = path.with_file_name(format!("{file_name}.tmp"));

    let file = fs::File::create(&tmp)?;
    let mut writer = ArrowWriter::try_new(file, schema, Some(writer_properties()))?;
    writer.write(&batch)?;
    writer.close()?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Read every record batch from a parquet file.
pub fn read_batches(path: &Path) -> Result<Vec<RecordBatch>> {
    let file = fs::File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
    let mut batches = Vec::new();
    for batch in reader {
        batches.push(batch?);
    }
    Ok(batches)
}

fn col<'a, A: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a A> {
    let idx = batch.schema().index_of(name)?;
    batch
        .column(idx)
        .as_any()
        .downcast_ref::<A>()
        .ok_or_else(|| {
            PipelineError::Parquet(ParquetError::General(format!(
                "column '{name}' has unexpected type"
            )))
        })
}

fn opt_str(arr: &StringArray, i: usize) -> Option<String> {
    (!arr.is_null(i)).then(|| arr.value(i).to_string())
}

fn opt_i32(arr: &Int32Array, i: usize) -> Option<i32> {
    (!arr.is_null(i)).then(|| arr.value(i))
}

fn opt_i64(arr: &Int64Array, i: usize) -> Option<i64> {
    (!arr.is_null(i)).then(|| arr.value(i))
}

fn opt_f64(arr: &Float64Array, i: usize) -> Option<f64> {
    (!arr.is_null(i)).then(|| arr.value(i))
}

fn opt_date(arr: &Date32Array, i: usize) -> Option<chrono::NaiveDate> {
    (!arr.is_null(i)).then(|| Date32Type::to_naive_date(arr.value(i)))
}

fn date_col(values: impl Iterator<Item = Option<chrono::NaiveDate>>) -> ArrayRef {
    Arc::new(Date32Array::from(
        values
            .map(|d| d.map(Date32Type::from_naive_date))
            .collect::<Vec<_>>(),
    ))
}

fn parse_source(raw: &str) -> SourceSystem {
    if raw == "current" {
        SourceSystem::Current
    } else {
        SourceSystem::Legacy
    }
}

// ── Canonical permits table ──

fn permits_schema() -> Arc<Schema> {
    let text = |name: &str| Field::new(name, DataType::Utf8, true);
    let date = |name: &str| Field::new(name, DataType::Date32, true);
    let int = |name: &str| Field::new(name, DataType::Int32, true);
    let float = |name: &str| Field::new(name, DataType::Float64, true);
    Arc::new(Schema::new(vec![
        text("approval_id"),
        text("project_id"),
        text("development_id"),
        text("job_id"),
        text("project_type"),
        text("project_status"),
        text("project_processing_code"),
        text("project_title"),
        text("project_scope"),
        text("address"),
        text("apn"),
        text("bc_code"),
        text("bc_code_description"),
        text("approval_type"),
        text("approval_status"),
        text("approval_scope"),
        text("permit_holder"),
        date("date_project_create"),
        date("date_project_complete"),
        date("date_approval_create"),
        date("date_approval_issue"),
        date("date_approval_expire"),
        date("date_approval_close"),
        float("lat"),
        float("lng"),
        float("valuation"),
        int("du_net_change"),
        int("stories"),
        float("floor_area"),
        int("du_extremely_low"),
        int("du_very_low"),
        int("du_low"),
        int("du_moderate"),
        int("du_above_moderate"),
        int("du_future_demo"),
        int("du_bonus"),
        int("adu_extremely_low"),
        int("adu_very_low"),
        int("adu_low"),
        int("adu_moderate"),
        int("adu_above_moderate"),
        int("adu_bonus"),
        int("adu_total"),
        int("jadu_extremely_low"),
        int("jadu_very_low"),
        int("jadu_low"),
        int("jadu_moderate"),
        int("jadu_above_moderate"),
        int("jadu_bonus"),
        int("jadu_total"),
        text("zip_code"),
        Field::new("approval_days", DataType::Int64, true),
        int("approval_year"),
        int("approval_month"),
        Field::new("approval_type_clean", DataType::Utf8, false),
        Field::new("is_housing", DataType::Boolean, false),
        Field::new("is_solar", DataType::Boolean, false),
        Field::new("is_adu", DataType::Boolean, false),
        Field::new("total_du", DataType::Int64, false),
        Field::new("source_system", DataType::Utf8, false),
    ]))
}

/// Write the full reconciled permit table.
pub fn write_permits(path: &Path, permits: &[PermitRecord]) -> Result<()> {
    let text = |f: fn(&PermitRecord) -> Option<&str>| -> ArrayRef {
        Arc::new(StringArray::from(
            permits.iter().map(f).collect::<Vec<_>>(),
        ))
    };
    let int = |f: fn(&PermitRecord) -> Option<i32>| -> ArrayRef {
        Arc::new(Int32Array::from(
            permits.iter().map(f).collect::<Vec<_>>(),
        ))
    };
    let float = |f: fn(&PermitRecord) -> Option<f64>| -> ArrayRef {
        Arc::new(Float64Array::from(
            permits.iter().map(f).collect::<Vec<_>>(),
        ))
    };

    let columns: Vec<ArrayRef> = vec![
        text(|r| r.approval_id.as_deref()),
        text(|r| r.project_id.as_deref()),
        text(|r| r.development_id.as_deref()),
        text(|r| r.job_id.as_deref()),
        text(|r| r.project_type.as_deref()),
        text(|r| r.project_status.as_deref()),
        text(|r| r.project_processing_code.as_deref()),
        text(|r| r.project_title.as_deref()),
        text(|r| r.project_scope.as_deref()),
        text(|r| r.address.as_deref()),
        text(|r| r.apn.as_deref()),
        text(|r| r.bc_code.as_deref()),
        text(|r| r.bc_code_description.as_deref()),
        text(|r| r.approval_type.as_deref()),
        text(|r| r.approval_status.as_deref()),
        text(|r| r.approval_scope.as_deref()),
        text(|r| r.permit_holder.as_deref()),
        date_col(permits.iter().map(|r| r.date_project_create)),
        date_col(permits.iter().map(|r| r.date_project_complete)),
        date_col(permits.iter().map(|r| r.date_approval_create)),
        date_col(permits.iter().map(|r| r.date_approval_issue)),
        date_col(permits.iter().map(|r| r.date_approval_expire)),
        date_col(permits.iter().map(|r| r.date_approval_close)),
        float(|r| r.lat),
        float(|r| r.lng),
        float(|r| r.valuation),
        int(|r| r.du_net_change),
        int(|r| r.stories),
        float(|r| r.floor_area),
        int(|r| r.du_extremely_low),
        int(|r| r.du_very_low),
        int(|r| r.du_low),
        int(|r| r.du_moderate),
        int(|r| r.du_above_moderate),
        int(|r| r.du_future_demo),
        int(|r| r.du_bonus),
        int(|r| r.adu_extremely_low),
        int(|r| r.adu_very_low),
        int(|r| r.adu_low),
        int(|r| r.adu_moderate),
        int(|r| r.adu_above_moderate),
        int(|r| r.adu_bonus),
        int(|r| r.adu_total),
        int(|r| r.jadu_extremely_low),
        int(|r| r.jadu_very_low),
        int(|r| r.jadu_low),
        int(|r| r.jadu_moderate),
        int(|r| r.jadu_above_moderate),
        int(|r| r.jadu_bonus),
        int(|r| r.jadu_total),
        text(|r| r.zip_code.as_deref()),
        Arc::new(Int64Array::from(
            permits.iter().map(|r| r.approval_days).collect::<Vec<_>>(),
        )),
        int(|r| r.approval_year),
        int(|r| r.approval_month.map(|m| m as i32)),
        Arc::new(StringArray::from(
            permits
                .iter()
                .map(|r| r.approval_type_clean.as_str())
                .collect::<Vec<_>>(),
        )),
        Arc::new(BooleanArray::from(
            permits.iter().map(|r| r.is_housing).collect::<Vec<_>>(),
        )),
        Arc::new(BooleanArray::from(
            permits.iter().map(|r| r.is_solar).collect::<Vec<_>>(),
        )),
        Arc::new(BooleanArray::from(
            permits.iter().map(|r| r.is_adu).collect::<Vec<_>>(),
        )),
        Arc::new(Int64Array::from(
            permits.iter().map(|r| r.total_du).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            permits
                .iter()
                .map(|r| r.source_system.as_str())
                .collect::<Vec<_>>(),
        )),
    ];

    write_batch(path, permits_schema(), columns)
}

/// Read the canonical permit table back into records.
pub fn read_permits(path: &Path) -> Result<Vec<PermitRecord>> {
    let mut records = Vec::new();
    for batch in read_batches(path)? {
        let approval_id: &StringArray = col(&batch, "approval_id")?;
        let project_id: &StringArray = col(&batch, "project_id")?;
        let development_id: &StringArray = col(&batch, "development_id")?;
        let job_id: &StringArray = col(&batch, "job_id")?;
        let project_type: &StringArray = col(&batch, "project_type")?;
        let project_status: &StringArray = col(&batch, "project_status")?;
        let project_processing_code: &StringArray = col(&batch, "project_processing_code")?;
        let project_title: &StringArray = col(&batch, "project_title")?;
        let project_scope: &StringArray = col(&batch, "project_scope")?;
        let address: &StringArray = col(&batch, "address")?;
        let apn: &StringArray = col(&batch, "apn")?;
        let bc_code: &StringArray = col(&batch, "bc_code")?;
        let bc_code_description: &StringArray = col(&batch, "bc_code_description")?;
        let approval_type: &StringArray = col(&batch, "approval_type")?;
        let approval_status: &StringArray = col(&batch, "approval_status")?;
        let approval_scope: &StringArray = col(&batch, "approval_scope")?;
        let permit_holder: &StringArray = col(&batch, "permit_holder")?;
        let date_project_create: &Date32Array = col(&batch, "date_project_create")?;
        let date_project_complete: &Date32Array = col(&batch, "date_project_complete")?;
        let date_approval_create: &Date32Array = col(&batch, "date_approval_create")?;
        let date_approval_issue: &Date32Array = col(&batch, "date_approval_issue")?;
        let date_approval_expire: &Date32Array = col(&batch, "date_approval_expire")?;
        let date_approval_close: &Date32Array = col(&batch, "date_approval_close")?;
        let lat: &Float64Array = col(&batch, "lat")?;
        let lng: &Float64Array = col(&batch, "lng")?;
        let valuation: &Float64Array = col(&batch, "valuation")?;
        let du_net_change: &Int32Array = col(&batch, "du_net_change")?;
        let stories: &Int32Array = col(&batch, "stories")?;
        let floor_area: &Float64Array = col(&batch, "floor_area")?;
        let du_extremely_low: &Int32Array = col(&batch, "du_extremely_low")?;
        let du_very_low: &Int32Array = col(&batch, "du_very_low")?;
        let du_low: &Int32Array = col(&batch, "du_low")?;
        let du_moderate: &Int32Array = col(&batch, "du_moderate")?;
        let du_above_moderate: &Int32Array = col(&batch, "du_above_moderate")?;
        let du_future_demo: &Int32Array = col(&batch, "du_future_demo")?;
        let du_bonus: &Int32Array = col(&batch, "du_bonus")?;
        let adu_extremely_low: &Int32Array = col(&batch, "adu_extremely_low")?;
        let adu_very_low: &Int32Array = col(&batch, "adu_very_low")?;
        let adu_low: &Int32Array = col(&batch, "adu_low")?;
        let adu_moderate: &Int32Array = col(&batch, "adu_moderate")?;
        let adu_above_moderate: &Int32Array = col(&batch, "adu_above_moderate")?;
        let adu_bonus: &Int32Array = col(&batch, "adu_bonus")?;
        let adu_total: &Int32Array = col(&batch, "adu_total")?;
        let jadu_extremely_low: &Int32Array = col(&batch, "jadu_extremely_low")?;
        let jadu_very_low: &Int32Array = col(&batch, "jadu_very_low")?;
        let jadu_low: &Int32Array = col(&batch, "jadu_low")?;
        let jadu_moderate: &Int32Array = col(&batch, "jadu_moderate")?;
        let jadu_above_moderate: &Int32Array = col(&batch, "jadu_above_moderate")?;
        let jadu_bonus: &Int32Array = col(&batch, "jadu_bonus")?;
        let jadu_total: &Int32Array = col(&batch, "jadu_total")?;
        let zip_code: &StringArray = col(&batch, "zip_code")?;
        let approval_days: &Int64Array = col(&batch, "approval_days")?;
        let approval_year: &Int32Array = col(&batch, "approval_year")?;
        let approval_month: &Int32Array = col(&batch, "approval_month")?;
        let approval_type_clean: &StringArray = col(&batch, "approval_type_clean")?;
        let is_housing: &BooleanArray = col(&batch, "is_housing")?;
        let is_solar: &BooleanArray = col(&batch, "is_solar")?;
        let is_adu: &BooleanArray = col(&batch, "is_adu")?;
        let total_du: &Int64Array = col(&batch, "total_du")?;
        let source_system: &StringArray = col(&batch, "source_system")?;

        for i in 0..batch.num_rows() {
            records.push(PermitRecord {
                approval_id: opt_str(approval_id, i),
                project_id: opt_str(project_id, i),
                development_id: opt_str(development_id, i),
                job_id: opt_str(job_id, i),
                project_type: opt_str(project_type, i),
                project_status: opt_str(project_status, i),
                project_processing_code: opt_str(project_processing_code, i),
                project_title: opt_str(project_title, i),
                project_scope: opt_str(project_scope, i),
                address: opt_str(address, i),
                apn: opt_str(apn, i),
                bc_code: opt_str(bc_code, i),
                bc_code_description: opt_str(bc_code_description, i),
                approval_type: opt_str(approval_type, i),
                approval_status: opt_str(approval_status, i),
                approval_scope: opt_str(approval_scope, i),
                permit_holder: opt_str(permit_holder, i),
                date_project_create: opt_date(date_project_create, i),
                date_project_complete: opt_date(date_project_complete, i),
                date_approval_create: opt_date(date_approval_create, i),
                date_approval_issue: opt_date(date_approval_issue, i),
                date_approval_expire: opt_date(date_approval_expire, i),
                date_approval_close: opt_date(date_approval_close, i),
                lat: opt_f64(lat, i),
                lng: opt_f64(lng, i),
                valuation: opt_f64(valuation, i),
                du_net_change: opt_i32(du_net_change, i),
                stories: opt_i32(stories, i),
                floor_area: opt_f64(floor_area, i),
                du_extremely_low: opt_i32(du_extremely_low, i),
                du_very_low: opt_i32(du_very_low, i),
                du_low: opt_i32(du_low, i),
                du_moderate: opt_i32(du_moderate, i),
                du_above_moderate: opt_i32(du_above_moderate, i),
                du_future_demo: opt_i32(du_future_demo, i),
                du_bonus: opt_i32(du_bonus, i),
                adu_extremely_low: opt_i32(adu_extremely_low, i),
                adu_very_low: opt_i32(adu_very_low, i),
                adu_low: opt_i32(adu_low, i),
                adu_moderate: opt_i32(adu_moderate, i),
                adu_above_moderate: opt_i32(adu_above_moderate, i),
                adu_bonus: opt_i32(adu_bonus, i),
                adu_total: opt_i32(adu_total, i),
                jadu_extremely_low: opt_i32(jadu_extremely_low, i),
                jadu_very_low: opt_i32(jadu_very_low, i),
                jadu_low: opt_i32(jadu_low, i),
                jadu_moderate: opt_i32(jadu_moderate, i),
                jadu_above_moderate: opt_i32(jadu_above_moderate, i),
                jadu_bonus: opt_i32(jadu_bonus, i),
                jadu_total: opt_i32(jadu_total, i),
                zip_code: opt_str(zip_code, i),
                approval_days: opt_i64(approval_days, i),
                approval_year: opt_i32(approval_year, i),
                approval_month: opt_i32(approval_month, i).map(|m| m as u32),
                approval_type_clean: approval_type_clean.value(i).to_string(),
                is_housing: is_housing.value(i),
                is_solar: is_solar.value(i),
                is_adu: is_adu.value(i),
                total_du: total_du.value(i),
                source_system: parse_source(source_system.value(i)),
            });
        }
    }
    Ok(records)
}

// ── Aggregate tables ──

fn monthly_volume_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("year", DataType::Int32, false),
        Field::new("month", DataType::Int32, false),
        Field::new("approval_type_clean", DataType::Utf8, false),
        Field::new("source_system", DataType::Utf8, false),
        Field::new("permit_count", DataType::Int64, false),
    ]))
}

pub fn write_monthly_volume(path: &Path, rows: &[MonthlyVolumeRow]) -> Result<()> {
    write_batch(
        path,
        monthly_volume_schema(),
        vec![
            Arc::new(Int32Array::from_iter_values(rows.iter().map(|r| r.year))),
            Arc::new(Int32Array::from_iter_values(
                rows.iter().map(|r| r.month as i32),
            )),
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|r| r.approval_type_clean.as_str()),
            )),
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|r| r.source_system.as_str()),
            )),
            Arc::new(Int64Array::from_iter_values(
                rows.iter().map(|r| r.permit_count),
            )),
        ],
    )
}

pub fn read_monthly_volume(path: &Path) -> Result<Vec<MonthlyVolumeRow>> {
    let mut rows = Vec::new();
    for batch in read_batches(path)? {
        let year: &Int32Array = col(&batch, "year")?;
        let month: &Int32Array = col(&batch, "month")?;
        let type_clean: &StringArray = col(&batch, "approval_type_clean")?;
        let source: &StringArray = col(&batch, "source_system")?;
        let count: &Int64Array = col(&batch, "permit_count")?;
        for i in 0..batch.num_rows() {
            rows.push(MonthlyVolumeRow {
                year: year.value(i),
                month: month.value(i) as u32,
                approval_type_clean: type_clean.value(i).to_string(),
                source_system: source.value(i).to_string(),
                permit_count: count.value(i),
            });
        }
    }
    Ok(rows)
}

fn housing_units_schema() -> Arc<Schema> {
    let sum = |name: &str| Field::new(name, DataType::Int64, false);
    Arc::new(Schema::new(vec![
        Field::new("year", DataType::Int32, false),
        sum("du_extremely_low"),
        sum("du_very_low"),
        sum("du_low"),
        sum("du_moderate"),
        sum("du_above_moderate"),
        sum("adu_total"),
        sum("jadu_total"),
        sum("total_du"),
    ]))
}

pub fn write_housing_units(path: &Path, rows: &[HousingUnitsRow]) -> Result<()> {
    let sum = |f: fn(&HousingUnitsRow) -> i64| -> ArrayRef {
        Arc::new(Int64Array::from_iter_values(rows.iter().map(f)))
    };
    write_batch(
        path,
        housing_units_schema(),
        vec![
            Arc::new(Int32Array::from_iter_values(rows.iter().map(|r| r.year))),
            sum(|r| r.du_extremely_low),
            sum(|r| r.du_very_low),
            sum(|r| r.du_low),
            sum(|r| r.du_moderate),
            sum(|r| r.du_above_moderate),
            sum(|r| r.adu_total),
            sum(|r| r.jadu_total),
            sum(|r| r.total_du),
        ],
    )
}

pub fn read_housing_units(path: &Path) -> Result<Vec<HousingUnitsRow>> {
    let mut rows = Vec::new();
    for batch in read_batches(path)? {
        let year: &Int32Array = col(&batch, "year")?;
        let du_extremely_low: &Int64Array = col(&batch, "du_extremely_low")?;
        let du_very_low: &Int64Array = col(&batch, "du_very_low")?;
        let du_low: &Int64Array = col(&batch, "du_low")?;
        let du_moderate: &Int64Array = col(&batch, "du_moderate")?;
        let du_above_moderate: &Int64Array = col(&batch, "du_above_moderate")?;
        let adu_total: &Int64Array = col(&batch, "adu_total")?;
        let jadu_total: &Int64Array = col(&batch, "jadu_total")?;
        let total_du: &Int64Array = col(&batch, "total_du")?;
        for i in 0..batch.num_rows() {
            rows.push(HousingUnitsRow {
                year: year.value(i),
                du_extremely_low: du_extremely_low.value(i),
                du_very_low: du_very_low.value(i),
                du_low: du_low.value(i),
                du_moderate: du_moderate.value(i),
                du_above_moderate: du_above_moderate.value(i),
                adu_total: adu_total.value(i),
                jadu_total: jadu_total.value(i),
                total_du: total_du.value(i),
            });
        }
    }
    Ok(rows)
}

fn timelines_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("year", DataType::Int32, false),
        Field::new("approval_type_clean", DataType::Utf8, false),
        Field::new("zip_code", DataType::Utf8, true),
        Field::new("permit_count", DataType::Int64, false),
        Field::new("median_days", DataType::Float64, false),
        Field::new("avg_days", DataType::Int64, false),
        Field::new("p90_days", DataType::Int64, false),
    ]))
}

pub fn write_timelines(path: &Path, rows: &[TimelineRow]) -> Result<()> {
    write_batch(
        path,
        timelines_schema(),
        vec![
            Arc::new(Int32Array::from_iter_values(rows.iter().map(|r| r.year))),
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|r| r.approval_type_clean.as_str()),
            )),
            Arc::new(StringArray::from(
                rows.iter().map(|r| r.zip_code.as_deref()).collect::<Vec<_>>(),
            )),
            Arc::new(Int64Array::from_iter_values(
                rows.iter().map(|r| r.permit_count),
            )),
            Arc::new(Float64Array::from_iter_values(
                rows.iter().map(|r| r.median_days),
            )),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.avg_days))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.p90_days))),
        ],
    )
}

pub fn read_timelines(path: &Path) -> Result<Vec<TimelineRow>> {
    let mut rows = Vec::new();
    for batch in read_batches(path)? {
        let year: &Int32Array = col(&batch, "year")?;
        let type_clean: &StringArray = col(&batch, "approval_type_clean")?;
        let zip: &StringArray = col(&batch, "zip_code")?;
        let count: &Int64Array = col(&batch, "permit_count")?;
        let median: &Float64Array = col(&batch, "median_days")?;
        let avg: &Int64Array = col(&batch, "avg_days")?;
        let p90: &Int64Array = col(&batch, "p90_days")?;
        for i in 0..batch.num_rows() {
            rows.push(TimelineRow {
                year: year.value(i),
                approval_type_clean: type_clean.value(i).to_string(),
                zip_code: opt_str(zip, i),
                permit_count: count.value(i),
                median_days: median.value(i),
                avg_days: avg.value(i),
                p90_days: p90.value(i),
            });
        }
    }
    Ok(rows)
}

fn solar_monthly_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("year", DataType::Int32, false),
        Field::new("month", DataType::Int32, false),
        Field::new("zip_code", DataType::Utf8, true),
        Field::new("permit_count", DataType::Int64, false),
        Field::new("cumulative_total", DataType::Int64, false),
    ]))
}

pub fn write_solar_monthly(path: &Path, rows: &[SolarMonthlyRow]) -> Result<()> {
    write_batch(
        path,
        solar_monthly_schema(),
        vec![
            Arc::new(Int32Array::from_iter_values(rows.iter().map(|r| r.year))),
            Arc::new(Int32Array::from_iter_values(
                rows.iter().map(|r| r.month as i32),
            )),
            Arc::new(StringArray::from(
                rows.iter().map(|r| r.zip_code.as_deref()).collect::<Vec<_>>(),
            )),
            Arc::new(Int64Array::from_iter_values(
                rows.iter().map(|r| r.permit_count),
            )),
            Arc::new(Int64Array::from_iter_values(
                rows.iter().map(|r| r.cumulative_total),
            )),
        ],
    )
}

pub fn read_solar_monthly(path: &Path) -> Result<Vec<SolarMonthlyRow>> {
    let mut rows = Vec::new();
    for batch in read_batches(path)? {
        let year: &Int32Array = col(&batch, "year")?;
        let month: &Int32Array = col(&batch, "month")?;
        let zip: &StringArray = col(&batch, "zip_code")?;
        let count: &Int64Array = col(&batch, "permit_count")?;
        let cumulative: &Int64Array = col(&batch, "cumulative_total")?;
        for i in 0..batch.num_rows() {
            rows.push(SolarMonthlyRow {
                year: year.value(i),
                month: month.value(i) as u32,
                zip_code: opt_str(zip, i),
                permit_count: count.value(i),
                cumulative_total: cumulative.value(i),
            });
        }
    }
    Ok(rows)
}

fn map_points_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("lat", DataType::Float64, false),
        Field::new("lng", DataType::Float64, false),
        Field::new("approval_type_clean", DataType::Utf8, false),
        Field::new("approval_year", DataType::Int32, true),
        Field::new("valuation", DataType::Float64, true),
        Field::new("total_du", DataType::Int64, false),
        Field::new("is_housing", DataType::Boolean, false),
        Field::new("is_solar", DataType::Boolean, false),
        Field::new("zip_code", DataType::Utf8, true),
    ]))
}

pub fn write_map_points(path: &Path, rows: &[MapPointRow]) -> Result<()> {
    write_batch(
        path,
        map_points_schema(),
        vec![
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.lat))),
            Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.lng))),
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|r| r.approval_type_clean.as_str()),
            )),
            Arc::new(Int32Array::from(
                rows.iter().map(|r| r.approval_year).collect::<Vec<_>>(),
            )),
            Arc::new(Float64Array::from(
                rows.iter().map(|r| r.valuation).collect::<Vec<_>>(),
            )),
            Arc::new(Int64Array::from_iter_values(
                rows.iter().map(|r| r.total_du),
            )),
            Arc::new(BooleanArray::from(
                rows.iter().map(|r| r.is_housing).collect::<Vec<_>>(),
            )),
            Arc::new(BooleanArray::from(
                rows.iter().map(|r| r.is_solar).collect::<Vec<_>>(),
            )),
            Arc::new(StringArray::from(
                rows.iter().map(|r| r.zip_code.as_deref()).collect::<Vec<_>>(),
            )),
        ],
    )
}

pub fn read_map_points(path: &Path) -> Result<Vec<MapPointRow>> {
    let mut rows = Vec::new();
    for batch in read_batches(path)? {
        let lat: &Float64Array = col(&batch, "lat")?;
        let lng: &Float64Array = col(&batch, "lng")?;
        let type_clean: &StringArray = col(&batch, "approval_type_clean")?;
        let year: &Int32Array = col(&batch, "approval_year")?;
        let valuation: &Float64Array = col(&batch, "valuation")?;
        let total_du: &Int64Array = col(&batch, "total_du")?;
        let is_housing: &BooleanArray = col(&batch, "is_housing")?;
        let is_solar: &BooleanArray = col(&batch, "is_solar")?;
        let zip: &StringArray = col(&batch, "zip_code")?;
        for i in 0..batch.num_rows() {
            rows.push(MapPointRow {
                lat: lat.value(i),
                lng: lng.value(i),
                approval_type_clean: type_clean.value(i).to_string(),
                approval_year: opt_i32(year, i),
                valuation: opt_f64(valuation, i),
                total_du: total_du.value(i),
                is_housing: is_housing.value(i),
                is_solar: is_solar.value(i),
                zip_code: opt_str(zip, i),
            });
        }
    }
    Ok(rows)
}

fn top_types_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("approval_type_clean", DataType::Utf8, false),
        Field::new("permit_count", DataType::Int64, false),
        Field::new("avg_valuation", DataType::Int64, true),
        Field::new("median_approval_days", DataType::Float64, true),
    ]))
}

pub fn write_top_types(path: &Path, rows: &[TopTypeRow]) -> Result<()> {
    write_batch(
        path,
        top_types_schema(),
        vec![
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|r| r.approval_type_clean.as_str()),
            )),
            Arc::new(Int64Array::from_iter_values(
                rows.iter().map(|r| r.permit_count),
            )),
            Arc::new(Int64Array::from(
                rows.iter().map(|r| r.avg_valuation).collect::<Vec<_>>(),
            )),
            Arc::new(Float64Array::from(
                rows.iter()
                    .map(|r| r.median_approval_days)
                    .collect::<Vec<_>>(),
            )),
        ],
    )
}

pub fn read_top_types(path: &Path) -> Result<Vec<TopTypeRow>> {
    let mut rows = Vec::new();
    for batch in read_batches(path)? {
        let type_clean: &StringArray = col(&batch, "approval_type_clean")?;
        let count: &Int64Array = col(&batch, "permit_count")?;
        let avg_valuation: &Int64Array = col(&batch, "avg_valuation")?;
        let median_days: &Float64Array = col(&batch, "median_approval_days")?;
        for i in 0..batch.num_rows() {
            rows.push(TopTypeRow {
                approval_type_clean: type_clean.value(i).to_string(),
                permit_count: count.value(i),
                avg_valuation: opt_i64(avg_valuation, i),
                median_approval_days: opt_f64(median_days, i),
            });
        }
    }
    Ok(rows)
}

fn zip_construction_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("zip_code", DataType::Utf8, false),
        Field::new("year", DataType::Int32, false),
        Field::new("permit_count", DataType::Int64, false),
        Field::new("total_valuation", DataType::Int64, false),
        Field::new("total_du", DataType::Int64, false),
    ]))
}

pub fn write_zip_construction(path: &Path, rows: &[ZipConstructionRow]) -> Result<()> {
    write_batch(
        path,
        zip_construction_schema(),
        vec![
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|r| r.zip_code.as_str()),
            )),
            Arc::new(Int32Array::from_iter_values(rows.iter().map(|r| r.year))),
            Arc::new(Int64Array::from_iter_values(
                rows.iter().map(|r| r.permit_count),
            )),
            Arc::new(Int64Array::from_iter_values(
                rows.iter().map(|r| r.total_valuation),
            )),
            Arc::new(Int64Array::from_iter_values(
                rows.iter().map(|r| r.total_du),
            )),
        ],
    )
}

pub fn read_zip_construction(path: &Path) -> Result<Vec<ZipConstructionRow>> {
    let mut rows = Vec::new();
    for batch in read_batches(path)? {
        let zip: &StringArray = col(&batch, "zip_code")?;
        let year: &Int32Array = col(&batch, "year")?;
        let count: &Int64Array = col(&batch, "permit_count")?;
        let valuation: &Int64Array = col(&batch, "total_valuation")?;
        let total_du: &Int64Array = col(&batch, "total_du")?;
        for i in 0..batch.num_rows() {
            rows.push(ZipConstructionRow {
                zip_code: zip.value(i).to_string(),
                year: year.value(i),
                permit_count: count.value(i),
                total_valuation: valuation.value(i),
                total_du: total_du.value(i),
            });
        }
    }
    Ok(rows)
}

fn bc_code_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("year", DataType::Int32, false),
        Field::new("source_system", DataType::Utf8, false),
        Field::new("bc_code", DataType::Utf8, false),
        Field::new("bc_code_description", DataType::Utf8, true),
        Field::new("permit_count", DataType::Int64, false),
        Field::new("total_du", DataType::Int64, false),
        Field::new("total_valuation", DataType::Int64, false),
    ]))
}

pub fn write_bc_code_summary(path: &Path, rows: &[BcCodeSummaryRow]) -> Result<()> {
    write_batch(
        path,
        bc_code_schema(),
        vec![
            Arc::new(Int32Array::from_iter_values(rows.iter().map(|r| r.year))),
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|r| r.source_system.as_str()),
            )),
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|r| r.bc_code.as_str()),
            )),
            Arc::new(StringArray::from(
                rows.iter()
                    .map(|r| r.bc_code_description.as_deref())
                    .collect::<Vec<_>>(),
            )),
            Arc::new(Int64Array::from_iter_values(
                rows.iter().map(|r| r.permit_count),
            )),
            Arc::new(Int64Array::from_iter_values(
                rows.iter().map(|r| r.total_du),
            )),
            Arc::new(Int64Array::from_iter_values(
                rows.iter().map(|r| r.total_valuation),
            )),
        ],
    )
}

pub fn read_bc_code_summary(path: &Path) -> Result<Vec<BcCodeSummaryRow>> {
    let mut rows = Vec::new();
    for batch in read_batches(path)? {
        let year: &Int32Array = col(&batch, "year")?;
        let source: &StringArray = col(&batch, "source_system")?;
        let code: &StringArray = col(&batch, "bc_code")?;
        let description: &StringArray = col(&batch, "bc_code_description")?;
        let count: &Int64Array = col(&batch, "permit_count")?;
        let total_du: &Int64Array = col(&batch, "total_du")?;
        let valuation: &Int64Array = col(&batch, "total_valuation")?;
        for i in 0..batch.num_rows() {
            rows.push(BcCodeSummaryRow {
                year: year.value(i),
                source_system: source.value(i).to_string(),
                bc_code: code.value(i).to_string(),
                bc_code_description: opt_str(description, i),
                permit_count: count.value(i),
                total_du: total_du.value(i),
                total_valuation: valuation.value(i),
            });
        }
    }
    Ok(rows)
}

fn permit_summary_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("year", DataType::Int32, false),
        Field::new("approval_type_clean", DataType::Utf8, false),
        Field::new("zip_code", DataType::Utf8, true),
        Field::new("source_system", DataType::Utf8, false),
        Field::new("permit_count", DataType::Int64, false),
        Field::new("total_du", DataType::Int64, false),
        Field::new("total_valuation", DataType::Int64, false),
        Field::new("count_with_days", DataType::Int64, false),
        Field::new("sum_approval_days", DataType::Int64, true),
        Field::new("median_approval_days", DataType::Float64, true),
    ]))
}

pub fn write_permit_summary(path: &Path, rows: &[PermitSummaryRow]) -> Result<()> {
    write_batch(
        path,
        permit_summary_schema(),
        vec![
            Arc::new(Int32Array::from_iter_values(rows.iter().map(|r| r.year))),
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|r| r.approval_type_clean.as_str()),
            )),
            Arc::new(StringArray::from(
                rows.iter().map(|r| r.zip_code.as_deref()).collect::<Vec<_>>(),
            )),
            Arc::new(StringArray::from_iter_values(
                rows.iter().map(|r| r.source_system.as_str()),
            )),
            Arc::new(Int64Array::from_iter_values(
                rows.iter().map(|r| r.permit_count),
            )),
            Arc::new(Int64Array::from_iter_values(
                rows.iter().map(|r| r.total_du),
            )),
            Arc::new(Int64Array::from_iter_values(
                rows.iter().map(|r| r.total_valuation),
            )),
            Arc::new(Int64Array::from_iter_values(
                rows.iter().map(|r| r.count_with_days),
            )),
            Arc::new(Int64Array::from(
                rows.iter().map(|r| r.sum_approval_days).collect::<Vec<_>>(),
            )),
            Arc::new(Float64Array::from(
                rows.iter()
                    .map(|r| r.median_approval_days)
                    .collect::<Vec<_>>(),
            )),
        ],
    )
}

pub fn read_permit_summary(path: &Path) -> Result<Vec<PermitSummaryRow>> {
    let mut rows = Vec::new();
    for batch in read_batches(path)? {
        let year: &Int32Array = col(&batch, "year")?;
        let type_clean: &StringArray = col(&batch, "approval_type_clean")?;
        let zip: &StringArray = col(&batch, "zip_code")?;
        let source: &StringArray = col(&batch, "source_system")?;
        let count: &Int64Array = col(&batch, "permit_count")?;
        let total_du: &Int64Array = col(&batch, "total_du")?;
        let valuation: &Int64Array = col(&batch, "total_valuation")?;
        let count_with_days: &Int64Array = col(&batch, "count_with_days")?;
        let sum_days: &Int64Array = col(&batch, "sum_approval_days")?;
        let median_days: &Float64Array = col(&batch, "median_approval_days")?;
        for i in 0..batch.num_rows() {
            rows.push(PermitSummaryRow {
                year: year.value(i),
                approval_type_clean: type_clean.value(i).to_string(),
                zip_code: opt_str(zip, i),
                source_system: source.value(i).to_string(),
                permit_count: count.value(i),
                total_du: total_du.value(i),
                total_valuation: valuation.value(i),
                count_with_days: count_with_days.value(i),
                sum_approval_days: opt_i64(sum_days, i),
                median_approval_days: opt_f64(median_days, i),
            });
        }
    }
    Ok(rows)
}

/// File names for the nine aggregate outputs, in build order.
pub const AGGREGATE_FILES: &[&str] = &[
    "permit_volume_monthly.parquet",
    "housing_units_by_year.parquet",
    "approval_timelines.parquet",
    "solar_permits_monthly.parquet",
    "map_points.parquet",
    "top_permit_types.parquet",
    "construction_by_zip.parquet",
    "bc_code_summary.parquet",
    "permit_summary.parquet",
];

/// Write all nine aggregate files into `agg_dir`.
pub fn write_aggregates(agg_dir: &Path, set: &AggregateSet) -> Result<()> {
    write_monthly_volume(&agg_dir.join(AGGREGATE_FILES[0]), &set.permit_volume_monthly)?;
    write_housing_units(&agg_dir.join(AGGREGATE_FILES[1]), &set.housing_units_by_year)?;
    write_timelines(&agg_dir.join(AGGREGATE_FILES[2]), &set.approval_timelines)?;
    write_solar_monthly(&agg_dir.join(AGGREGATE_FILES[3]), &set.solar_permits_monthly)?;
    write_map_points(&agg_dir.join(AGGREGATE_FILES[4]), &set.map_points)?;
    write_top_types(&agg_dir.join(AGGREGATE_FILES[5]), &set.top_permit_types)?;
    write_zip_construction(&agg_dir.join(AGGREGATE_FILES[6]), &set.construction_by_zip)?;
    write_bc_code_summary(&agg_dir.join(AGGREGATE_FILES[7]), &set.bc_code_summary)?;
    write_permit_summary(&agg_dir.join(AGGREGATE_FILES[8]), &set.permit_summary)?;
    Ok(())
}
