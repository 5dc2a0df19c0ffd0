use std::collections::HashMap;

use tracing::debug;

use crate::domain::{PermitRecord, SourceSystem};

/// True when `candidate` should replace `incumbent` as the authoritative
/// record for a shared approval id.
///
/// Ranking: latest `date_approval_close` first with missing dates ordered
/// last, then `current` over `legacy`. A candidate tied on both loses, so
/// the earliest record in input order is kept. The tie-break is an explicit
/// policy: both systems occasionally re-export the same approval unchanged,
/// and the replacement system's copy is the maintained one.
fn beats(candidate: &PermitRecord, incumbent: &PermitRecord) -> bool {
    match (candidate.date_approval_close, incumbent.date_approval_close) {
        (Some(a), Some(b)) if a != b => a > b,
        (Some(_), None) => true,
        (None, Some(_)) => false,
        // Equal close dates, or both missing
        _ => {
            candidate.source_system == SourceSystem::Current
                && incumbent.source_system == SourceSystem::Legacy
        }
    }
}

/// Collapse records sharing an `approval_id` down to one authoritative row.
///
/// Output preserves each survivor's first-occurrence position, so the result
/// is deterministic for a given input order. Records without an approval id
/// pass through untouched.
pub fn dedup(records: Vec<PermitRecord>) -> Vec<PermitRecord> {
    let before = records.len();
    let mut out: Vec<PermitRecord> = Vec::with_capacity(records.len());
    let mut index_by_id: HashMap<String, usize> = HashMap::new();

    for record in records {
        let Some(id) = record.approval_id.clone() else {
            out.push(record);
            continue;
        };
        match index_by_id.get(&id) {
            Some(&slot) => {
                if beats(&record, &out[slot]) {
                    out[slot] = record;
                }
            }
            None => {
                index_by_id.insert(id, out.len());
                out.push(record);
            }
        }
    }

    debug!("Dedup: {} -> {} records", before, out.len());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(id: &str, close: Option<(i32, u32, u32)>, system: SourceSystem) -> PermitRecord {
        PermitRecord {
            approval_id: Some(id.to_string()),
            date_approval_close: close.and_then(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d)),
            source_system: system,
            ..PermitRecord::default()
        }
    }

    #[test]
    fn later_close_date_wins() {
        let out = dedup(vec![
            record("A-1", Some((2021, 6, 1)), SourceSystem::Legacy),
            record("A-1", Some((2023, 2, 15)), SourceSystem::Current),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].date_approval_close, NaiveDate::from_ymd_opt(2023, 2, 15));
    }

    #[test]
    fn missing_close_date_sorts_after_any_real_date() {
        let out = dedup(vec![
            record("A-1", None, SourceSystem::Current),
            record("A-1", Some((2019, 1, 1)), SourceSystem::Legacy),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source_system, SourceSystem::Legacy);
    }

    #[test]
    fn exact_tie_prefers_current_system() {
        let out = dedup(vec![
            record("A-1", Some((2022, 8, 8)), SourceSystem::Legacy),
            record("A-1", Some((2022, 8, 8)), SourceSystem::Current),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source_system, SourceSystem::Current);

        // Both still open: same policy
        let out = dedup(vec![
            record("A-2", None, SourceSystem::Legacy),
            record("A-2", None, SourceSystem::Current),
        ]);
        assert_eq!(out[0].source_system, SourceSystem::Current);
    }

    #[test]
    fn same_system_tie_keeps_first_in_input_order() {
        let mut first = record("A-1", None, SourceSystem::Current);
        first.job_id = Some("J-1".to_string());
        let mut second = record("A-1", None, SourceSystem::Current);
        second.job_id = Some("J-2".to_string());

        let out = dedup(vec![first, second]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].job_id.as_deref(), Some("J-1"));
    }

    #[test]
    fn survivor_keeps_first_occurrence_position() {
        let out = dedup(vec![
            record("A-1", Some((2020, 1, 1)), SourceSystem::Legacy),
            record("B-1", None, SourceSystem::Legacy),
            record("A-1", Some((2022, 1, 1)), SourceSystem::Current),
        ]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].approval_id.as_deref(), Some("A-1"));
        assert_eq!(out[0].source_system, SourceSystem::Current);
        assert_eq!(out[1].approval_id.as_deref(), Some("B-1"));
    }

    #[test]
    fn records_without_ids_pass_through() {
        let anon = PermitRecord::default();
        let out = dedup(vec![anon.clone(), anon]);
        assert_eq!(out.len(), 2);
    }
}
