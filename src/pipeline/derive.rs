use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::constants::{ADU_BC_CODE, NEW_RESIDENTIAL_BC_PREFIX};
use crate::domain::PermitRecord;

/// Five-digit zips for the San Diego area start with 91 or 92.
static ZIP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"9[12]\d{3}").unwrap());

/// The ordered classification table for `approval_type_clean`.
///
/// Evaluated top-down against the upper-cased raw type; the FIRST rule whose
/// keyword list matches wins. The order is load-bearing: solar permits are
/// issued as building permits, so the solar rule must sit above the generic
/// building-permit rule. Keep this a single ordered table so the priority
/// cannot be reshuffled by accident.
pub const TYPE_RULES: &[(&str, &[&str])] = &[
    ("Solar/PV", &["PHOTOVOLTAIC", "PV", "SOLAR"]),
    ("Building Permit", &["COMBINATION BUILDING", "BUILDING PERMIT"]),
    ("Electrical", &["ELECTRICAL"]),
    ("Plumbing", &["PLUMBING"]),
    ("Mechanical", &["MECHANICAL"]),
    ("Fire", &["FIRE"]),
    ("Right of Way", &["RIGHT OF WAY", "ROW"]),
    ("Sign", &["SIGN"]),
];

pub const TYPE_OTHER: &str = "Other";

fn matches_any(upper: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|kw| upper.contains(kw))
}

/// Case-insensitive, first-match-wins classifier over the raw approval type.
pub fn classify_approval_type(raw: Option<&str>) -> &'static str {
    let Some(raw) = raw else { return TYPE_OTHER };
    let upper = raw.trim().to_uppercase();
    for (label, keywords) in TYPE_RULES {
        if matches_any(&upper, keywords) {
            return label;
        }
    }
    TYPE_OTHER
}

/// Same keyword test as the "Solar/PV" classification branch.
pub fn is_solar_type(raw: Option<&str>) -> bool {
    match raw {
        Some(raw) => matches_any(&raw.trim().to_uppercase(), TYPE_RULES[0].1),
        None => false,
    }
}

/// Building-permit family test used by the housing flag. Independent of the
/// classifier label: a "SOLAR BUILDING PERMIT" classifies as Solar/PV but is
/// still building-permit family here.
fn is_building_family(raw: Option<&str>) -> bool {
    match raw {
        Some(raw) => {
            let upper = raw.trim().to_uppercase();
            upper.contains("BUILDING PERMIT") || upper.contains("COMBINATION BUILDING")
        }
        None => false,
    }
}

/// First San-Diego-area zip found in the free-text address.
pub fn zip_from_address(address: Option<&str>) -> Option<String> {
    ZIP_RE
        .find(address?)
        .map(|m| m.as_str().to_string())
}

/// Days from approval creation to issue. Negative spans are data errors and
/// read as unknown, not as zero.
pub fn approval_days(
    create: Option<NaiveDate>,
    issue: Option<NaiveDate>,
) -> Option<i64> {
    let days = (issue? - create?).num_days();
    if days >= 0 {
        Some(days)
    } else {
        None
    }
}

fn n(v: Option<i32>) -> i64 {
    v.unwrap_or(0) as i64
}

/// Units countable toward the housing flag: the five income categories plus
/// ADU/JADU totals. Deliberately excludes future-demolition and bonus units.
fn housing_unit_sum(rec: &PermitRecord) -> i64 {
    n(rec.du_extremely_low)
        + n(rec.du_very_low)
        + n(rec.du_low)
        + n(rec.du_moderate)
        + n(rec.du_above_moderate)
        + n(rec.adu_total)
        + n(rec.jadu_total)
}

/// Total dwelling units: every income category, future demolition, bonus,
/// and the ADU/JADU totals, with missing constituents counted as zero.
pub fn total_du(rec: &PermitRecord) -> i64 {
    n(rec.du_extremely_low)
        + n(rec.du_very_low)
        + n(rec.du_low)
        + n(rec.du_moderate)
        + n(rec.du_above_moderate)
        + n(rec.du_future_demo)
        + n(rec.du_bonus)
        + n(rec.adu_total)
        + n(rec.jadu_total)
}

/// Fill in every derived field on a normalized record. Pure function of the
/// record's own fields; no external state.
pub fn enrich(rec: &mut PermitRecord) {
    rec.zip_code = zip_from_address(rec.address.as_deref());
    rec.approval_days = approval_days(rec.date_approval_create, rec.date_approval_issue);

    // Year/month come from the issue date, falling back to creation
    let period_date = rec.date_approval_issue.or(rec.date_approval_create);
    rec.approval_year = period_date.map(|d| d.year());
    rec.approval_month = period_date.map(|d| d.month());

    rec.approval_type_clean = classify_approval_type(rec.approval_type.as_deref()).to_string();
    rec.is_solar = is_solar_type(rec.approval_type.as_deref());

    let new_residential = rec
        .bc_code
        .as_deref()
        .is_some_and(|c| c.starts_with(NEW_RESIDENTIAL_BC_PREFIX));
    rec.is_housing = new_residential
        || (is_building_family(rec.approval_type.as_deref()) && housing_unit_sum(rec) > 0);

    rec.is_adu = rec.bc_code.as_deref() == Some(ADU_BC_CODE)
        || n(rec.adu_total) > 0
        || n(rec.jadu_total) > 0;

    rec.total_du = total_du(rec);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(approval_type: &str) -> PermitRecord {
        PermitRecord {
            approval_type: Some(approval_type.to_string()),
            ..PermitRecord::default()
        }
    }

    #[test]
    fn classifier_order_is_exactly_the_documented_priority() {
        let labels: Vec<&str> = TYPE_RULES.iter().map(|(label, _)| *label).collect();
        assert_eq!(
            labels,
            vec![
                "Solar/PV",
                "Building Permit",
                "Electrical",
                "Plumbing",
                "Mechanical",
                "Fire",
                "Right of Way",
                "Sign",
            ]
        );
    }

    #[test]
    fn solar_beats_building_permit_on_adversarial_strings() {
        assert_eq!(
            classify_approval_type(Some("SOLAR PHOTOVOLTAIC BUILDING PERMIT")),
            "Solar/PV"
        );
        assert_eq!(
            classify_approval_type(Some("Combination Building Permit - PV System")),
            "Solar/PV"
        );
    }

    #[test]
    fn classifier_covers_each_branch() {
        assert_eq!(classify_approval_type(Some("Building Permit - Combination")), "Building Permit");
        assert_eq!(classify_approval_type(Some("electrical permit")), "Electrical");
        assert_eq!(classify_approval_type(Some("Plumbing Permit")), "Plumbing");
        assert_eq!(classify_approval_type(Some("HVAC Mechanical")), "Mechanical");
        assert_eq!(classify_approval_type(Some("Fire Sprinkler")), "Fire");
        assert_eq!(classify_approval_type(Some("Right of Way Permit")), "Right of Way");
        assert_eq!(classify_approval_type(Some("Sign Permit")), "Sign");
        assert_eq!(classify_approval_type(Some("Grading")), "Other");
        assert_eq!(classify_approval_type(None), "Other");
    }

    #[test]
    fn zip_extraction_requires_area_prefix() {
        assert_eq!(
            zip_from_address(Some("500 B St, San Diego, CA 92101")),
            Some("92101".to_string())
        );
        assert_eq!(
            zip_from_address(Some("1 Main St, La Mesa CA 91941")),
            Some("91941".to_string())
        );
        // 90210 is outside the 91/92 prefixes
        assert_eq!(zip_from_address(Some("Beverly Hills CA 90210")), None);
        assert_eq!(zip_from_address(None), None);
    }

    #[test]
    fn approval_days_rejects_negative_spans() {
        let create = NaiveDate::from_ymd_opt(2022, 5, 10);
        let issue = NaiveDate::from_ymd_opt(2022, 5, 1);
        assert_eq!(approval_days(create, issue), None);
        assert_eq!(approval_days(issue, create), Some(9));
        assert_eq!(approval_days(None, create), None);
        assert_eq!(approval_days(create, None), None);
    }

    #[test]
    fn year_month_fall_back_to_create_date() {
        let mut rec = PermitRecord {
            date_approval_create: NaiveDate::from_ymd_opt(2019, 11, 20),
            ..PermitRecord::default()
        };
        enrich(&mut rec);
        assert_eq!(rec.approval_year, Some(2019));
        assert_eq!(rec.approval_month, Some(11));

        rec.date_approval_issue = NaiveDate::from_ymd_opt(2020, 2, 3);
        enrich(&mut rec);
        assert_eq!(rec.approval_year, Some(2020));
        assert_eq!(rec.approval_month, Some(2));
    }

    #[test]
    fn total_du_sums_every_constituent_with_nulls_as_zero() {
        let rec = PermitRecord {
            du_extremely_low: Some(1),
            du_very_low: Some(2),
            du_low: None,
            du_moderate: Some(3),
            du_above_moderate: Some(4),
            du_future_demo: Some(5),
            du_bonus: Some(6),
            adu_total: Some(7),
            jadu_total: None,
            ..PermitRecord::default()
        };
        assert_eq!(total_du(&rec), 28);
    }

    #[test]
    fn housing_flag_from_residential_bc_code() {
        let mut rec = record("Demolition");
        rec.bc_code = Some("1010".to_string());
        enrich(&mut rec);
        assert!(rec.is_housing);
    }

    #[test]
    fn housing_flag_from_building_permit_with_units() {
        let mut rec = record("Building Permit");
        rec.du_low = Some(4);
        enrich(&mut rec);
        assert!(rec.is_housing);
    }

    #[test]
    fn building_permit_without_units_is_not_housing() {
        let mut rec = record("Building Permit - Combination");
        rec.bc_code = Some("3200".to_string());
        enrich(&mut rec);
        assert!(!rec.is_housing);
        assert_eq!(rec.approval_type_clean, "Building Permit");
    }

    #[test]
    fn demo_and_bonus_units_do_not_trigger_housing() {
        // total_du counts them, but the housing test excludes them
        let mut rec = record("Building Permit");
        rec.du_future_demo = Some(2);
        rec.du_bonus = Some(1);
        enrich(&mut rec);
        assert!(!rec.is_housing);
        assert_eq!(rec.total_du, 3);
    }

    #[test]
    fn adu_flag_from_code_or_counts() {
        let mut rec = record("Building Permit");
        rec.bc_code = Some(ADU_BC_CODE.to_string());
        enrich(&mut rec);
        assert!(rec.is_adu);

        let mut rec = record("Building Permit");
        rec.jadu_total = Some(1);
        enrich(&mut rec);
        assert!(rec.is_adu);

        let mut rec = record("Building Permit");
        enrich(&mut rec);
        assert!(!rec.is_adu);
    }
}
