use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Which permitting system a record came from. The two systems overlap for
/// several years, so the same approval can arrive from both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceSystem {
    #[default]
    Legacy,
    Current,
}

impl SourceSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceSystem::Legacy => "legacy",
            SourceSystem::Current => "current",
        }
    }
}

impl std::fmt::Display for SourceSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One approval action, in the canonical shape shared by both source systems.
///
/// Every column either system lacks is carried as `None` so the union of the
/// two sources has a single schema. The `derived` block at the bottom is
/// filled in by the field deriver, not the normalizer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PermitRecord {
    // Identity
    pub approval_id: Option<String>,
    pub project_id: Option<String>,
    pub development_id: Option<String>,
    pub job_id: Option<String>,

    // Descriptive
    pub project_type: Option<String>,
    pub project_status: Option<String>,
    pub project_processing_code: Option<String>,
    pub project_title: Option<String>,
    pub project_scope: Option<String>,
    pub address: Option<String>,
    pub apn: Option<String>,
    pub bc_code: Option<String>,
    pub bc_code_description: Option<String>,
    pub approval_type: Option<String>,
    pub approval_status: Option<String>,
    pub approval_scope: Option<String>,
    pub permit_holder: Option<String>,

    // Temporal
    pub date_project_create: Option<NaiveDate>,
    pub date_project_complete: Option<NaiveDate>,
    pub date_approval_create: Option<NaiveDate>,
    pub date_approval_issue: Option<NaiveDate>,
    pub date_approval_expire: Option<NaiveDate>,
    pub date_approval_close: Option<NaiveDate>,

    // Spatial
    pub lat: Option<f64>,
    pub lng: Option<f64>,

    // Quantitative
    pub valuation: Option<f64>,
    pub du_net_change: Option<i32>,
    pub stories: Option<i32>,
    pub floor_area: Option<f64>,
    pub du_extremely_low: Option<i32>,
    pub du_very_low: Option<i32>,
    pub du_low: Option<i32>,
    pub du_moderate: Option<i32>,
    pub du_above_moderate: Option<i32>,
    pub du_future_demo: Option<i32>,
    pub du_bonus: Option<i32>,
    pub adu_extremely_low: Option<i32>,
    pub adu_very_low: Option<i32>,
    pub adu_low: Option<i32>,
    pub adu_moderate: Option<i32>,
    pub adu_above_moderate: Option<i32>,
    pub adu_bonus: Option<i32>,
    pub adu_total: Option<i32>,
    pub jadu_extremely_low: Option<i32>,
    pub jadu_very_low: Option<i32>,
    pub jadu_low: Option<i32>,
    pub jadu_moderate: Option<i32>,
    pub jadu_above_moderate: Option<i32>,
    pub jadu_bonus: Option<i32>,
    pub jadu_total: Option<i32>,

    // Derived (see pipeline::derive)
    pub zip_code: Option<String>,
    pub approval_days: Option<i64>,
    pub approval_year: Option<i32>,
    pub approval_month: Option<u32>,
    pub approval_type_clean: String,
    pub is_housing: bool,
    pub is_solar: bool,
    pub is_adu: bool,
    pub total_du: i64,

    // Provenance
    pub source_system: SourceSystem,
}
