/// Names and fixed business values shared across the pipeline.

// Raw source identifiers (used in CLI output, config keys, and file names)
pub const SET1_ACTIVE: &str = "set1_active";
pub const SET1_CLOSED: &str = "set1_closed";
pub const SET2_ACTIVE: &str = "set2_active";
pub const SET2_CLOSED: &str = "set2_closed";

// Service-area bounding box (decimal degrees, San Diego)
pub const LAT_MIN: f64 = 32.5;
pub const LAT_MAX: f64 = 33.3;
pub const LNG_MIN: f64 = -117.7;
pub const LNG_MAX: f64 = -116.8;

// Building-classification code values used by the field deriver
pub const ADU_BC_CODE: &str = "4333";
pub const NEW_RESIDENTIAL_BC_PREFIX: &str = "10";

// Output file names
pub const PERMITS_PARQUET: &str = "permits.parquet";
