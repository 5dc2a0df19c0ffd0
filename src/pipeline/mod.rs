// Batch pipeline: ingest, normalize, derive, dedup, geo filter, aggregate

pub mod aggregate;
pub mod dedup;
pub mod derive;
pub mod geo;
pub mod ingest;
pub mod normalize;
pub mod parquet_out;
pub mod transform;
