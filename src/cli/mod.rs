pub mod audit;
pub mod ingest;
