pub mod cache;
pub mod calendar;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod fetch;
pub mod ingest;
pub mod process;
pub mod schema;
pub mod sources;
