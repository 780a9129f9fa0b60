pub mod config;
pub mod ingest;
pub mod observability;
pub mod pipeline;
pub mod sinks;
pub mod sources;
pub mod transform;

pub use ingest::run_ingest;
pub use pipeline::{Envelope, Pipeline};
