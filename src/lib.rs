pub mod config;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod normalize;
pub mod pipeline;
pub mod retry;
pub mod schema;
pub mod store;
pub mod tabular;
pub mod transform;
pub mod types;
