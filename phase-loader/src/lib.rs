pub mod config;
pub mod metrics_server;
pub mod observability;
pub mod pipeline;
pub mod retry;
pub mod sinks;
pub mod sources;
pub mod staging;
pub mod transform;

pub use pipeline::{Envelope, Pipeline};
