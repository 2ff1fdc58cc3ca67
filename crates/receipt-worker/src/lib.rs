pub mod error;
pub mod pipeline;
pub mod pool;

pub use error::WorkerError;
pub use pipeline::{Pipeline, PipelineOutcome};
pub use pool::run_worker_pool;
