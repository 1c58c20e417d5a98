// Module declarations
pub mod aggregate;
pub mod config;
pub mod error;
pub mod flank;
pub mod parse;
pub mod pool;
pub mod process;
pub mod progress;
pub mod tools;

pub use config::{Args, FailurePolicy, PipelineConfig};
pub use error::PipelineError;
pub use process::{run_pipeline, RunSummary};
