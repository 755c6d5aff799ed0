pub mod assets;
pub mod config;
pub mod constants;
pub mod engine;
pub mod errors;
pub mod events;
pub mod fifo;
pub mod fx;
pub mod linking;
pub mod pipeline;
pub mod taxes;
pub mod utils;

pub use config::EngineConfig;
pub use errors::{Error, Result};
pub use pipeline::{run_pipeline, PipelineInput, PipelineOutput};
