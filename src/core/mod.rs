//! Core utilities, configuration, errors, and common functionality

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod process;

// Re-exports for convenience
pub use config::PipelineConfig;
pub use error::{ExtractionFailure, PipelineError, PipelineResult};
pub use logging::{init_logger, log_tools_configuration};
