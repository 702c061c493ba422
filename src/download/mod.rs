//! Media acquisition: URL normalization, strategy selection, and extraction

pub mod job;
pub mod normalize;
pub mod progress;
pub mod selector;
pub mod source;
pub mod ytdlp_errors;

// Re-exports for convenience
pub use job::{JobFiles, JobId};
pub use normalize::normalize;
pub use progress::ProgressCallback;
pub use selector::{MediaRequest, Mode, RetrievalPlan, Site, Strategy, StrategySelector};
pub use source::{ExtractorRegistry, MediaExtractor, RawMedia};
