//! Transcoding: probe, plan, and run the encoder

pub mod decision;
pub mod executor;
pub mod probe;

pub use decision::{decide, output_dimensions, SizeTier, TranscodePlan};
pub use executor::{FinalFile, TranscodeExecutor};
pub use probe::{probe_media, ProbeInfo};
