//! Core library: data model, configuration, content normalization,
//! classification and the bucket scan pipeline.

pub mod classifier;
pub mod config;
pub mod error;
pub mod models;
pub mod normalizer;
pub mod pipeline;

pub use error::PipelineError;
pub use pipeline::{PipelineSummary, RunOutcome, RunState, Scanner};
