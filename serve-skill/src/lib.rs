//! Hierarchical serve/return skill model for professional tennis, fitted with
//! several approximate inference backends so their runtime and output quality
//! can be compared on the same data.

pub mod backends;
pub mod data_processing;
pub mod encoder;
mod error;
pub mod experiment_config;
pub mod model;
pub mod numerical;
pub mod quality;
pub mod summary;
pub mod telemetry;

pub use error::{Error, Result};
