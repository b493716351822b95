//! Data module - dataset loading, staging, and record conversion

mod loader;
pub mod records;

pub use loader::{read_staged, DatasetLoader, DatasetSummary};
