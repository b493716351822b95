//! Error types for the loader, dispatcher, and renderer.
//!
//! Each variant's `Display` output is the diagnostic text callers see, so
//! string-matching callers can keep inspecting messages while typed callers
//! branch on the enum.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),
    #[error("Error loading dataset: {0}")]
    Load(String),
}

impl From<polars::prelude::PolarsError> for LoaderError {
    fn from(e: polars::prelude::PolarsError) -> Self {
        LoaderError::Load(e.to_string())
    }
}

impl From<std::io::Error> for LoaderError {
    fn from(e: std::io::Error) -> Self {
        LoaderError::Load(e.to_string())
    }
}

impl From<calamine::Error> for LoaderError {
    fn from(e: calamine::Error) -> Self {
        LoaderError::Load(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Error: Temporary DataFrame file not found at {}", .0.display())]
    StagingMissing(PathBuf),
    #[error("Error: '{name}' parameter required for {operation} operation")]
    MissingParameter {
        name: &'static str,
        operation: &'static str,
    },
    #[error("Error: Unsupported operation '{0}'")]
    UnsupportedOperation(String),
    #[error("No numeric columns found for correlation analysis")]
    NoNumericColumns,
    #[error("Error during DataFrame analysis: {0}")]
    Execution(String),
}

impl From<polars::prelude::PolarsError> for AnalysisError {
    fn from(e: polars::prelude::PolarsError) -> Self {
        AnalysisError::Execution(e.to_string())
    }
}

impl From<serde_json::Error> for AnalysisError {
    fn from(e: serde_json::Error) -> Self {
        AnalysisError::Execution(e.to_string())
    }
}

impl From<crate::analysis::FilterError> for AnalysisError {
    fn from(e: crate::analysis::FilterError) -> Self {
        AnalysisError::Execution(e.to_string())
    }
}

#[derive(Error, Debug)]
pub enum VizError {
    #[error("Error: Temporary DataFrame file not found at {}", .0.display())]
    StagingMissing(PathBuf),
    #[error("Error: '{name}' parameter required for {plot}")]
    MissingParameter {
        name: &'static str,
        plot: &'static str,
    },
    #[error("Error: 'x' and 'y' parameters required for {0}")]
    MissingXy(&'static str),
    #[error("Error: Unsupported plot type '{0}'")]
    UnsupportedPlotType(String),
    #[error("No numeric columns found for correlation heatmap")]
    NoNumericColumns,
    #[error("Error creating visualization: {0}")]
    Render(String),
}

impl From<polars::prelude::PolarsError> for VizError {
    fn from(e: polars::prelude::PolarsError) -> Self {
        VizError::Render(e.to_string())
    }
}

impl From<serde_json::Error> for VizError {
    fn from(e: serde_json::Error) -> Self {
        VizError::Render(e.to_string())
    }
}

impl From<std::io::Error> for VizError {
    fn from(e: std::io::Error) -> Self {
        VizError::Render(e.to_string())
    }
}

impl<E: std::error::Error + Send + Sync> From<plotters::drawing::DrawingAreaErrorKind<E>>
    for VizError
{
    fn from(e: plotters::drawing::DrawingAreaErrorKind<E>) -> Self {
        VizError::Render(e.to_string())
    }
}
