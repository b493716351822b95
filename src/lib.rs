//! datadesk - tabular dataset staging, declarative analysis, and chart
//! rendering.
//!
//! Three components consumed in dependency order: the [`data::DatasetLoader`]
//! ingests a csv/xls/xlsx/json file and stages it as a canonical CSV; the
//! [`analysis::AnalysisDispatcher`] executes one JSON-described operation
//! against the staged data; the [`charts::ChartRenderer`] renders one
//! JSON-described chart from it. A [`session::Session`] owns the staging
//! path that hands data from the loader to the other two.

pub mod analysis;
pub mod charts;
pub mod data;
pub mod error;
pub mod session;
pub mod stats;

pub use analysis::AnalysisDispatcher;
pub use charts::ChartRenderer;
pub use data::DatasetLoader;
pub use session::Session;
