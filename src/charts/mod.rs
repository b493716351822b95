//! Charts module - plot request dispatch and rendering

mod renderer;

pub use renderer::{ChartRenderer, PlotSpec, DEFAULT_SAVE_PATH};
