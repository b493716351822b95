//! Analysis module - operation dispatch and the safe filter language

mod dispatcher;
mod filter;

pub use dispatcher::{AnalysisDispatcher, Operation};
pub use filter::{parse as parse_filter, FilterError};
