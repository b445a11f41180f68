//! Agentwatch Aggregation Engine
//!
//! Pure read-side summaries over the event store: token rollups, tool
//! effectiveness, finding breakdowns, coverage reporting, and the composed
//! dashboard snapshot. All computations are deterministic functions of the
//! stored rows; breakdown maps use `BTreeMap` so repeated calls with no
//! intervening writes return identical output.

pub mod models;
pub mod queries;

pub use models::*;
pub use queries::{coverage_report, dashboard, finding_summary, token_summary, tool_effectiveness};
