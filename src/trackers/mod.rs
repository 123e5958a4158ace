//! Cross-run trackers: persistent state the orchestrator's optional
//! scanners read and update on top of a single pipeline run.

pub mod bullish_pool;
pub mod institutional;
