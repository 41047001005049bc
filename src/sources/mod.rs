//! Source reputation - per-source hit rate, speed, trust and flagging

pub mod tracker;

pub use tracker::{SourceStats, SourceTracker};
