//! Clustering - per-token rolling aggregates over the active window

pub mod engine;
pub mod types;

pub use engine::{priority_components, AddResult, ClusteringEngine, ScoreBreakdown, DEFAULT_TRUST};
pub use types::{minute_key, Cluster, ClusterSnapshot, ContextMessage, VelocityWindow};
