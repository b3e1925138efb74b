//! Probe pipeline: run ping, parse its output, classify the result.

pub mod classify;
pub mod parser;
pub mod runner;

pub use classify::{
    check_alert_conditions, classify, AlertThresholds, Classification, LatencyBucket,
    LatencyThresholds,
};
pub use parser::{parse, Dialect, PingStats};
pub use runner::{ProbeError, ProbeRunner};
