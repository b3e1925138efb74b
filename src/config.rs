//! Configuration loading and validation.

mod app;
mod validation;

pub use app::{
    AppConfig, DatabaseConfig, ProbeConfig, ServerConfig, Target, DEFAULT_CONCURRENCY,
    DEFAULT_PROBE_COUNT, DEFAULT_PROBE_TIMEOUT, DEFAULT_SWEEP_INTERVAL,
};
pub use validation::ConfigError;
