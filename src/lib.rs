//! Pingwatch - Host Reachability and Latency Monitor
//!
//! This crate provides the core functionality for the Pingwatch monitoring
//! system. It can be used as a library by other Rust projects, or run as a
//! standalone binary with the `pingwatch` executable.
//!
//! # Architecture
//!
//! - **Probe**: subprocess ping execution, output parsing and latency
//!   classification
//! - **Scheduler**: periodic probe sweeps with bounded concurrency
//! - **Storage**: SQLite-based persistence for measurements and logs
//! - **Server**: dashboard and JSON query API

pub mod config;
pub mod probe;
pub mod scheduler;
pub mod server;
pub mod storage;

pub use config::AppConfig;
pub use probe::{Dialect, PingStats, ProbeRunner};
pub use scheduler::Scheduler;
pub use server::{create_router, AppState};
pub use storage::Storage;
