//! Storage Layer
//!
//! SQLite persistence for measurements and diagnostic logs, built on a
//! shared sqlx pool. Both tables are append-only; concurrent writers from
//! parallel probe tasks are safe.
//!
//! # Components
//!
//! - [`MeasurementStore`]: append + the read contract for the reporting layer
//! - [`LogStore`]: structured log sink with filtered reads
//! - [`Storage`]: opens the database, runs the schema, hands out store handles

mod db;
mod error;
mod logs;
mod measurements;
mod schema;
mod types;

pub use db::Db;
pub use error::StorageError;
pub use logs::{LogQuery, LogStore};
pub use measurements::{
    BucketedQuery, BucketedRow, MeasurementStore, TargetStatus, TimeGranularity,
};
pub use schema::init_schema;
pub use types::{is_stale, Concern, ConcernKind, LogEntry, LogLevel, Measurement, STALE_AFTER_SECS};

/// Handles to the storage layer.
///
/// Store handles are cheap clones over the same pool; hand one to each
/// component at construction instead of sharing ambient global state.
pub struct Storage {
    pub measurements: MeasurementStore,
    pub logs: LogStore,
    db: Db,
}

impl Storage {
    /// Connect and initialize the schema.
    ///
    /// Failure here is the only fatal storage error: the process must not
    /// start without a working store.
    pub async fn open(url: &str) -> Result<Self, StorageError> {
        let db = Db::connect(url).await?;
        init_schema(db.pool()).await?;

        Ok(Self {
            measurements: MeasurementStore::new(db.clone()),
            logs: LogStore::new(db.clone()),
            db,
        })
    }

    /// Close the underlying pool gracefully.
    pub async fn close(&self) {
        self.db.close().await;
    }
}
