//! Metric persistence
//!
//! The insert pipeline consumes storage through the [`MetricStore`] trait;
//! [`postgres::PostgresStore`] is the production implementation. The
//! missing-table self-healing policy is transport-agnostic and lives in
//! [`store::insert_with_recovery`].

pub mod error;
pub mod postgres;
pub mod statement;
pub mod store;

pub use error::{StorageError, StorageResult};
pub use statement::{DecodeError, InsertStatement, MetricRow, StatementKey, decode_record};
pub use store::{MetricStore, insert_with_recovery};
