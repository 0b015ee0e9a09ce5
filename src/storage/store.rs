//! Metric store trait and the missing-schema recovery policy
//!
//! The insert pipeline talks to storage through [`MetricStore`] only. The
//! create-then-retry-once policy lives in [`insert_with_recovery`], written
//! against the trait so a scripted mock can exercise the failure sequence
//! without a database.

use async_trait::async_trait;
use tracing::{debug, info};

use super::error::StorageResult;
use super::statement::{InsertStatement, MetricRow};

/// Transactional insert capability bound to one storage connection.
#[async_trait]
pub trait MetricStore: Send + Sync {
    /// Execute `statement` once per row inside one transactional scope:
    /// all rows of the call commit or roll back together.
    async fn execute_batch(
        &self,
        statement: &InsertStatement,
        rows: &[MetricRow],
    ) -> StorageResult<()>;

    /// Create the destination table, its timestamp index and its default
    /// partition, in that order, if absent.
    async fn create_schema(&self, table: &str) -> StorageResult<()>;

    /// Close the connection and release resources.
    async fn close(&self);
}

/// Insert a statement group, self-healing a missing table once.
///
/// On a distinguished missing-table (or table-existence check) failure the
/// transaction is abandoned, the table name is recovered from the
/// statement's structural metadata, the schema-creation routine runs, and
/// the original insert is retried exactly once. A second failure, or any
/// other storage failure, propagates to the caller: looping schema
/// creation would only mask a configuration or privilege problem.
pub async fn insert_with_recovery(
    store: &dyn MetricStore,
    statement: &InsertStatement,
    rows: &[MetricRow],
) -> StorageResult<()> {
    if rows.is_empty() {
        return Ok(());
    }

    match store.execute_batch(statement, rows).await {
        Err(err) if err.is_missing_schema() => {
            debug!("insert failed ({err}), creating schema for {}", statement.table());
            store.create_schema(statement.table()).await?;
            store.execute_batch(statement, rows).await?;
            info!("inserted {} rows after creating {}", rows.len(), statement.table());
            Ok(())
        }
        Err(err) => Err(err),
        Ok(()) => {
            info!("inserted {} rows", rows.len());
            Ok(())
        }
    }
}
