//! PostgreSQL metric store
//!
//! Implements [`MetricStore`] over an sqlx connection pool. Batches are
//! executed row by row inside one transaction; schema creation runs the
//! three DDL statements from [`schema_statements`] in order, also inside
//! one transaction.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, info, instrument};

use super::error::{StorageError, StorageResult};
use super::statement::{InsertStatement, MetricRow, schema_statements};
use super::store::MetricStore;
use crate::config::StorageOptions;

/// Metric store backed by a PostgreSQL connection pool.
///
/// The pool is exclusively owned by the inserter service; it is not shared
/// across services.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect to PostgreSQL with the configured options.
    ///
    /// Connectivity failures here are fatal to the inserter service start:
    /// better to refuse to start than to silently drop metrics later.
    #[instrument(skip_all)]
    pub async fn connect(options: &StorageOptions) -> StorageResult<Self> {
        debug!("creating PostgreSQL connection pool");
        let pool = PgPoolOptions::new()
            .max_connections(options.max_connections)
            .connect(&options.dsn)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;
        info!("PostgreSQL connection pool created");
        Ok(Self { pool })
    }

    async fn execute_rows(
        tx: &mut Transaction<'_, Postgres>,
        statement: &InsertStatement,
        rows: &[MetricRow],
    ) -> Result<(), sqlx::Error> {
        let sql = statement.sql();
        for row in rows {
            sqlx::query(&sql)
                .bind(row.time_stamp)
                .bind(&row.source)
                .bind(&row.target)
                .bind(row.elapsed_us)
                .bind(row.status)
                .bind(row.matched)
                .execute(&mut **tx)
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl MetricStore for PostgresStore {
    #[instrument(skip(self, rows), fields(table = statement.table(), count = rows.len()))]
    async fn execute_batch(
        &self,
        statement: &InsertStatement,
        rows: &[MetricRow],
    ) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;
        match Self::execute_rows(&mut tx, statement, rows).await {
            Ok(()) => {
                tx.commit().await?;
                debug!("inserted {} rows", rows.len());
                Ok(())
            }
            Err(err) => {
                // The transaction is abandoned; rollback failure is
                // secondary to the original error.
                let _ = tx.rollback().await;
                Err(err.into())
            }
        }
    }

    #[instrument(skip(self))]
    async fn create_schema(&self, table: &str) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;
        for (label, sql) in ["table", "index", "partition"]
            .iter()
            .zip(schema_statements(table))
        {
            debug!("creating {label} for {table}");
            sqlx::query(&sql).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        info!("created partitioned table {table}");
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
        debug!("PostgreSQL connection pool closed");
    }
}
