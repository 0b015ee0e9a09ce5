//! Prepared-statement shapes and record decoding
//!
//! One logical statement shape exists per destination table. Decoded
//! records are grouped by [`StatementKey`], the structural identity of
//! their statement (table plus column order), so that many rows destined
//! for the same shape are submitted as one batched execution. The key is
//! structural on purpose: formatting differences in the SQL text must not
//! split a batch.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::Metric;

/// Column order of the metrics table, which is also the bind order of the
/// insert statement and the field order of [`MetricRow`].
pub const METRIC_COLUMNS: &[&str] = &[
    "time_stamp",
    "source",
    "target",
    "elapsed_us",
    "status",
    "matched",
];

/// Structural identity of a prepared statement: same table and same column
/// order means same key, and therefore one shared parameter list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatementKey {
    table: String,
    columns: &'static [&'static str],
}

/// One logical insert shape bound to a destination table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertStatement {
    table: String,
    columns: &'static [&'static str],
}

impl InsertStatement {
    /// The metrics insert shape for `table`.
    pub fn metrics(table: &str) -> Self {
        Self {
            table: table.to_string(),
            columns: METRIC_COLUMNS,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn key(&self) -> StatementKey {
        StatementKey {
            table: self.table.clone(),
            columns: self.columns,
        }
    }

    /// The parameterized SQL text, one placeholder per column.
    pub fn sql(&self) -> String {
        let placeholders: Vec<String> =
            (1..=self.columns.len()).map(|i| format!("${i}")).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(&self.table),
            self.columns.join(", "),
            placeholders.join(", ")
        )
    }
}

/// One decoded metric, in insert bind order.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRow {
    pub time_stamp: DateTime<Utc>,
    pub source: String,
    pub target: String,
    pub elapsed_us: i64,
    pub status: i32,
    pub matched: bool,
}

/// A raw stream record that could not be turned into a row.
#[derive(Debug)]
pub enum DecodeError {
    /// The payload is not valid JSON for a metric
    Malformed(String),

    /// A field value is out of range or unparsable
    InvalidField(String),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Malformed(msg) => write!(f, "malformed metric record: {}", msg),
            DecodeError::InvalidField(msg) => write!(f, "invalid metric field: {}", msg),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Parse one raw record into its statement shape and parameter tuple.
///
/// Malformed input is signaled, not fixed up: the caller logs and drops
/// the record without aborting its batch.
pub fn decode_record(raw: &[u8], table: &str) -> Result<(InsertStatement, MetricRow), DecodeError> {
    let metric: Metric =
        serde_json::from_slice(raw).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    let time_stamp = DateTime::parse_from_rfc3339(&metric.timestamp)
        .map_err(|e| DecodeError::InvalidField(format!("timestamp: {e}")))?
        .with_timezone(&Utc);

    let elapsed_us = i64::try_from(metric.elapsed_us)
        .map_err(|_| DecodeError::InvalidField(String::from("elapsed_us out of range")))?;

    Ok((
        InsertStatement::metrics(table),
        MetricRow {
            time_stamp,
            source: metric.source,
            target: metric.url,
            elapsed_us,
            status: i32::from(metric.status),
            matched: metric.matched,
        },
    ))
}

/// The schema-creation statements for a metrics table, in execution order:
/// partitioned table, timestamp index, default partition.
pub fn schema_statements(table: &str) -> [String; 3] {
    let quoted_table = quote_ident(table);
    let quoted_index = quote_ident(&format!("{table}_idx_time_stamp"));
    let quoted_partition = quote_ident(&format!("{table}_default"));
    [
        format!(
            "CREATE TABLE IF NOT EXISTS {quoted_table} (\n\
             \x20   time_stamp timestamptz,\n\
             \x20   source text,\n\
             \x20   target text,\n\
             \x20   elapsed_us bigint,\n\
             \x20   status integer,\n\
             \x20   matched boolean\n\
             ) PARTITION BY RANGE (time_stamp)"
        ),
        format!("CREATE INDEX IF NOT EXISTS {quoted_index} ON {quoted_table} (time_stamp)"),
        format!(
            "CREATE TABLE IF NOT EXISTS {quoted_partition} PARTITION OF {quoted_table} DEFAULT"
        ),
    ]
}

/// Quote an identifier so a table name can never smuggle SQL in.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
