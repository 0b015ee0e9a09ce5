//! Metric inserter service
//!
//! Consumes serialized metrics from the event stream and drives the batch
//! insert pipeline into storage. The pipeline for one batch is
//! [`process_batch`]: poll, decode, group by statement shape, insert.
//!
//! ## Failure policy
//!
//! Malformed records are logged and dropped without aborting their batch.
//! Storage failures other than the self-healed missing table are fatal to
//! the service loop: the loop exits loudly rather than silently dropping
//! metrics.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::Config;
use crate::service::Service;
use crate::storage::postgres::PostgresStore;
use crate::storage::{
    InsertStatement, MetricRow, MetricStore, StatementKey, StorageResult, decode_record,
    insert_with_recovery,
};
use crate::stream::StreamConsumer;

/// How often the loop polls the stream. The poll itself is non-blocking,
/// so a cadence is needed to avoid spinning on an empty stream.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Process one batch of stream records: poll, decode, group, insert.
///
/// Records are grouped by the structural identity of their statement so
/// that rows sharing a table and column order go to storage as one batched
/// execution. An empty poll is not an error; the call returns cleanly
/// having done nothing.
pub async fn process_batch(
    consumer: &dyn StreamConsumer,
    table: &str,
    store: &dyn MetricStore,
) -> StorageResult<()> {
    let batch = consumer.poll().await;
    if batch.is_empty() {
        return Ok(());
    }

    let mut groups: HashMap<StatementKey, (InsertStatement, Vec<MetricRow>)> = HashMap::new();
    let mut dropped = 0usize;
    for records in batch.into_values() {
        for raw in records {
            match decode_record(&raw, table) {
                Ok((statement, row)) => {
                    groups
                        .entry(statement.key())
                        .or_insert_with(|| (statement, Vec::new()))
                        .1
                        .push(row);
                }
                Err(err) => {
                    // Malformed input does not abort the batch.
                    warn!("dropping record: {err}");
                    dropped += 1;
                }
            }
        }
    }

    if dropped > 0 {
        debug!("dropped {dropped} malformed records from batch");
    }

    for (statement, rows) in groups.into_values() {
        insert_with_recovery(store, &statement, &rows).await?;
    }
    Ok(())
}

/// Service that drains the stream into storage.
pub struct MetricInserterService {
    config: Option<Arc<Config>>,
    consumer: Arc<dyn StreamConsumer>,
    /// Store injected for tests and alternative backends; when `None`,
    /// `start` connects PostgreSQL from the configuration.
    store: Option<Arc<dyn MetricStore>>,
    shutdown: CancellationToken,
    loop_task: Option<JoinHandle<()>>,
    started: bool,
}

impl MetricInserterService {
    pub fn new(consumer: Arc<dyn StreamConsumer>) -> Self {
        Self {
            config: None,
            consumer,
            store: None,
            shutdown: CancellationToken::new(),
            loop_task: None,
            started: false,
        }
    }

    /// Use a pre-built store instead of connecting from configuration.
    pub fn with_store(consumer: Arc<dyn StreamConsumer>, store: Arc<dyn MetricStore>) -> Self {
        Self {
            store: Some(store),
            ..Self::new(consumer)
        }
    }
}

#[async_trait::async_trait]
impl Service for MetricInserterService {
    fn reload(&mut self, config: Arc<Config>) {
        self.config = Some(config);
    }

    #[instrument(skip(self))]
    async fn start(&mut self) -> anyhow::Result<()> {
        if self.started {
            return Ok(());
        }

        let config = self
            .config
            .clone()
            .context("metric inserter started without a configuration")?;

        let store: Arc<dyn MetricStore> = match &self.store {
            Some(store) => Arc::clone(store),
            None => {
                let options = config
                    .storage
                    .as_ref()
                    .context("storage-connection-options missing from configuration")?;
                Arc::new(PostgresStore::connect(options).await?)
            }
        };

        info!("starting metric inserter into table {}", config.table);

        self.shutdown = CancellationToken::new();
        let shutdown = self.shutdown.clone();
        let consumer = Arc::clone(&self.consumer);
        let table = config.table.clone();

        self.loop_task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(POLL_INTERVAL);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(err) = process_batch(consumer.as_ref(), &table, store.as_ref()).await {
                            // Unrecoverable storage failure: fail loudly
                            // instead of silently dropping metrics.
                            error!("insert pipeline failed, stopping loop: {err}");
                            break;
                        }
                    }
                }
            }
            consumer.close().await;
            store.close().await;
            debug!("metric inserter loop finished");
        }));

        self.started = true;
        info!("metric inserter started");
        println!("The metric inserter service is started.");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn stop(&mut self) {
        if !self.started {
            return;
        }
        self.started = false;

        self.shutdown.cancel();

        info!("metric inserter stopped");
        println!("The metric inserter service is stopped.");
    }

    fn live_tasks(&mut self) -> usize {
        match &self.loop_task {
            Some(task) if !task.is_finished() => 1,
            _ => {
                self.loop_task = None;
                0
            }
        }
    }
}
