//! Web pinger service
//!
//! Probes every configured target on its own period and publishes one
//! [`Metric`] per probe to the event stream. The data flow for one tick is
//! [`probe_target`]: fetch, transform to a metric, enqueue. The service
//! part owns the periodic scheduler and the cooperative loop that pumps
//! it.
//!
//! ## Failure policy
//!
//! A probe is best-effort and never fatal: any failure during fetch,
//! transform or enqueue is logged and suppressed at the pipeline boundary.
//! One bad target must never stop monitoring of the others.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::Metric;
use crate::config::{Config, ResolvedTarget};
use crate::service::Service;
use crate::stream::StreamProducer;

/// Scheduler sampling cadence. Entries only fire once their time has
/// already passed, so sampling at 500 ms bounds the scheduling error to
/// about one second (Nyquist).
const PUMP_INTERVAL: Duration = Duration::from_millis(500);

/// HTTP timeout for one probe fetch.
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Probe one target once: fetch, transform, enqueue.
///
/// Re-entrant by design; everything it needs arrives as a parameter, so a
/// test can substitute the producer and point the url at a mock server.
/// The returned future is what the scheduler launches per tick.
pub async fn probe_target(
    client: reqwest::Client,
    target: ResolvedTarget,
    producer: Arc<dyn StreamProducer>,
    topic: String,
    source: String,
    shutdown: CancellationToken,
) {
    if let Err(err) = run_probe(client, &target, producer, &topic, source, shutdown).await {
        // Deliberate narrow suppression: a failed probe produces no
        // metric and does not reach the scheduler.
        warn!("probing {} failed: {err:#}", target.url);
    }
}

async fn run_probe(
    client: reqwest::Client,
    target: &ResolvedTarget,
    producer: Arc<dyn StreamProducer>,
    topic: &str,
    source: String,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    debug!("probing {}", target.url);

    // Dispatch time, not completion time: the stored timestamp says when
    // the probe was sent.
    let timestamp = Utc::now();
    let started = std::time::Instant::now();

    let response = client
        .get(&target.url)
        .send()
        .await
        .context("fetch failed")?;
    let status = response.status().as_u16();
    let body = response.text().await.context("reading body failed")?;
    let elapsed = started.elapsed();

    let metric = Metric {
        timestamp: timestamp.to_rfc3339(),
        source,
        url: target.url.clone(),
        elapsed_us: elapsed.as_micros() as u64,
        status,
        matched: target.pattern.is_match(&body),
    };

    if shutdown.is_cancelled() {
        debug!("discarding metric for {}: shutting down", target.url);
        return Ok(());
    }

    debug!("publishing metric: {metric:?}");
    let payload = serde_json::to_vec(&metric).context("serializing metric failed")?;
    producer.send(topic, payload).await.context("enqueue failed")?;
    Ok(())
}

/// Service that drives the probe pipeline from scheduler ticks.
pub struct WebPingerService {
    config: Option<Arc<Config>>,
    producer: Arc<dyn StreamProducer>,
    scheduler: Arc<Mutex<crate::scheduler::PeriodicScheduler>>,
    shutdown: CancellationToken,
    loop_task: Option<JoinHandle<()>>,
    started: bool,
}

impl WebPingerService {
    pub fn new(producer: Arc<dyn StreamProducer>) -> Self {
        Self {
            config: None,
            producer,
            scheduler: Arc::new(Mutex::new(crate::scheduler::PeriodicScheduler::new())),
            shutdown: CancellationToken::new(),
            loop_task: None,
            started: false,
        }
    }

    /// Pending scheduler entries, exposed for lifecycle tests.
    pub fn scheduled_entries(&self) -> usize {
        self.scheduler.lock().expect("scheduler mutex poisoned").pending()
    }
}

#[async_trait::async_trait]
impl Service for WebPingerService {
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
            .context("web pinger started without a configuration")?;
        let targets = config.resolved_targets()?;

        info!("starting web pinger with {} targets", targets.len());

        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("building HTTP client failed")?;

        self.shutdown = CancellationToken::new();
        let shutdown = self.shutdown.clone();

        let mut by_key: HashMap<String, ResolvedTarget> = HashMap::new();
        {
            let mut scheduler = self.scheduler.lock().expect("scheduler mutex poisoned");
            let now = Instant::now();
            for target in targets {
                scheduler.register(&target.url, target.period, now);
                by_key.insert(target.url.clone(), target);
            }
        }

        let scheduler = Arc::clone(&self.scheduler);
        let producer = Arc::clone(&self.producer);
        let topic = config.topic.clone();
        let source = crate::util::local_source_address();

        self.loop_task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(PUMP_INTERVAL);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    now = ticker.tick() => {
                        let mut scheduler = scheduler.lock().expect("scheduler mutex poisoned");
                        scheduler.pump(now, |key| {
                            let Some(target) = by_key.get(key) else {
                                // Keys and targets are registered together.
                                return tokio::spawn(async {});
                            };
                            tokio::spawn(probe_target(
                                client.clone(),
                                target.clone(),
                                Arc::clone(&producer),
                                topic.clone(),
                                source.clone(),
                                shutdown.clone(),
                            ))
                        });
                    }
                }
            }
            debug!("web pinger loop finished");
        }));

        self.started = true;
        info!("web pinger started");
        println!("The web pinger service is started.");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn stop(&mut self) {
        if !self.started {
            return;
        }
        self.started = false;

        self.shutdown.cancel();
        self.scheduler
            .lock()
            .expect("scheduler mutex poisoned")
            .cancel_all();
        self.producer.close().await;

        info!("web pinger stopped");
        println!("The web pinger service is stopped.");
    }

    fn live_tasks(&mut self) -> usize {
        let mut count = self
            .scheduler
            .lock()
            .expect("scheduler mutex poisoned")
            .live_tasks();
        if let Some(task) = &self.loop_task {
            if task.is_finished() {
                self.loop_task = None;
            } else {
                count += 1;
            }
        }
        count
    }
}
