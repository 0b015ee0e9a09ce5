//! Check the availability of websites and populate a PostgreSQL table with
//! metrics, all through an event stream in-between.
//!
//! Runs two services as cooperative tasks in one process: the web pinger
//! and the metric inserter. They only communicate through the stream, so
//! they could just as well run as separate replicas with a broker-backed
//! transport. Stop the foreground process with Ctrl+C or SIGINT.
//!
//! SECURITY: the configuration file can contain secrets and should not be
//! readable by everyone.

use std::sync::Arc;

use clap::Parser;
use tracing::{level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};
use webwatch::config::{Config, SAMPLE_CONFIG_YAML, TargetConfig, load_config_file};
use webwatch::service::{Service, ServiceGroup};
use webwatch::services::{MetricInserterService, WebPingerService};
use webwatch::stream::channel_stream;
use webwatch::supervisor;

/// Check the availability of websites and populate a PostgreSQL table with
/// metrics, through an event stream in-between.
#[derive(Debug, Clone, Parser)]
#[command(name = "webwatch")]
struct Args {
    /// Configuration file. It should not be readable by everybody
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Generate a sample configuration file and exit
    #[arg(short, long, value_name = "OFILE")]
    generate_config: Option<String>,

    /// URL whose content is checked against PATTERN every SECONDS;
    /// overrides a same-URL entry from the configuration file
    #[arg(short = 'w', long = "target", num_args = 3,
          value_names = ["URL", "PATTERN", "SECONDS"])]
    target: Vec<String>,

    /// Increase output verbosity (-v info, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        _ => LevelFilter::TRACE,
    };
    let filter = filter::Targets::new().with_targets(vec![("webwatch", level)]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

/// Turn the flat `-w URL PATTERN SECONDS` arguments into target configs.
fn parse_target_overrides(raw: &[String]) -> anyhow::Result<Vec<TargetConfig>> {
    raw.chunks(3)
        .map(|chunk| match chunk {
            [url, pattern, seconds] => Ok(TargetConfig {
                url: url.clone(),
                pattern: pattern.clone(),
                period: seconds
                    .parse()
                    .map_err(|_| anyhow::anyhow!("invalid period for target {url}: {seconds}"))?,
            }),
            _ => anyhow::bail!("--target takes URL PATTERN SECONDS"),
        })
        .collect()
}

fn load_config(args: &Args) -> anyhow::Result<Option<Config>> {
    if let Some(path) = &args.generate_config {
        std::fs::write(path, SAMPLE_CONFIG_YAML)?;
        println!("Do not forget to edit the configuration file: {path}");
        return Ok(None);
    }

    let mut config = match load_config_file(&args.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("The configuration file could not be loaded: {err:#}");
            eprintln!("You can run this command to generate it:");
            eprintln!("    webwatch --generate-config {}", args.config);
            anyhow::bail!("configuration load failed");
        }
    };

    config.apply_target_overrides(&parse_target_overrides(&args.target)?);
    println!("Number of websites to monitor: {}", config.targets.len());
    Ok(Some(config))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);
    trace!("started with args: {args:?}");

    let Some(config) = load_config(&args)? else {
        // A configuration file was generated; nothing to run.
        return Ok(());
    };
    let config = Arc::new(config);

    // The in-process transport has a single queue, so it honors the larger
    // of the two configured capacities.
    let capacity = config.producer.capacity.max(config.consumer.capacity);
    let (producer, consumer) = channel_stream(&config.topic, capacity);
    let mut group = ServiceGroup::new(vec![
        Box::new(WebPingerService::new(producer)),
        Box::new(MetricInserterService::new(consumer)),
    ]);
    group.reload(Arc::clone(&config));

    println!("{} services are going to start.", group.len());
    println!(
        "Press Ctrl + C, or send a SIGINT (2) to the PID {}, when you want to stop them.",
        std::process::id()
    );

    supervisor::run(group, async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for interrupt: {err}");
        }
    })
    .await
}
