// node/src/main.rs
use anyhow::Context;
use clap::{Parser, Subcommand};
use consensus::{decide, Thresholds};
use node::{BadRowPolicy, DecisionLog, DecisionReport, Driver, NodeConfig, OutputFormat};
use node_metrics::{CsvSource, LoadSimulator, MetricsRecord, MetricsRecorder, MetricsSource, RandomSource};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "adaptive-node")]
#[command(about = "Adaptive consensus selector (PoW / APoW / PoS / DPoS)", version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Sample metrics and select a consensus mechanism
    Run {
        /// Configuration file path (.toml, or .json thresholds)
        #[arg(short, long, default_value = "./config.toml")]
        config: String,

        /// Loop interval in seconds (0 = decide once)
        #[arg(short, long)]
        interval: Option<u64>,

        /// Run a single decision and exit
        #[arg(long)]
        oneshot: bool,

        /// Replay metrics from a CSV file instead of the random generator
        #[arg(long)]
        metrics_csv: Option<String>,

        /// Seed for the random generator
        #[arg(long)]
        seed: Option<u64>,

        /// Append decisions to this CSV file
        #[arg(long)]
        decisions_out: Option<String>,

        /// Stop on the first unreadable CSV row instead of skipping it
        #[arg(long)]
        abort_on_bad_row: bool,

        /// Print decisions as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Decide for a single set of metrics given on the command line
    Decide {
        /// Configuration file path; built-in thresholds when omitted
        #[arg(short, long)]
        config: Option<String>,

        /// Active users
        #[arg(long)]
        users: u64,

        /// Throughput (reported only)
        #[arg(long, default_value = "0")]
        throughput: f64,

        /// Latency in milliseconds
        #[arg(long, allow_hyphen_values = true)]
        latency: i64,

        /// Normalized energy
        #[arg(long, allow_hyphen_values = true)]
        energy: f64,

        /// Print the decision as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write a CSV of simulated metrics that `run --metrics-csv` can replay
    Simulate {
        /// Mean active users
        #[arg(short, long, default_value = "500")]
        users: u64,

        /// Number of rows
        #[arg(short, long, default_value = "50")]
        steps: usize,

        /// Output path
        #[arg(short, long, default_value = "./metrics.csv")]
        out: String,

        /// Seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Write a default configuration file
    Init {
        /// Output path
        #[arg(short, long, default_value = "./config.toml")]
        output: String,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

struct RunArgs {
    config: String,
    interval: Option<u64>,
    oneshot: bool,
    metrics_csv: Option<String>,
    seed: Option<u64>,
    decisions_out: Option<String>,
    abort_on_bad_row: bool,
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_log_filter(cli.debug).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let result = match cli.command {
        Commands::Run {
            config,
            interval,
            oneshot,
            metrics_csv,
            seed,
            decisions_out,
            abort_on_bad_row,
            json,
        } => {
            run(RunArgs {
                config,
                interval,
                oneshot,
                metrics_csv,
                seed,
                decisions_out,
                abort_on_bad_row,
                json,
            })
            .await
        }
        Commands::Decide {
            config,
            users,
            throughput,
            latency,
            energy,
            json,
        } => decide_once(config, MetricsRecord::new(users, throughput, latency, energy), json),
        Commands::Simulate {
            users,
            steps,
            out,
            seed,
        } => simulate(users, steps, &out, seed),
        Commands::Init { output, force } => init_config(&output, force),
    };

    if let Err(e) = &result {
        tracing::error!("{:#}", e);
    }
    result
}

/// Library events log under the package name, the binary's under `adaptive_node`
fn default_log_filter(debug: bool) -> String {
    let log_level = if debug { "debug" } else { "info" };
    format!("{}={},adaptive_node={}", env!("CARGO_PKG_NAME"), log_level, log_level)
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    tracing::info!("Loading configuration from {}", args.config);
    let mut config = NodeConfig::from_file(&args.config)?;

    if let Some(interval) = args.interval {
        config.driver.interval_secs = interval;
    }
    if args.oneshot {
        config.driver.interval_secs = 0;
    }
    if args.metrics_csv.is_some() {
        config.driver.metrics_csv = args.metrics_csv;
    }
    if args.seed.is_some() {
        config.driver.seed = args.seed;
    }
    if args.decisions_out.is_some() {
        config.driver.decisions_out = args.decisions_out;
    }
    if args.abort_on_bad_row {
        config.driver.on_bad_row = BadRowPolicy::Abort;
    }
    let format = if args.json { OutputFormat::Json } else { OutputFormat::Text };

    let source: Box<dyn MetricsSource + Send> = match &config.driver.metrics_csv {
        Some(path) => {
            tracing::info!("Replaying metrics from {}", path);
            Box::new(CsvSource::open(path).with_context(|| format!("failed to open CSV metrics source {}", path))?)
        }
        None => match config.driver.seed {
            Some(seed) => {
                tracing::info!(seed, "Using seeded random metrics");
                Box::new(RandomSource::seeded(seed))
            }
            None => {
                tracing::info!("Using random metrics");
                Box::new(RandomSource::from_entropy())
            }
        },
    };

    let mut driver = Driver::new(source, config.thresholds).with_bad_row_policy(config.driver.on_bad_row);
    if let Some(path) = &config.driver.decisions_out {
        let log = DecisionLog::open(path).with_context(|| format!("failed to open decision log {}", path))?;
        tracing::info!("Appending decisions to {}", path);
        driver = driver.with_decision_log(log);
    }

    if config.driver.interval_secs == 0 {
        let report = driver.run_once_and_close()?;
        println!("{}", report.render(format)?);
        return Ok(());
    }

    let period = Duration::from_secs(config.driver.interval_secs);
    let stats = driver
        .run_loop(period, shutdown_signal(), |report| {
            println!("{}", report.render(format)?);
            Ok(())
        })
        .await?;

    tracing::info!(decisions = stats.decisions, skipped = stats.skipped, "Driver stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

fn decide_once(config: Option<String>, metrics: MetricsRecord, json: bool) -> anyhow::Result<()> {
    let thresholds = match config {
        Some(path) => NodeConfig::from_file(&path)?.thresholds,
        None => Thresholds::default(),
    };

    let report = DecisionReport::new(metrics, thresholds, decide(&metrics, &thresholds));
    let format = if json { OutputFormat::Json } else { OutputFormat::Text };
    println!("{}", report.render(format)?);
    Ok(())
}

fn simulate(users: u64, steps: usize, out: &str, seed: Option<u64>) -> anyhow::Result<()> {
    let mut simulator = match seed {
        Some(seed) => LoadSimulator::seeded(users, seed),
        None => LoadSimulator::from_entropy(users),
    };

    if let Some(parent) = std::path::Path::new(out).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut recorder = MetricsRecorder::create(out).with_context(|| format!("failed to create {}", out))?;
    for _ in 0..steps {
        let metrics = simulator.next()?;
        recorder.record(&metrics)?;
    }
    let rows = recorder.rows();
    recorder.finish()?;

    tracing::info!(rows, target_users = users, "Wrote simulated metrics to {}", out);
    Ok(())
}

fn init_config(output: &str, force: bool) -> anyhow::Result<()> {
    if std::path::Path::new(output).exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", output);
    }

    NodeConfig::default().to_file(output)?;

    tracing::info!("Default configuration written to {}", output);
    tracing::info!("Edit {} to tune the switching thresholds", output);
    Ok(())
}
