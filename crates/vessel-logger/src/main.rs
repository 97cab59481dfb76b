// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! vessel-logger - Log SignalK vessel data to rotated CSV files.
//!
//! Usage:
//!   vessel-logger --config vessel-logger.toml
//!   vessel-logger --log-dir data --signalk-addr boat.local:8375
//!   signalk-delta-source | vessel-logger --stdin
//!   vessel-logger gen-config --output vessel-logger.toml

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vessel_logger::{
    decode_delta, LineBuffer, LineRead, LoggerConfig, Pipeline, PipelineStats, Subscription,
};

/// How often blocking reads wake up to check for shutdown.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Upper bound on a single TCP connect attempt.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "vessel-logger")]
#[command(about = "Log SignalK vessel data to rotated CSV files")]
#[command(version)]
struct Args {
    /// Configuration file path (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory where log files will be stored
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// SignalK TCP stream host:port
    #[arg(long)]
    signalk_addr: Option<String>,

    /// Read newline-delimited deltas from stdin instead of SignalK
    #[arg(long)]
    stdin: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write the default configuration file
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "vessel-logger.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if let Some(cmd) = args.command {
        return match cmd {
            Commands::GenConfig { output } => cmd_gen_config(output),
            Commands::Validate { config } => cmd_validate(config),
        };
    }

    let config = build_config(&args)?;
    let mut pipeline = Pipeline::new(&config).context("failed to start logging pipeline")?;

    info!("Vessel Logger v{}", env!("CARGO_PKG_VERSION"));
    info!("Log directory: {}", config.output_dir.display());
    info!("Required fields: {}", config.required_fields.len());

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    let mut reporter = StatsReporter::new(config.stats_interval_secs);
    let result = if args.stdin {
        run_stdin(&mut pipeline, &running, &mut reporter)
    } else {
        run_signalk(&config, &mut pipeline, &running, &mut reporter);
        Ok(())
    };

    pipeline.close()?;
    log_stats("Final statistics", pipeline.stats());
    result
}

fn build_config(args: &Args) -> Result<LoggerConfig> {
    let mut config = match args.config {
        Some(ref path) => LoggerConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => LoggerConfig::default(),
    };

    if let Some(ref dir) = args.log_dir {
        config.output_dir = dir.clone();
    }
    if let Some(ref addr) = args.signalk_addr {
        config.signalk.address = addr.clone();
    }

    Ok(config)
}

fn run_signalk(
    config: &LoggerConfig,
    pipeline: &mut Pipeline,
    running: &AtomicBool,
    reporter: &mut StatsReporter,
) {
    let reconnect_delay = Duration::from_millis(config.signalk.reconnect_delay_ms);

    while running.load(Ordering::SeqCst) {
        if let Err(err) = stream_session(config, pipeline, running, reporter) {
            warn!("SignalK connection error: {:#}", err);
            info!("Retrying in {} ms", reconnect_delay.as_millis());
            std::thread::sleep(reconnect_delay);
        }
    }
}

fn stream_session(
    config: &LoggerConfig,
    pipeline: &mut Pipeline,
    running: &AtomicBool,
    reporter: &mut StatsReporter,
) -> Result<()> {
    let addr = &config.signalk.address;
    info!("Connecting to {}", addr);

    let stream = connect(addr)?;
    stream.set_read_timeout(Some(POLL_INTERVAL))?;

    let subscription = Subscription::for_paths(
        config.signalk.subscriptions.iter().cloned(),
        config.signalk.period_ms,
    );
    let mut writer = stream.try_clone()?;
    writer
        .write_all(subscription.to_json_line()?.as_bytes())
        .context("error subscribing to SignalK")?;

    info!("Connected to SignalK, start processing");
    let mut reader = BufReader::new(stream);
    let mut lines = LineBuffer::new();

    while running.load(Ordering::SeqCst) {
        match lines.read_line(&mut reader) {
            Ok(LineRead::Line(line)) => process_line(pipeline, &line),
            Ok(LineRead::Pending) => {}
            Ok(LineRead::Eof) => anyhow::bail!("connection closed by server"),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
            Err(e) => return Err(e).context("error reading from SignalK"),
        }
        reporter.maybe_report(pipeline.stats());
    }

    Ok(())
}

fn connect(addr: &str) -> Result<TcpStream> {
    let mut last_err = None;
    for resolved in addr
        .to_socket_addrs()
        .with_context(|| format!("error resolving {}", addr))?
    {
        match TcpStream::connect_timeout(&resolved, CONNECT_TIMEOUT) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }

    match last_err {
        Some(e) => Err(e).with_context(|| format!("error connecting to {}", addr)),
        None => anyhow::bail!("{} resolved to no addresses", addr),
    }
}

fn run_stdin(
    pipeline: &mut Pipeline,
    running: &AtomicBool,
    reporter: &mut StatsReporter,
) -> Result<()> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    while running.load(Ordering::SeqCst) {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(Ok(line)) => process_line(pipeline, &line),
            Ok(Err(e)) => return Err(e).context("error reading stdin"),
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                info!("End of input");
                break;
            }
        }
        reporter.maybe_report(pipeline.stats());
    }

    Ok(())
}

fn process_line(pipeline: &mut Pipeline, line: &str) {
    if line.is_empty() {
        return;
    }

    let updates = match decode_delta(line) {
        Ok(updates) => updates,
        Err(err) => {
            warn!("Error decoding SignalK message [{}]: {}", line, err);
            return;
        }
    };

    for update in updates {
        if let Err(err) = pipeline.ingest(update) {
            warn!("Failed to write record: {}", err);
        }
    }
}

struct StatsReporter {
    interval: Option<Duration>,
    last_report: Instant,
}

impl StatsReporter {
    fn new(interval_secs: u64) -> Self {
        Self {
            interval: (interval_secs > 0).then(|| Duration::from_secs(interval_secs)),
            last_report: Instant::now(),
        }
    }

    fn maybe_report(&mut self, stats: &PipelineStats) {
        let Some(interval) = self.interval else {
            return;
        };
        if self.last_report.elapsed() >= interval {
            log_stats("Statistics", stats);
            self.last_report = Instant::now();
        }
    }
}

fn log_stats(title: &str, stats: &PipelineStats) {
    info!(
        "{}: {} updates, {} records written ({} forced), {} stale, {} excluded, {} write errors, {} files",
        title,
        stats.updates_received,
        stats.records_written,
        stats.forced_flushes,
        stats.rejected_stale,
        stats.rejected_source,
        stats.write_errors,
        stats.files_opened
    );
}

fn cmd_gen_config(output: PathBuf) -> Result<()> {
    let toml_str = LoggerConfig::default().to_toml_string()?;
    let content = format!(
        "# Vessel Logger Configuration\n# Generated by vessel-logger gen-config\n\n{}",
        toml_str
    );

    std::fs::write(&output, content)
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!("Generated configuration file: {}", output.display());
    Ok(())
}

fn cmd_validate(config_path: PathBuf) -> Result<()> {
    match LoggerConfig::from_file(&config_path) {
        Ok(config) => {
            println!("Configuration valid!");
            println!();
            println!("Log directory: {}", config.output_dir.display());
            println!("Rotation: every {}s", config.rotation_interval_secs);
            println!("Missing-field timeout: {}ms", config.missing_field_timeout_ms);
            println!("Stale threshold: {}s", config.stale_threshold_secs);
            println!("Required fields: {}", config.required_fields.len());
            for field in &config.required_fields {
                match config.excluded_sources.get(field) {
                    Some(source) => println!("  {} (excluding {})", field, source),
                    None => println!("  {}", field),
                }
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration invalid: {}", e);
            std::process::exit(1);
        }
    }
}
