// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/seismoscan-rs

//! SeismoScan - Seismic Station Quality-Assurance Scanner
//!
//! Command-line driver: loads configuration, opens the metric store and
//! runs the metric pipeline over one station-day. Waveform and metadata
//! ingest are external; demo mode synthesizes a station-day so the full
//! pipeline can be exercised without an archive.

use anyhow::Result;
use chrono::{Duration, NaiveDate, Utc};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use seismoscan::{demo, scan, Config, MetricStore, Scanner, VERSION};

/// SeismoScan - Seismic Station Quality-Assurance Scanner
#[derive(Parser, Debug)]
#[command(name = "seismoscan")]
#[command(author = "SeismoScan Project")]
#[command(version = VERSION)]
#[command(about = "Daily PSD-based station quality metrics with change detection")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Day to scan, YYYY-MM-DD (defaults to yesterday, UTC)
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Recompute metrics even when input digests are unchanged
    #[arg(short, long)]
    force: bool,

    /// Demo mode with a synthesized station-day
    #[arg(long)]
    demo: bool,

    /// Dump stored values from this date (with --dump-to) and exit
    #[arg(long)]
    dump_from: Option<NaiveDate>,

    /// Dump stored values up to this date
    #[arg(long)]
    dump_to: Option<NaiveDate>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long)]
    trace: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.trace {
        Level::TRACE
    } else if args.debug {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_file(args.debug)
        .with_line_number(args.debug)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("SeismoScan v{} - station quality-assurance scanner", VERSION);

    // Load or create configuration
    let config_path = args.config.unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&config_path)?;

    // Override with command line args
    if args.force {
        config.scan.force_update = true;
    }
    if args.demo {
        config.demo_mode = true;
    }

    let store = MetricStore::open(&config.database.path)?;

    if let (Some(from), Some(to)) = (args.dump_from, args.dump_to) {
        println!("{}", store.select_all(from, to)?);
        return Ok(());
    }

    let date = args
        .date
        .unwrap_or_else(|| Utc::now().date_naive() - Duration::days(1));

    if !config.demo_mode {
        anyhow::bail!(
            "no waveform ingest configured; run with --demo or enable demo_mode in {:?}",
            config_path
        );
    }

    let (day, data) = demo::demo_station_day(&config, date);
    let mut metrics = scan::build_metrics(&config.metrics)?;
    info!(
        "running {} metric instance(s) for {} {}",
        metrics.len(),
        day.station,
        day.date
    );

    let scanner = Scanner::new(&store, config.scan.force_update);
    let stored = scanner.scan(&day, &data, &mut metrics);
    info!("done: {} value(s) stored in {:?}", stored, config.database.path);

    Ok(())
}
