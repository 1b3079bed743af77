#![forbid(unsafe_code)]

mod runtime;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use vdisplay_ddi::PhysicalDeviceObject;
use vdisplay_miniport::{AdapterConfig, Miniport, TrackingPool, CONTEXT_TAG, SOURCE_TAG};

use crate::runtime::{AdapterReport, CountingCallbacks, Session};

#[derive(Debug, Parser)]
#[command(about = "Drives the virtual display miniport through its full lifecycle")]
struct Args {
    /// Adapter configuration (JSON). Falls back to `VDISPLAY_CONFIG`, then built-in defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of adapters to bring up, one after another.
    #[arg(long, default_value_t = 1)]
    adapters: u32,

    /// Threads polling present statistics while the presenters run.
    #[arg(long, default_value_t = 2)]
    threads: usize,

    /// Frames presented on every source.
    #[arg(long, default_value_t = 120)]
    frames: u64,

    /// Print the final report as JSON instead of a summary line.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct Report {
    adapters: Vec<AdapterReport>,
    present_callbacks: u64,
    /// Callbacks per source id, summed over every adapter.
    present_callbacks_per_source: Vec<u64>,
    outstanding_context_blocks: usize,
    outstanding_source_blocks: usize,
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => AdapterConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => AdapterConfig::from_env().context("failed to load config from environment")?,
    };

    let pool = Arc::new(TrackingPool::new());
    let miniport = Arc::new(Miniport::new(config, pool.clone()).context("invalid config")?);
    let callbacks = Arc::new(CountingCallbacks::default());
    let session = Session::new(miniport.clone(), callbacks);

    let mut adapters = Vec::with_capacity(args.adapters as usize);
    for n in 0..args.adapters {
        let pdo = PhysicalDeviceObject(0x1000 + u64::from(n));
        let report = session
            .run_adapter(pdo, args.frames, args.threads)
            .with_context(|| format!("adapter on {pdo:?} failed"))?;
        adapters.push(report);
    }

    let report = Report {
        adapters,
        present_callbacks: session.callbacks().total(),
        present_callbacks_per_source: session.callbacks().per_source(),
        outstanding_context_blocks: pool.outstanding_for(CONTEXT_TAG),
        outstanding_source_blocks: pool.outstanding_for(SOURCE_TAG),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let frames: u64 = report.adapters.iter().map(|a| a.frames_presented).sum();
        let queries: u64 = report.adapters.iter().map(|a| a.queries_answered).sum();
        println!(
            "{} adapter(s): {frames} frames presented, {queries} stats queries, {} leaked blocks",
            report.adapters.len(),
            report.outstanding_context_blocks + report.outstanding_source_blocks,
        );
    }

    ensure!(
        report.present_callbacks
            == report
                .adapters
                .iter()
                .map(|a| a.frames_presented)
                .sum::<u64>(),
        "present callbacks ({}) do not match presented frames",
        report.present_callbacks
    );
    ensure!(
        miniport.adapter_count() == 0 && pool.outstanding() == 0,
        "pool still holds {} block(s) after teardown",
        pool.outstanding()
    );
    Ok(())
}
