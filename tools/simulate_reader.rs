// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Scripted reader session.
//!
//! Streams synthetic tags through a simulated reader and prints every
//! delivered batch as one JSON line on stdout.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use crossbeam::channel::{self, RecvTimeoutError};
use tracing::{info, warn};

use uhfscan::config::{load_config, ConfigError, UhfConfig};
use uhfscan::hal::{SimSurface, SimulatedReader};
use uhfscan::inventory::{InventoryService, StartOptions, TagRecord};
use uhfscan::observability::{init_logging, CrateDebugFlags, LoggingOptions};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Surface {
    Pop,
    List,
    Text,
    Raw,
    Hidden,
    /// No polled surface; tags arrive through the push callback only
    Callback,
}

impl Surface {
    fn sim(self) -> SimSurface {
        match self {
            Surface::Pop | Surface::Callback => SimSurface::Pop,
            Surface::List => SimSurface::List,
            Surface::Text => SimSurface::Text,
            Surface::Raw => SimSurface::Raw,
            Surface::Hidden => SimSurface::Hidden,
        }
    }
}

/// Run an inventory session against a simulated UHF reader
#[derive(Parser, Debug)]
#[command(name = "simulate_reader", version, long_about = None)]
struct Args {
    /// Configuration file (defaults are used when none is found)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Read surface the simulated reader exposes
    #[arg(long, value_enum, default_value_t = Surface::Pop)]
    surface: Surface,

    /// Distinct tags in the field
    #[arg(long, default_value_t = 12)]
    tags: usize,

    /// Session length in milliseconds
    #[arg(long, default_value_t = 3000)]
    duration_ms: u64,

    /// Interval between field sweeps in milliseconds
    #[arg(long, default_value_t = 25)]
    sweep_ms: u64,

    /// Burst snapshot mode
    #[arg(long, default_value_t = false)]
    full_scan: bool,

    /// Snapshot rate in Hz
    #[arg(long)]
    scan_hz: Option<f64>,

    /// Radio power in dBm
    #[arg(long)]
    power: Option<i32>,

    /// Enable debug logging for a crate (repeatable, or `all`)
    #[arg(long = "debug", value_name = "CRATE")]
    debug: Vec<String>,
}

fn synthetic_epc(n: usize) -> String {
    format!("E280116060000208{:08X}", 0x4D4B_0000 + n)
}

/// Signal wanders between -40 and -75 dBm per tag
fn synthetic_rssi(tag: usize, sweep: usize) -> i64 {
    -40 - ((tag * 7 + sweep * 3) % 36) as i64
}

fn load_or_default(path: Option<&PathBuf>) -> Result<UhfConfig> {
    match load_config(path.map(|p| p.as_path()), None) {
        Ok(config) => Ok(config),
        Err(ConfigError::FileNotFound(_)) if path.is_none() => {
            warn!("No uhfscan.toml found, using defaults");
            Ok(UhfConfig::default())
        }
        Err(e) => Err(e).context("Failed to load configuration"),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let flags = CrateDebugFlags::from_args(args.debug.iter().map(|c| format!("--debug-{}", c)));
    let _log_guard = init_logging(&flags, &LoggingOptions::default())?;

    let config = load_or_default(args.config.as_ref())?;
    let sim = Arc::new(SimulatedReader::new(args.surface.sim()));
    let service = InventoryService::new(config, Box::new(sim.provider()))?.with_name("simulator");

    let (batch_tx, batch_rx) = channel::unbounded::<Vec<TagRecord>>();
    service.attach_consumer(Arc::new(move |batch: Vec<TagRecord>| {
        // printer gone means the run is over
        let _ = batch_tx.send(batch);
    }));

    if let Some(power) = args.power {
        info!("Power set to {} dBm", service.set_power(power));
    }
    service.start_inventory(StartOptions {
        full_scan: args.full_scan,
        window_ms: None,
        scan_hz: args.scan_hz,
    })?;

    let feeding = Arc::new(AtomicBool::new(true));
    let feeder = {
        let sim = Arc::clone(&sim);
        let feeding = Arc::clone(&feeding);
        let (tags, sweep_gap, via_callback) = (
            args.tags,
            Duration::from_millis(args.sweep_ms),
            matches!(args.surface, Surface::Callback),
        );
        thread::Builder::new()
            .name("sim-field".to_string())
            .spawn(move || {
                let mut sweep = 0;
                while feeding.load(Ordering::Relaxed) {
                    for tag in 0..tags {
                        let epc = synthetic_epc(tag);
                        let rssi = Some(synthetic_rssi(tag, sweep));
                        if via_callback {
                            sim.emit_tag(&epc, rssi);
                        } else {
                            sim.push_tag(epc, rssi);
                        }
                    }
                    sweep += 1;
                    thread::sleep(sweep_gap);
                }
            })
            .context("Failed to spawn field thread")?
    };

    let deadline = Instant::now() + Duration::from_millis(args.duration_ms);
    let mut delivered = 0usize;
    let mut batches = 0usize;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match batch_rx.recv_timeout(remaining) {
            Ok(batch) => {
                delivered += batch.len();
                batches += 1;
                println!("{}", serde_json::to_string(&batch)?);
            }
            Err(RecvTimeoutError::Timeout) => break,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    feeding.store(false, Ordering::Relaxed);
    if feeder.join().is_err() {
        warn!("Field thread panicked");
    }

    let leftover = service.pull_batch();
    if !leftover.is_empty() {
        delivered += leftover.len();
        println!("{}", serde_json::to_string(&leftover)?);
    }
    service.shutdown();

    info!(
        "Session finished: {} records in {} batches, {} reads, phase {:?}",
        delivered,
        batches,
        sim.read_count(),
        service.phase()
    );
    Ok(())
}
