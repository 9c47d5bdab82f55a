//! Batch driver: assigns region codes to newline-delimited JSON records.
//!
//! Loads the region boundaries, builds the spatial index, then streams
//! records through the engine in bounded chunks.

mod config;
mod records;

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use tractor::models::{BatchSummary, Point};
use tractor::pip::{AssignmentEngine, BatchRunner};
use tractor::{build_index, load_regions};

use crate::config::Config;
use crate::records::{Record, RecordReader, RecordWriter};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "assign")]
#[command(about = "Assign region codes (e.g. census tracts) to point records")]
struct Args {
    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Region boundary GeoJSON (overrides config)
    #[arg(long)]
    regions: Option<PathBuf>,

    /// Feature property holding the region code (overrides config)
    #[arg(long)]
    id_field: Option<String>,

    /// Newline-delimited JSON input; stdin when omitted
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output file; stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Where to write records rejected for invalid coordinates
    #[arg(long)]
    rejects: Option<PathBuf>,

    /// Points per chunk (overrides config)
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Worker threads (overrides config)
    #[arg(long)]
    workers: Option<usize>,

    /// Boundary tolerance in coordinate units (overrides config)
    #[arg(long)]
    epsilon: Option<f64>,

    /// Stop after this many seconds; only whole chunks are written
    #[arg(long)]
    time_budget_secs: Option<u64>,
}

fn main() -> Result<()> {
    // Initialize logging (stderr, so stdout stays clean for records)
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    let config = resolve_config(&args)?;
    let kernel = config.kernel()?;

    info!("Tractor batch assignment");
    info!("Regions: {}", config.regions.path.display());

    // Setup phase: fatal on any error
    let catalog = load_regions(&config.regions).context("Failed to load regions")?;
    let index = build_index(&catalog);
    let engine = AssignmentEngine::new(&catalog, &index, kernel);
    let runner = BatchRunner::new(&config.batch).context("Failed to start worker pool")?;

    let input: Box<dyn BufRead> = match &args.input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };
    let output: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout())),
    };
    let rejects: Option<Box<dyn Write>> = match &args.rejects {
        Some(path) => Some(Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        ))),
        None => None,
    };

    let mut reader = RecordReader::new(input, config.input.clone());
    let mut writer = RecordWriter::new(output, rejects, config.output.clone());

    let cancel = Arc::new(AtomicBool::new(false));
    if let Some(secs) = args.time_budget_secs {
        let cancel = Arc::clone(&cancel);
        thread::spawn(move || {
            thread::sleep(Duration::from_secs(secs));
            cancel.store(true, Ordering::Relaxed);
        });
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {pos} records ({per_sec})")?,
    );

    // One read feeds every worker a full chunk
    let read_size = runner.chunk_size().saturating_mul(runner.workers());
    let mut summary = BatchSummary::default();

    loop {
        if cancel.load(Ordering::Relaxed) {
            warn!("Time budget exhausted, stopping before the next chunk");
            break;
        }

        let records = reader.next_chunk(read_size)?;
        if records.is_empty() {
            break;
        }

        let count = records.len() as u64;
        if !process_read(&runner, &engine, records, &cancel, &mut writer, &mut summary)? {
            break;
        }
        pb.inc(count);
    }

    writer.flush()?;
    pb.finish_and_clear();

    info!(
        "Done: {} matched, {} ambiguous, {} unmatched, {} invalid, {} without coordinates",
        summary.matched, summary.ambiguous, summary.unmatched, summary.invalid, summary.skipped
    );

    Ok(())
}

/// Assign and write one read. Returns `false` when the run was cancelled
/// part way; the whole read is then discarded and nothing is written.
fn process_read<W: Write>(
    runner: &BatchRunner,
    engine: &AssignmentEngine<'_>,
    records: Vec<Record>,
    cancel: &AtomicBool,
    writer: &mut RecordWriter<W>,
    summary: &mut BatchSummary,
) -> Result<bool> {
    let points: Vec<Point> = records.iter().filter_map(|r| r.point.clone()).collect();
    let skipped = records.len() - points.len();

    let output = runner.run(engine, &points, Some(cancel));
    if output.cancelled {
        warn!("Discarding {} records from an interrupted chunk", records.len());
        return Ok(false);
    }

    summary.merge(&output.summary);
    for _ in 0..skipped {
        summary.record_skipped();
    }

    writer.write_chunk(records, output.outcomes)?;
    Ok(true)
}

/// Config file (or defaults for `--regions`), then command-line overrides
fn resolve_config(args: &Args) -> Result<Config> {
    let mut config = match (&args.config, &args.regions) {
        (Some(path), _) => Config::load_from_file(path)?,
        (None, Some(regions)) => Config::for_regions(regions.clone()),
        (None, None) => anyhow::bail!("Either --config or --regions is required"),
    };

    if let Some(regions) = &args.regions {
        config.regions.path = regions.clone();
    }
    if let Some(id_field) = &args.id_field {
        config.regions.id_field = id_field.clone();
    }
    if let Some(chunk_size) = args.chunk_size {
        config.batch.chunk_size = chunk_size;
    }
    if let Some(workers) = args.workers {
        config.batch.workers = Some(workers);
    }
    if let Some(epsilon) = args.epsilon {
        config.kernel.epsilon = epsilon;
    }

    Ok(config)
}
