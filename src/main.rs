//! rfvscore: segment customers by recency, frequency and value
//!
//! Loads one purchase log, prints the segmentation and writes the requested exports.

use std::fs;
use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, LevelFilter};
use rfvscore::{compute_rfv, export, load_purchases, viz, Args};

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let start_time = Instant::now();

    let records = load_purchases(&args.input, args.input_format())
        .with_context(|| format!("Failed to load purchases from {}", args.input.display()))?;
    info!("Loaded {} purchase records", records.len());

    let report = compute_rfv(&records, &args.action_table())?;
    viz::print_report(&report, args.head);

    if let Some(path) = &args.csv_out {
        write_export(path, &export::to_csv_bytes(&report)?)?;
    }
    if let Some(path) = &args.xlsx_out {
        write_export(path, &export::to_xlsx_bytes(&report)?)?;
    }
    if let Some(path) = &args.chart {
        viz::create_score_chart(&report, path)?;
    }

    info!("Finished in {:.2}s", start_time.elapsed().as_secs_f64());
    Ok(())
}

/// `RUST_LOG` takes precedence over the `--verbose` default
fn init_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn write_export(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}
