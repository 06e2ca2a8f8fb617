//! highscan CLI: market scanner for fresh highs, intraday boosts and
//! breakouts.
//!
//! Commands:
//! - `scan`: one full pass over the universe, then exit
//! - `watch`: a pass now, then one every cadence
//! - `highs`: fresh 52-week-high screen over given tickers or the universe
//! - `universe`: list the universe categories, optionally export as TOML

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use highscan_core::data::{
    NseIndexProvider, StaticUniverse, Universe, UniverseProvider, YahooProvider,
};
use highscan_core::domain::{normalize_tickers, Ticker};
use highscan_runner::{run_schedule, ScanConfig, Scanner, Schedule, StdoutReporter};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "highscan",
    about = "NSE market scanner for 52-week highs, intraday boosts, breakouts"
)]
struct Cli {
    /// Path to a TOML scan config. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to a TOML universe (category → tickers) instead of the NSE lists.
    #[arg(long, global = true)]
    universe: Option<PathBuf>,

    /// Override the intraday volume-spike threshold.
    #[arg(long, global = true)]
    threshold: Option<f64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one full scan pass and exit.
    Scan,
    /// Scan now, then every cadence until interrupted.
    Watch {
        /// Seconds between passes (overrides the config).
        #[arg(long)]
        cadence: Option<u64>,

        /// Stop after this many passes.
        #[arg(long)]
        cycles: Option<u64>,
    },
    /// Screen for fresh 52-week highs.
    Highs {
        /// Tickers to screen (e.g., RELIANCE TCS INFY.NS). Defaults to the universe.
        tickers: Vec<String>,
    },
    /// Show the scan universe.
    Universe {
        /// Write the universe to this TOML file.
        #[arg(long)]
        export: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(threshold) = cli.threshold {
        config.volume_threshold = threshold;
    }

    match cli.command {
        Commands::Scan => run_scan(config, cli.universe.as_deref()),
        Commands::Watch { cadence, cycles } => {
            if let Some(secs) = cadence {
                config.cadence_secs = secs;
            }
            run_watch(config, cli.universe.as_deref(), cycles)
        }
        Commands::Highs { tickers } => run_highs(config, cli.universe.as_deref(), tickers),
        Commands::Universe { export } => {
            run_universe(&config, cli.universe.as_deref(), export.as_deref())
        }
    }
}

/// Logs go to stderr so stdout carries only the scan report.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,highscan=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<ScanConfig> {
    let config = match path {
        Some(path) => ScanConfig::from_file(path)?,
        None => ScanConfig::default(),
    };
    Ok(config)
}

fn load_universe(config: &ScanConfig, path: Option<&Path>) -> Result<Universe> {
    let provider: Box<dyn UniverseProvider> = match path {
        Some(path) => Box::new(StaticUniverse(
            Universe::from_file(path).with_context(|| format!("universe {}", path.display()))?,
        )),
        None => Box::new(NseIndexProvider::new(
            config.request_timeout(),
            &config.market_suffix,
        )?),
    };

    let load = provider.load();
    for (category, err) in &load.failed {
        warn!("universe category '{category}' unavailable: {err}");
    }
    Ok(load.universe)
}

fn build_scanner(config: ScanConfig, symbols: Vec<Ticker>) -> Result<Scanner> {
    let provider = YahooProvider::new(config.request_timeout())?;
    Ok(Scanner::new(config, symbols, Box::new(provider))?)
}

fn universe_scanner(config: ScanConfig, universe_path: Option<&Path>) -> Result<Scanner> {
    let universe = load_universe(&config, universe_path)?;
    let symbols = universe.symbol_set(&config.market_suffix);
    if symbols.is_empty() {
        bail!("the universe is empty");
    }
    info!("scanning {} symbols", symbols.len());
    build_scanner(config, symbols)
}

fn run_scan(config: ScanConfig, universe_path: Option<&Path>) -> Result<()> {
    let mut scanner = universe_scanner(config, universe_path)?;
    scanner.scan_once(&StdoutReporter);
    Ok(())
}

fn run_watch(config: ScanConfig, universe_path: Option<&Path>, cycles: Option<u64>) -> Result<()> {
    if cycles == Some(0) {
        bail!("--cycles must be at least 1");
    }
    let schedule = Schedule::new(config.cadence());
    let mut scanner = universe_scanner(config, universe_path)?;

    println!(
        "\nScheduled full scan every {} minute(s).",
        (schedule.cadence().as_secs() as f64 / 60.0)
    );
    let passes = run_schedule(&mut scanner, &schedule, &StdoutReporter, cycles, |_| {});
    info!("watch finished after {passes} pass(es)");
    Ok(())
}

fn run_highs(config: ScanConfig, universe_path: Option<&Path>, tickers: Vec<String>) -> Result<()> {
    let requested = normalize_tickers(&tickers, &config.market_suffix);
    if !tickers.is_empty() && requested.is_empty() {
        bail!("no usable tickers in {tickers:?}");
    }

    let mut scanner = if requested.is_empty() {
        universe_scanner(config, universe_path)?
    } else {
        build_scanner(config, requested.clone())?
    };

    println!("Fresh 52-week highs:");
    let highs = scanner.fresh_high_screen(&requested, &StdoutReporter);
    println!("\n{} fresh high(s)", highs.len());
    Ok(())
}

fn run_universe(config: &ScanConfig, universe_path: Option<&Path>, export: Option<&Path>) -> Result<()> {
    let universe = load_universe(config, universe_path)?;

    println!("{:<24} {:>8}", "Category", "Tickers");
    println!("{}", "-".repeat(33));
    for (name, tickers) in &universe.sectors {
        println!("{name:<24} {:>8}", tickers.len());
    }
    println!("{}", "-".repeat(33));
    println!(
        "{:<24} {:>8}",
        "Unique symbols",
        universe.symbol_set(&config.market_suffix).len()
    );

    if let Some(path) = export {
        std::fs::write(path, universe.to_toml()?)
            .with_context(|| format!("write {}", path.display()))?;
        println!("\nUniverse written to: {}", path.display());
    }
    Ok(())
}
