//! # Run a backtest
//! options-backtest run --config backtest.toml
//!
//! # Run and write positions to JSON
//! options-backtest run --config backtest.toml --output positions.json
//!
//! # List the trading days and snapshot paths a run would use
//! options-backtest calendar --config backtest.toml
//!
//! # Run one contract selection
//! options-backtest select --config backtest.toml --symbol BAC --date 2016-01-04

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;

use options_backtest::data::{CalendarProvider, ChainLoader};
use options_backtest::{BacktestEngine, BacktestFile, Position, RunSummary};

const SEPARATOR: &str = "============================================================";

#[derive(Parser)]
#[command(name = "options-backtest")]
#[command(about = "Calendar-driven options entry backtester")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a backtest with given configuration
    Run {
        /// Path to configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Write positions to this JSON file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List trading days and their snapshot paths
    Calendar {
        /// Path to configuration file
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Select the entry contract for one symbol on one day
    Select {
        /// Path to configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Underlying symbol
        #[arg(short, long)]
        symbol: String,

        /// As-of date (YYYY-MM-DD)
        #[arg(short, long)]
        date: String,
    },
}

/// Positions written by `run --output`.
#[derive(Serialize)]
struct RunReport<'a> {
    summary: &'a RunSummary,
    open: Vec<&'a Position>,
    closed: Vec<&'a Position>,
}

fn cmd_run(config: PathBuf, output: Option<PathBuf>) -> Result<()> {
    let file = BacktestFile::load(&config)
        .with_context(|| format!("Failed to load config {}", config.display()))?;

    let days = file
        .run
        .calendar()
        .trading_days()
        .context("Failed to read trading days")?;

    let mut engine = BacktestEngine::new(file.profile.clone(), file.run.loader())?
        .with_missing_chain_policy(file.run.on_missing_chain);
    let summary = engine.run(&days)?;

    println!("{}", SEPARATOR);
    println!("{}", summary.summary());
    println!("{}", SEPARATOR);

    if let Some(path) = output {
        let book = engine.book();
        let report = RunReport {
            summary: &summary,
            open: book
                .symbols()
                .iter()
                .flat_map(|s| book.open_positions(s))
                .collect(),
            closed: book
                .symbols()
                .iter()
                .flat_map(|s| book.closed_positions(s))
                .collect(),
        };
        let json = serde_json::to_string_pretty(&report)?;
        fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Positions written to {}", path.display());
    }

    Ok(())
}

fn cmd_calendar(config: PathBuf) -> Result<()> {
    let file = BacktestFile::load(&config)
        .with_context(|| format!("Failed to load config {}", config.display()))?;
    let days = file
        .run
        .calendar()
        .trading_days()
        .context("Failed to read trading days")?;

    for day in &days {
        println!(
            "{}  {}",
            day.as_of,
            day.locator.resolve(&file.run.data_root).display()
        );
    }
    println!("{} trading days", days.len());
    Ok(())
}

fn cmd_select(config: PathBuf, symbol: String, date: String) -> Result<()> {
    let file = BacktestFile::load(&config)
        .with_context(|| format!("Failed to load config {}", config.display()))?;
    let as_of = NaiveDate::parse_from_str(&date, "%Y-%m-%d").context("Invalid date format")?;

    if !file.profile.symbols.contains(&symbol) {
        bail!("{} is not in the profile's symbols", symbol);
    }

    let days = file
        .run
        .calendar()
        .with_max_days(None)
        .trading_days()
        .context("Failed to read trading days")?;
    let Some(day) = days.iter().find(|d| d.as_of == as_of) else {
        bail!("{} is not a trading day", as_of);
    };

    let chain = file
        .run
        .loader()
        .load(day)
        .with_context(|| format!("Failed to load chain for {}", as_of))?;
    let strategy = file.profile.strategy.build();
    let selection = strategy.select(&chain, &symbol, as_of, file.profile.windows(&symbol))?;

    println!("{} {} ({} strategy)", symbol, as_of, strategy.name());
    println!(
        "  Window: {}  Strike: {}  Underlying: {}",
        selection.window, selection.strike, selection.underlying_price
    );
    for contract in &selection.contracts {
        println!(
            "  {} {} {}",
            contract.expiration,
            contract.strike,
            serde_json::to_string(&contract.fields)?
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("options_backtest=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, output } => cmd_run(config, output)?,
        Commands::Calendar { config } => cmd_calendar(config)?,
        Commands::Select {
            config,
            symbol,
            date,
        } => cmd_select(config, symbol, date)?,
    }

    Ok(())
}
