//! CLI definition and dispatch.

use chrono::{Local, NaiveDate, NaiveDateTime};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::adapters::console_report::ConsoleReport;
use crate::adapters::csv_adapter::{CsvPriceAdapter, CsvTrialStore};
use crate::adapters::file_config_adapter::{FileConfigAdapter, LayeredConfig};
use crate::adapters::memory_store::MemoryTrialStore;
use crate::domain::aggregate::BestResults;
use crate::domain::backtest::{
    self as backtest_engine, BacktestConfig, DataSource, LedgerRetention, Period, StoreKind,
};
use crate::domain::config_validation::{parse_value, validate_backtest_config};
use crate::domain::error::SmartDcaError;
use crate::domain::generator::RangeMode;
use crate::domain::multipliers::MultiplierConfig;
use crate::domain::price::PriceSeries;
use crate::domain::trial::TrialId;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::PriceDataPort;
use crate::ports::report_port::ReportPort;
use crate::ports::trial_store::TrialStore;

#[cfg(feature = "sqlite")]
use crate::adapters::sqlite_adapter::SqliteAdapter;

pub const DEFAULT_ASSET: &str = "SWDA.MI";
pub const DEFAULT_TRIALS: u32 = 10_000;
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_POOL_SIZE: u32 = 4;
/// Directory created under the output root.
pub const OUTPUT_DIR_NAME: &str = "smart-dca-backtest";
/// Results database inside a run directory when `store = sqlite`.
pub const SQLITE_RESULTS_FILE: &str = "results.sqlite";

const LICENSE: &str = "\
smartdca - smart dollar-cost averaging backtester

This program comes with ABSOLUTELY NO WARRANTY.
This is free software, and you are welcome to redistribute it under certain
conditions; see the GNU General Public License, version 3 or later.";

#[derive(Parser, Debug)]
#[command(
    name = "smartdca",
    version,
    about = "Smart dollar-cost averaging backtester"
)]
pub struct Cli {
    /// Log warnings only and skip the results table
    #[arg(short, long, global = true)]
    pub quiet: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a baseline and a sweep of smart DCA trials
    Backtest(BacktestArgs),
    /// Re-aggregate the trials of an existing run directory
    Summarize {
        #[arg(short, long)]
        dir: PathBuf,
    },
    /// Recompute the metrics of one stored ledger
    Inspect {
        #[arg(short, long)]
        dir: PathBuf,
        /// Trial id; 0 is the DCA baseline
        #[arg(short, long)]
        trial: u32,
    },
    /// Show the license notice
    License,
}

/// Command-line values take precedence over the `--config` file.
#[derive(Args, Debug, Default)]
pub struct BacktestArgs {
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Asset to analyze [default: SWDA.MI]
    #[arg(short, long)]
    pub asset: Option<String>,
    /// Index shortcut instead of --asset
    #[arg(long, value_enum, conflicts_with = "asset")]
    pub index: Option<IndexPreset>,
    /// Years to backtest [default: all history]
    #[arg(short, long)]
    pub period: Option<u32>,
    /// Directory holding `<asset>.csv` price files
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
    /// Price source: csv or sqlite
    #[arg(long)]
    pub source: Option<String>,
    /// SQLite price database
    #[arg(long)]
    pub db: Option<PathBuf>,
    /// Maximum multiplier [default: 2]
    #[arg(short = 'M', long)]
    pub max_mult: Option<f64>,
    /// Minimum multiplier [default: 0.25]
    #[arg(short = 'm', long)]
    pub min_mult: Option<f64>,
    /// Multiplier increment [default: 0.25]
    #[arg(long, conflicts_with = "rand_mult")]
    pub mult_incr: Option<f64>,
    /// Pin the most negative tier to the maximum multiplier
    #[arg(long)]
    pub force_max: bool,
    /// Pin the most positive tier to the minimum multiplier
    #[arg(long)]
    pub force_min: bool,
    /// Draw new random multipliers for every trial
    #[arg(long)]
    pub rand_mult: bool,
    /// Keep random range boundaries below zero
    #[arg(long)]
    pub force_neg: bool,
    /// Random range trials [default: 10000]
    #[arg(short, long, conflicts_with = "incr_ranges")]
    pub trials: Option<u32>,
    /// Scan incremental ranges instead of random ones
    #[arg(long)]
    pub incr_ranges: bool,
    /// Existing directory to write results under [default: $HOME]
    #[arg(short = 'O', long)]
    pub output: Option<PathBuf>,
    /// Trial store: csv, sqlite or memory
    #[arg(long)]
    pub store: Option<String>,
    /// Ledgers to keep: all or winners
    #[arg(long)]
    pub ledgers: Option<String>,
    /// Worker threads, 0 for one per CPU
    #[arg(short, long)]
    pub jobs: Option<usize>,
    /// Master seed for parameter generation
    #[arg(long)]
    pub seed: Option<u64>,
    /// Print load, analysis and total durations
    #[arg(short = 'T', long)]
    pub time: bool,
    /// Validate and print the resolved configuration without running
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum IndexPreset {
    #[value(name = "sp500")]
    Sp500,
    #[value(name = "dji")]
    Dji,
    #[value(name = "nasdaq")]
    Nasdaq,
    #[value(name = "nyse")]
    Nyse,
    #[value(name = "r2000")]
    R2000,
    #[value(name = "ftse100")]
    Ftse100,
    #[value(name = "n225")]
    N225,
    #[value(name = "ftsemib")]
    FtseMib,
}

impl IndexPreset {
    pub fn ticker(self) -> &'static str {
        match self {
            IndexPreset::Sp500 => "^GSPC",
            IndexPreset::Dji => "^DJI",
            IndexPreset::Nasdaq => "^IXIC",
            IndexPreset::Nyse => "^NYA",
            IndexPreset::R2000 => "^RUT",
            IndexPreset::Ftse100 => "^FTSE",
            IndexPreset::N225 => "^N225",
            IndexPreset::FtseMib => "FTSEMIB.MI",
        }
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the default level.
pub fn init_logging(quiet: bool) {
    let default = if quiet { "warn" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest(args) => run_backtest(&args, cli.quiet),
        Command::Summarize { dir } => run_summarize(&dir, cli.quiet),
        Command::Inspect { dir, trial } => run_inspect(&dir, TrialId(trial)),
        Command::License => {
            println!("{LICENSE}");
            ExitCode::SUCCESS
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = SmartDcaError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

/// Put the command-line values of `args` on top of the optional file.
pub fn layer_overrides(args: &BacktestArgs, base: Option<FileConfigAdapter>) -> LayeredConfig {
    let mut layered = LayeredConfig::new(base);
    let asset = args
        .asset
        .clone()
        .or_else(|| args.index.map(|i| i.ticker().to_string()));

    layered
        .set_opt("backtest", "asset", asset)
        .set_opt("backtest", "period", args.period)
        .set_opt("data", "dir", args.data_dir.as_ref().map(|p| p.display()))
        .set_opt("data", "source", args.source.as_deref())
        .set_opt("sqlite", "path", args.db.as_ref().map(|p| p.display()))
        .set_opt("multipliers", "max", args.max_mult)
        .set_opt("multipliers", "min", args.min_mult)
        .set_opt("multipliers", "increment", args.mult_incr)
        .set_flag("multipliers", "force_max", args.force_max)
        .set_flag("multipliers", "force_min", args.force_min)
        .set_flag("multipliers", "randomize", args.rand_mult)
        .set_flag("ranges", "force_negative", args.force_neg)
        .set_opt("output", "dir", args.output.as_ref().map(|p| p.display()))
        .set_opt("output", "store", args.store.as_deref())
        .set_opt("output", "ledgers", args.ledgers.as_deref())
        .set_opt("run", "jobs", args.jobs)
        .set_opt("run", "seed", args.seed);

    if args.incr_ranges {
        layered.set("ranges", "mode", "incremental");
    } else if let Some(trials) = args.trials {
        layered.set("ranges", "mode", "random").set("ranges", "trials", trials);
    }
    // The db path alone selects the sqlite source.
    if args.db.is_some() && args.source.is_none() {
        layered.set("data", "source", "sqlite");
    }
    layered
}

/// Build the immutable run configuration. Expects a validated `adapter`.
pub fn build_backtest_config(adapter: &dyn ConfigPort) -> Result<BacktestConfig, SmartDcaError> {
    let asset = adapter
        .get_string("backtest", "asset")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_ASSET.to_string());

    let period = match parse_value::<u32>(adapter, "backtest", "period")? {
        Some(years) => Period::Years(years),
        None => Period::All,
    };

    let source = adapter
        .get_string("data", "source")
        .unwrap_or_else(|| "csv".to_string());
    let data_source = match source.trim().to_ascii_lowercase().as_str() {
        "sqlite" => DataSource::Sqlite {
            path: adapter
                .get_string("sqlite", "path")
                .map(PathBuf::from)
                .ok_or_else(|| SmartDcaError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?,
            pool_size: parse_value::<u32>(adapter, "sqlite", "pool_size")?.unwrap_or(DEFAULT_POOL_SIZE),
        },
        "csv" => DataSource::Csv {
            dir: adapter
                .get_string("data", "dir")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
        },
        other => {
            return Err(SmartDcaError::ConfigInvalid {
                section: "data".into(),
                key: "source".into(),
                reason: format!("unknown source `{other}`"),
            });
        }
    };

    let defaults = MultiplierConfig::default();
    let multipliers = MultiplierConfig {
        max_cap: parse_value::<f64>(adapter, "multipliers", "max")?.unwrap_or(defaults.max_cap),
        min_cap: parse_value::<f64>(adapter, "multipliers", "min")?.unwrap_or(defaults.min_cap),
        increment: parse_value::<f64>(adapter, "multipliers", "increment")?.unwrap_or(defaults.increment),
        force_max: adapter.get_bool("multipliers", "force_max", false),
        force_min: adapter.get_bool("multipliers", "force_min", false),
        randomize: adapter.get_bool("multipliers", "randomize", false),
    };

    let range_mode = match adapter
        .get_string("ranges", "mode")
        .map(|m| m.trim().to_ascii_lowercase())
        .as_deref()
    {
        Some("incremental") => RangeMode::Incremental,
        _ => RangeMode::Random {
            trials: parse_value::<u32>(adapter, "ranges", "trials")?.unwrap_or(DEFAULT_TRIALS),
        },
    };

    let seed = match parse_value::<u64>(adapter, "run", "seed")? {
        Some(seed) => seed,
        None => rand::random(),
    };

    Ok(BacktestConfig {
        asset,
        period,
        data_source,
        multipliers,
        range_mode,
        force_negative: adapter.get_bool("ranges", "force_negative", false),
        output_root: adapter.get_string("output", "dir").map(PathBuf::from),
        store: parse_value::<StoreKind>(adapter, "output", "store")?.unwrap_or(StoreKind::Csv),
        ledgers: parse_value::<LedgerRetention>(adapter, "output", "ledgers")?.unwrap_or(LedgerRetention::All),
        jobs: parse_value::<usize>(adapter, "run", "jobs")?.unwrap_or(0),
        seed,
        quiet: false,
        timing: false,
    })
}

/// `<root>/smart-dca-backtest/<asset>_<YYYYmmdd_HHMMSS>`; root defaults to
/// `$HOME` and must be an existing directory.
pub fn resolve_output_dir(
    root: Option<&Path>,
    asset: &str,
    now: NaiveDateTime,
) -> Result<PathBuf, SmartDcaError> {
    let root = match root {
        Some(root) if root.is_dir() => root.to_path_buf(),
        Some(root) => {
            return Err(SmartDcaError::ConfigInvalid {
                section: "output".into(),
                key: "dir".into(),
                reason: format!("invalid output path {}", root.display()),
            });
        }
        None => std::env::var_os("HOME")
            .map(PathBuf::from)
            .ok_or_else(|| SmartDcaError::ConfigMissing {
                section: "output".into(),
                key: "dir".into(),
            })?,
    };
    let run_dir = format!("{}_{}", asset, now.format("%Y%m%d_%H%M%S"));
    Ok(root.join(OUTPUT_DIR_NAME).join(run_dir))
}

fn run_backtest(args: &BacktestArgs, quiet: bool) -> ExitCode {
    let started = Instant::now();

    let base = match &args.config {
        Some(path) => {
            info!(path = %path.display(), "loading config");
            match load_config(path) {
                Ok(a) => Some(a),
                Err(code) => return code,
            }
        }
        None => None,
    };
    let layered = layer_overrides(args, base);

    if let Err(e) = validate_backtest_config(&layered) {
        eprintln!("error: {e}");
        return (&e).into();
    }
    let mut config = match build_backtest_config(&layered) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    config.quiet = quiet;
    config.timing = args.time;

    if args.dry_run {
        print_dry_run(&config);
        return ExitCode::SUCCESS;
    }

    match execute_backtest(&config, started) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

fn print_dry_run(config: &BacktestConfig) {
    println!("Configuration is valid");
    println!("  asset:       {}", config.asset);
    match config.period {
        Period::All => println!("  period:      all history"),
        Period::Years(n) => println!("  period:      {n} years"),
    }
    match &config.data_source {
        DataSource::Csv { dir } => println!("  prices:      csv in {}", dir.display()),
        DataSource::Sqlite { path, .. } => println!("  prices:      sqlite {}", path.display()),
    }
    match config.range_mode {
        RangeMode::Random { trials } => println!("  ranges:      random, {trials} trials"),
        RangeMode::Incremental => println!("  ranges:      incremental"),
    }
    let m = &config.multipliers;
    println!(
        "  multipliers: max {} min {} increment {}{}",
        m.max_cap,
        m.min_cap,
        m.increment,
        if m.randomize { ", randomized" } else { "" }
    );
    println!("  store:       {}", config.store);
    println!("  seed:        {}", config.seed);
}

/// Load prices, run the sweep, print the table.
pub fn execute_backtest(config: &BacktestConfig, started: Instant) -> Result<BestResults, SmartDcaError> {
    let now = Local::now();
    let output_dir = resolve_output_dir(config.output_root.as_deref(), &config.asset, now.naive_local())?;

    let load_started = Instant::now();
    let series = load_series(config, now.date_naive())?;
    let load_time = load_started.elapsed();

    let store = create_store(config.store, &output_dir)?;
    if config.store != StoreKind::Memory {
        info!(dir = %output_dir.display(), store = %config.store, "writing results");
    }

    let analysis_started = Instant::now();
    let best = backtest_engine::run_backtest(&series, config, store.as_ref())?;
    let analysis_time = analysis_started.elapsed();

    if !config.quiet {
        println!("Asset:      {}", config.asset);
        println!("Start date: {}\n", series.start_date());
        print!("{}", ConsoleReport.render(&best));
    }
    if config.timing {
        println!("\n{}", "-".repeat(75));
        println!("Load time:            {}", format_duration(load_time));
        println!("Analysis time:        {}", format_duration(analysis_time));
        println!("Total execution time: {}", format_duration(started.elapsed()));
    }
    Ok(best)
}

fn load_series(config: &BacktestConfig, today: NaiveDate) -> Result<PriceSeries, SmartDcaError> {
    let start = config.period.start_date(today);
    info!(asset = %config.asset, ?start, "loading prices");
    match &config.data_source {
        DataSource::Csv { dir } => {
            CsvPriceAdapter::new(dir.clone()).fetch_price_series(&config.asset, start, today)
        }
        #[cfg(feature = "sqlite")]
        DataSource::Sqlite { path, pool_size } => {
            SqliteAdapter::open(path, *pool_size)?.fetch_price_series(&config.asset, start, today)
        }
        #[cfg(not(feature = "sqlite"))]
        DataSource::Sqlite { .. } => Err(sqlite_unavailable("data", "source")),
    }
}

#[cfg(not(feature = "sqlite"))]
fn sqlite_unavailable(section: &str, key: &str) -> SmartDcaError {
    SmartDcaError::ConfigInvalid {
        section: section.into(),
        key: key.into(),
        reason: "built without the sqlite feature".into(),
    }
}

pub fn create_store(kind: StoreKind, dir: &Path) -> Result<Box<dyn TrialStore>, SmartDcaError> {
    match kind {
        StoreKind::Memory => Ok(Box::new(MemoryTrialStore::new())),
        StoreKind::Csv => Ok(Box::new(CsvTrialStore::create(dir.to_path_buf())?)),
        #[cfg(feature = "sqlite")]
        StoreKind::Sqlite => {
            std::fs::create_dir_all(dir)?;
            Ok(Box::new(SqliteAdapter::open(
                &dir.join(SQLITE_RESULTS_FILE),
                DEFAULT_POOL_SIZE,
            )?))
        }
        #[cfg(not(feature = "sqlite"))]
        StoreKind::Sqlite => Err(sqlite_unavailable("output", "store")),
    }
}

/// The store of a finished run: SQLite when the results database exists,
/// the CSV layout otherwise.
pub fn open_store(dir: &Path) -> Result<Box<dyn TrialStore>, SmartDcaError> {
    let db = dir.join(SQLITE_RESULTS_FILE);
    if db.is_file() {
        #[cfg(feature = "sqlite")]
        return Ok(Box::new(SqliteAdapter::open(&db, DEFAULT_POOL_SIZE)?));
        #[cfg(not(feature = "sqlite"))]
        return Err(sqlite_unavailable("output", "store"));
    }
    Ok(Box::new(CsvTrialStore::open(dir.to_path_buf())?))
}

fn run_summarize(dir: &Path, quiet: bool) -> ExitCode {
    let result = open_store(dir).and_then(|store| backtest_engine::resummarize(store.as_ref()));
    match result {
        Ok(loaded) => {
            if loaded.skipped > 0 {
                warn!(skipped = loaded.skipped, "malformed summary rows skipped");
            }
            if !quiet {
                print!("{}", ConsoleReport.render(&loaded.value));
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

fn run_inspect(dir: &Path, trial: TrialId) -> ExitCode {
    let result = open_store(dir).and_then(|store| backtest_engine::inspect_trial(store.as_ref(), trial));
    let loaded = match result {
        Ok(l) => l,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    if loaded.skipped > 0 {
        warn!(skipped = loaded.skipped, "malformed ledger rows skipped");
    }

    let m = &loaded.value;
    println!("Trial:                  {trial}");
    println!("Value:                  {:.2} $", m.final_value);
    println!("Invested:               {:.2} $", m.invested_total);
    println!("Gain:                   {:.2} %", m.gain_pct);
    println!("All-time-high drawdown: {:.2} %", m.ath_drawdown_pct);
    println!("Max drawdown:           {:.2} %", m.max_drawdown_pct);
    println!(
        "Time to recovery:       {} months{}",
        m.time_to_recovery,
        if m.recovered { "" } else { " (not recovered)" }
    );
    ExitCode::SUCCESS
}

/// `H:MM:SS.ffffff`
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    format!(
        "{}:{:02}:{:02}.{:06}",
        secs / 3600,
        (secs / 60) % 60,
        secs % 60,
        d.subsec_micros()
    )
}
