//! tradecore - deterministic signal -> risk -> execution -> accounting ->
//! evolution pipeline for crypto strategy backtesting and paper trading.
//!
//! This binary provides five subcommands:
//! - backtest: run a strategy over one historical window
//! - optimize: grid-search strategy params and rank results
//! - paper-run: repeatedly run the pipeline over a rolling recent window
//! - decay-check: read-only strategy decay scoring
//! - evolve: promote a better-performing parameter set (dry-run by default)

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "tradecore")]
#[command(about = "Deterministic crypto strategy backtesting, optimization, and paper trading", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
#[allow(clippy::large_enum_variant)]
enum Commands {
    /// Run a strategy backtest over a historical window
    Backtest {
        #[arg(short, long, default_value = "configs/default.json")]
        config: String,

        /// Symbols to test (comma-separated). E.g., "BTCUSDT,ETHUSDT"
        #[arg(long)]
        symbols: Option<String>,

        #[arg(long, default_value = "1h")]
        interval: String,

        /// Start timestamp, RFC3339
        #[arg(long)]
        start: String,

        /// End timestamp, RFC3339
        #[arg(long)]
        end: String,

        #[arg(long, default_value = "data/candles")]
        cache_dir: String,
    },

    /// Grid-search strategy parameters (config must have a `grid` section)
    Optimize {
        #[arg(short, long, default_value = "configs/default.json")]
        config: String,

        #[arg(long)]
        symbols: Option<String>,

        #[arg(long, default_value = "1h")]
        interval: String,

        #[arg(long)]
        start: String,

        #[arg(long)]
        end: String,

        #[arg(long, default_value = "data/candles")]
        cache_dir: String,

        #[arg(short, long, default_value = "10")]
        top: usize,

        /// Run sequentially instead of in parallel
        #[arg(long)]
        sequential: bool,

        /// Cap the number of grid combinations run
        #[arg(long)]
        max_runs: Option<usize>,

        #[arg(short, long, default_value = "logs/optimizer/ranked_results.csv")]
        output: String,

        /// Append a PerformanceHistoryEntry for this run
        #[arg(long)]
        append_history: bool,
    },

    /// Repeatedly run the pipeline over a rolling recent window
    PaperRun {
        #[arg(short, long, default_value = "configs/default.json")]
        config: String,

        #[arg(long)]
        symbols: Option<String>,

        #[arg(long, default_value = "1h")]
        interval: String,

        /// Hours of history to re-evaluate each cycle
        #[arg(long, default_value = "200")]
        lookback_hours: i64,

        /// Seconds to sleep between cycles
        #[arg(long, default_value = "300")]
        cycle_seconds: u64,

        /// Number of cycles to run (0 = run forever)
        #[arg(long, default_value = "1")]
        cycles: u64,

        #[arg(long, default_value = "data/candles")]
        cache_dir: String,
    },

    /// Read-only strategy decay scoring
    DecayCheck {
        /// Symbols to check (comma-separated)
        #[arg(short, long)]
        symbols: String,

        #[arg(long, default_value = "10")]
        min_trades: u64,

        #[arg(long, default_value = "10.0")]
        winrate_threshold_pct: f64,

        #[arg(long, default_value = "10.0")]
        dd_threshold_pct: f64,

        #[arg(long, default_value = "90")]
        lookback_days: i64,
    },

    /// Evolve a symbol's strategy profile toward a better-performing
    /// historical parameter set
    Evolve {
        #[arg(short, long)]
        symbols: String,

        #[arg(long, default_value = "ema_rsi_scalper")]
        strategy: String,

        /// Actually overwrite the profile on APPLY (default is dry-run)
        #[arg(long)]
        live: bool,

        #[arg(long, default_value = "2.0")]
        min_improvement_return_pct: f64,

        #[arg(long, default_value = "5.0")]
        max_allowed_dd_increase_pct: f64,
    },
}

fn setup_logging(verbose: bool, command_name: &str, file_only: bool) -> anyhow::Result<()> {
    std::fs::create_dir_all("logs")?;

    let log_filename = format!("{}_{}.log", command_name, chrono::Local::now().format("%Y-%m-%d_%H-%M-%S"));
    let log_path = PathBuf::from("logs").join(&log_filename);

    let level = if verbose { "debug" } else { "info" };
    let filter_str = format!("{level},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn");
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    if file_only {
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        tracing_subscriber::registry().with(env_filter).with(file_layer).init();
    } else {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(true);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();

        info!("logging initialized, log file: {}", log_path.display());
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let (command_name, file_only) = match &cli.command {
        Commands::Backtest { .. } => ("backtest", false),
        Commands::Optimize { .. } => ("optimize", true),
        Commands::PaperRun { .. } => ("paper_run", false),
        Commands::DecayCheck { .. } => ("decay_check", false),
        Commands::Evolve { .. } => ("evolve", false),
    };

    if let Err(e) = setup_logging(cli.verbose, command_name, file_only) {
        eprintln!("failed to set up logging: {e}");
        std::process::exit(1);
    }

    let result = match cli.command {
        Commands::Backtest { config, symbols, interval, start, end, cache_dir } => {
            commands::backtest::run(config, symbols, interval, start, end, cache_dir)
        }
        Commands::Optimize {
            config,
            symbols,
            interval,
            start,
            end,
            cache_dir,
            top,
            sequential,
            max_runs,
            output,
            append_history,
        } => commands::optimize::run(config, symbols, interval, start, end, cache_dir, top, sequential, max_runs, output, append_history),
        Commands::PaperRun {
            config,
            symbols,
            interval,
            lookback_hours,
            cycle_seconds,
            cycles,
            cache_dir,
        } => commands::paper_run::run(config, symbols, interval, lookback_hours, cycle_seconds, cycles, cache_dir),
        Commands::DecayCheck {
            symbols,
            min_trades,
            winrate_threshold_pct,
            dd_threshold_pct,
            lookback_days,
        } => commands::decay_check::run(symbols, min_trades, winrate_threshold_pct, dd_threshold_pct, lookback_days),
        Commands::Evolve {
            symbols,
            strategy,
            live,
            min_improvement_return_pct,
            max_allowed_dd_increase_pct,
        } => commands::evolve::run(symbols, strategy, live, min_improvement_return_pct, max_allowed_dd_increase_pct),
    };

    if let Err(e) = result {
        error!("{e}");
        std::process::exit(e.exit_code());
    }
}
