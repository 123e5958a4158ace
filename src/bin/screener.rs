//! Command-line entry point: parses flags, installs the logger, and hands
//! off to `orchestrator::run`.

use clap::Parser;
use tw_screener::orchestrator::{self, Mode, RunOptions};

/// Daily equity screener for the Taiwan stock market.
#[derive(Debug, Parser)]
#[command(name = "screener", version, about)]
struct Cli {
    /// Run outside the trading-hours window (bypasses the calendar gate).
    #[arg(short, long)]
    force: bool,

    /// Which filter chain to run.
    #[arg(long, value_enum, default_value_t = ModeArg::Left)]
    mode: ModeArg,

    /// Also run the bullish-pool membership scan after the chosen chain.
    #[arg(long)]
    pool: bool,

    /// Only run the bullish-pool membership scan, skipping the chain.
    #[arg(long)]
    pool_only: bool,

    /// Also run the institutional-flow tracker scan after the chosen chain.
    #[arg(long)]
    inst: bool,

    /// Only run the institutional-flow tracker scan, skipping the chain.
    #[arg(long)]
    inst_only: bool,

    /// Run the chain, the pool scan, and the institutional scan together.
    #[arg(long)]
    all: bool,

    /// Increase log verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum ModeArg {
    Left,
    Right,
}

impl From<ModeArg> for Mode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Left => Mode::Left,
            ModeArg::Right => Mode::Right,
        }
    }
}

fn init_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("tw_screener={default_level}")));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let opts = RunOptions {
        force: cli.force,
        mode: cli.mode.into(),
        run_pool: cli.pool || cli.all,
        run_institutional: cli.inst || cli.all,
        pool_only: cli.pool_only,
        institutional_only: cli.inst_only,
    };

    tokio::select! {
        result = orchestrator::run(opts) => match result {
            Ok(()) => std::process::ExitCode::SUCCESS,
            Err(e) => {
                tracing::error!(error = %e, "screener run failed");
                std::process::ExitCode::FAILURE
            }
        },
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupted, exiting");
            std::process::ExitCode::from(130)
        }
    }
}
