//! gpugridd: the gpugrid scheduler daemon.
//!
//! # Usage
//!
//! ```text
//! gpugridd run --config gpugrid.toml --data-dir /var/lib/gpugrid
//! gpugridd simulate --workers 8 --jobs 100 --fail-every 7
//! gpugridd init-config > gpugrid.toml
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use gpugrid_core::GridConfig;
use gpugridd::daemon::{self, RunOptions};
use gpugridd::simulate::{self, SimulationOptions};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gpugridd", about = "gpugrid GPU job scheduler daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler's maintenance loops until Ctrl-C.
    Run {
        /// Path to gpugrid.toml. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Data directory for persistent state. In-memory when omitted.
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Stale-worker and job-timeout sweep interval.
        #[arg(long, default_value = "5000")]
        sweep_interval_ms: u64,

        /// Autoscaler check interval.
        #[arg(long, default_value = "30000")]
        autoscale_interval_ms: u64,

        /// Stats log interval.
        #[arg(long, default_value = "60000")]
        stats_interval_ms: u64,
    },

    /// Drive simulated workers through a batch of jobs and print metrics.
    Simulate {
        /// Path to gpugrid.toml. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long, default_value = "4")]
        workers: usize,

        #[arg(long, default_value = "20")]
        jobs: usize,

        /// Wall-clock ms slept per estimated job ms.
        #[arg(long, default_value = "0.001")]
        time_scale: f64,

        /// Fail every k-th attempt.
        #[arg(long)]
        fail_every: Option<usize>,
    },

    /// Print the default configuration as TOML.
    InitConfig,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,gpugrid=debug,gpugridd=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<GridConfig> {
    match path {
        Some(path) => {
            let config = GridConfig::from_file(path)?;
            info!(path = ?path, "configuration loaded");
            Ok(config)
        }
        None => Ok(GridConfig::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            data_dir,
            sweep_interval_ms,
            autoscale_interval_ms,
            stats_interval_ms,
        } => {
            init_tracing(cli.log_json);
            let opts = RunOptions {
                config: load_config(config.as_ref())?,
                data_dir,
                sweep_interval: Duration::from_millis(sweep_interval_ms),
                autoscale_interval: Duration::from_millis(autoscale_interval_ms),
                stats_interval: Duration::from_millis(stats_interval_ms),
            };
            daemon::run(opts, async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "failed to listen for Ctrl-C");
                }
            })
            .await
        }
        Command::Simulate {
            config,
            workers,
            jobs,
            time_scale,
            fail_every,
        } => {
            init_tracing(cli.log_json);
            let opts = SimulationOptions {
                workers,
                jobs,
                time_scale,
                fail_every,
            };
            let report = simulate::run_simulation(load_config(config.as_ref())?, opts).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            println!();
            print!("{}", report.prometheus);
            Ok(())
        }
        Command::InitConfig => {
            print!("{}", GridConfig::default().to_toml_string()?);
            Ok(())
        }
    }
}
