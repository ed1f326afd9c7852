//! edgewardd: the Edgeward router daemon.
//!
//! Single binary that assembles the router:
//! - Event input (JSON lines from a file or stdin)
//! - Reconciler (routing table + endpoint tracker)
//! - Reload coalescer + file renderer
//! - Operational API (health, metrics, status)
//!
//! # Usage
//!
//! ```text
//! edgewardd run --config /etc/edgeward/edgeward.toml --events -
//! edgewardd config --config /etc/edgeward/edgeward.toml
//! ```

mod daemon;

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use crate::daemon::Overrides;

#[derive(Parser)]
#[command(name = "edgewardd", about = "Edgeward router daemon")]
struct Cli {
    /// Log output format.
    #[arg(long, global = true, value_enum, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run the control loop and the operational API.
    Run {
        /// TOML configuration file. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Event input: a JSON-lines file, or "-" for stdin.
        #[arg(long, default_value = "-")]
        events: String,

        /// Address of the operational API.
        #[arg(long)]
        listen: Option<SocketAddr>,

        /// Directory the proxy configuration is written to.
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Minimum time between reloads, e.g. "5s" or "500ms".
        #[arg(long)]
        reload_interval: Option<String>,
    },

    /// Print the effective configuration as TOML.
    Config {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Run {
            config,
            events,
            listen,
            output_dir,
            reload_interval,
        } => {
            let mut config = daemon::load_config(config.as_deref())?;
            Overrides {
                listen,
                output_dir,
                reload_interval,
            }
            .apply(&mut config)?;
            daemon::run_router(config, &events).await
        }
        Command::Config { config } => {
            let config = daemon::load_config(config.as_deref())?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,edgeward=debug"));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
}
