//! tunnel-bench CLI
//!
//! Single binary for both hosts of a benchmark:
//! - `run` drives benchmark rounds as initiator or responder
//! - `keygen` / `keysend` manage backend key material
//! - `hosts` / `config` manage the host directory and settings

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tb_core::{BackendKind, Role};
use tunnel_bench::commands;
use tunnel_bench::output::print_error;

#[derive(Parser)]
#[command(name = "tunnel-bench")]
#[command(author, version, about = "Benchmark request/response exchanges across VPN tunnel backends")]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run benchmark rounds (open tunnel, exchange, close tunnel)
    Run {
        /// Role of this host: initiator (client) or responder (server)
        #[arg(short, long)]
        role: Role,
        /// Tunnel backend: none, rosenpass, wireguard, openvpn, openvpn-static
        #[arg(short, long, default_value = "none")]
        backend: BackendKind,
        /// Number of rounds
        #[arg(short = 'n', long, default_value_t = 1)]
        rounds: u32,
        /// Also poll telemetry at a fixed interval
        #[arg(long)]
        auto: bool,
        /// Retryable exchange attempts before the grace sleep (overrides config)
        #[arg(long)]
        budget: Option<u32>,
        /// Grace sleep length in seconds (overrides config)
        #[arg(long)]
        backoff: Option<u64>,
        /// Directory for telemetry output (overrides config)
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Generate key material for a backend
    Keygen {
        /// Role of this host
        #[arg(short, long)]
        role: Role,
        /// Tunnel backend
        #[arg(short, long)]
        backend: BackendKind,
        /// Replace existing keys
        #[arg(short, long)]
        force: bool,
    },

    /// Send this host's public key to the peer
    Keysend {
        /// Role of this host
        #[arg(short, long)]
        role: Role,
        /// Tunnel backend
        #[arg(short, long)]
        backend: BackendKind,
        /// Directory on the peer that holds its key directories
        #[arg(long, default_value = ".")]
        remote_path: String,
    },

    /// Manage the host directory
    Hosts {
        #[command(subcommand)]
        action: HostsAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum HostsAction {
    /// Add or replace entries
    Set {
        /// Responder as USER@ADDRESS:PORT
        #[arg(long)]
        responder: Option<String>,
        /// Initiator as USER@ADDRESS
        #[arg(long)]
        initiator: Option<String>,
    },
    /// Show the host directory
    Show,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
    /// Show the config file path
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    if let Err(e) = dispatch(cli).await {
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
    Ok(())
}

async fn dispatch(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_ref();

    match cli.command {
        Commands::Run {
            role,
            backend,
            rounds,
            auto,
            budget,
            backoff,
            data_dir,
        } => {
            let mut config = commands::load_bench_config(config_path)?;
            if auto {
                config.telemetry.auto = true;
            }
            if let Some(budget) = budget {
                config.retry.budget = budget;
            }
            if let Some(secs) = backoff {
                config.retry.backoff = std::time::Duration::from_secs(secs);
            }
            if let Some(dir) = data_dir {
                config.telemetry.data_dir = dir;
            }
            config.validate()?;

            commands::run_command(&config, role, backend, rounds).await?;
        }

        Commands::Keygen { role, backend, force } => {
            let config = commands::load_bench_config(config_path)?;
            commands::keygen_command(&config, role, backend, force).await?;
        }

        Commands::Keysend {
            role,
            backend,
            remote_path,
        } => {
            let config = commands::load_bench_config(config_path)?;
            commands::keysend_command(&config, role, backend, &remote_path).await?;
        }

        Commands::Hosts { action } => {
            let config = commands::load_bench_config(config_path)?;
            match action {
                HostsAction::Set { responder, initiator } => {
                    commands::hosts_set(&config.hosts_path, responder.as_deref(), initiator.as_deref())?;
                }
                HostsAction::Show => commands::hosts_show(&config.hosts_path)?,
            }
        }

        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_show(config_path)?,
            ConfigAction::Init { force } => commands::config_init(config_path, force)?,
            ConfigAction::Path => commands::config_path(config_path),
        },
    }

    Ok(())
}
