//! CLI front-end (§6): `hybridgrid compile -- <real compiler invocation>`,
//! `hybridgrid coordinator`, and `hybridgrid worker`. Exit codes per §6: 0
//! success, 1 runtime failure, 2 usage (handled by `clap` itself).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hybridgrid_config::{load_layered, PartialBreakerConfig, PartialConfig};
use hybridgrid_core::{detect_capabilities, Coordinator, LocalClient, WorkerAgent};
use hybridgrid_discovery::Browser;
use hybridgrid_rpc::CoordinatorClient;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "hybridgrid", version)]
#[command(about = "A distributed build accelerator: distribute -c compiles across idle machines")]
struct Cli {
    /// Explicit coordinator address, overriding `HG_COORDINATOR` and mDNS discovery.
    #[arg(long, global = true)]
    coordinator: Option<String>,

    /// Bearer token (>= 32 characters). Falls back to `HG_TOKEN`.
    #[arg(long, global = true)]
    token: Option<String>,

    /// Override this worker's advertised parallel task capacity.
    #[arg(long, global = true)]
    max_parallel: Option<u32>,

    /// How long to wait for mDNS discovery before giving up.
    #[arg(long, global = true)]
    discovery_timeout: Option<String>,

    /// Log verbosity, e.g. `info`, `debug`, `hybridgrid_core=debug`.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Path to a `.hybridgrid.toml` to load instead of walking up from the
    /// working directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Wrap a compiler invocation, distributing it if possible.
    Compile {
        /// The compiler and its original arguments, e.g. `gcc -c foo.c -o foo.o`.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        invocation: Vec<String>,
    },
    /// Run the coordinator service: accepts worker handshakes and dispatches compiles.
    Coordinator {
        /// Address to bind the RPC server on.
        #[arg(long, default_value = "0.0.0.0:7780")]
        bind: SocketAddr,
    },
    /// Run a worker agent: announce capabilities, handshake, and serve compiles.
    Worker {
        /// Address this worker's `/v1/compile` route is reachable on.
        #[arg(long, default_value = "0.0.0.0:7781")]
        bind: SocketAddr,
        /// Stable id to hand the coordinator; generated if omitted.
        #[arg(long)]
        worker_id: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let cli_layer = PartialConfig {
        coordinator: cli.coordinator.clone(),
        token: cli.token.clone(),
        max_parallel: cli.max_parallel,
        discovery_timeout: cli.discovery_timeout.as_deref().and_then(|s| humantime::parse_duration(s).ok()),
        discovery_ttl: None,
        heartbeat_ttl: None,
        breaker: PartialBreakerConfig::default(),
        log_level: cli.log_level.clone(),
    };

    let config = match load_config(&cli, cli_layer) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::from(1);
        }
    };

    install_logging(&config.log_level);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to start async runtime: {e}");
            return ExitCode::from(1);
        }
    };

    let result = runtime.block_on(run(cli.cmd, config));
    match result {
        Ok(()) => ExitCode::from(0),
        Err(e) => {
            error!(error = %e, "command failed");
            ExitCode::from(1)
        }
    }
}

fn load_config(cli: &Cli, cli_layer: PartialConfig) -> Result<hybridgrid_config::HybridGridConfig> {
    let start_dir = match &cli.config {
        Some(path) => path.parent().unwrap_or(path).to_path_buf(),
        None => std::env::current_dir().context("failed to read current directory")?,
    };
    Ok(load_layered(&start_dir, cli_layer)?)
}

fn install_logging(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

async fn run(cmd: Commands, config: hybridgrid_config::HybridGridConfig) -> Result<()> {
    match cmd {
        Commands::Compile { invocation } => run_compile(invocation, config).await,
        Commands::Coordinator { bind } => run_coordinator(bind, config).await,
        Commands::Worker { bind, worker_id } => run_worker(bind, worker_id, config).await,
    }
}

async fn run_compile(invocation: Vec<String>, config: hybridgrid_config::HybridGridConfig) -> Result<()> {
    let address = resolve_coordinator_address(&config).await;
    let coordinator = address.map(|addr| CoordinatorClient::new(format!("http://{addr}"), config.token.clone())).transpose()?;

    let client = LocalClient::new(coordinator);
    let working_dir = std::env::current_dir().context("failed to read current directory")?;
    let outcome = client.compile(&invocation, &working_dir).await?;

    print!("{}", outcome.stderr);
    if !outcome.success {
        anyhow::bail!("compile exited with code {}", outcome.exit_code);
    }
    Ok(())
}

async fn run_coordinator(bind: SocketAddr, config: hybridgrid_config::HybridGridConfig) -> Result<()> {
    let coordinator = Coordinator::new(&config)?;
    let cancel = CancellationToken::new();

    let signal_cancel = cancel.clone();
    tokio::spawn(async move { hybridgrid_core::shutdown::wait_for_signal(signal_cancel).await });

    info!(%bind, "starting coordinator");
    Ok(coordinator.run(bind, cancel).await?)
}

async fn run_worker(bind: SocketAddr, worker_id: Option<String>, config: hybridgrid_config::HybridGridConfig) -> Result<()> {
    let address = resolve_coordinator_address(&config)
        .await
        .context("no coordinator address: pass --coordinator, set HG_COORDINATOR, or ensure mDNS discovery can reach one")?;
    let coordinator = CoordinatorClient::new(format!("http://{address}"), config.token.clone())?;

    let worker_id = worker_id.unwrap_or_else(|| format!("worker-{}", std::process::id()));
    let capabilities = detect_capabilities(worker_id, config.max_parallel);
    let agent = WorkerAgent::new(coordinator, capabilities, bind, config.token.clone());

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move { hybridgrid_core::shutdown::wait_for_signal(signal_cancel).await });

    info!(%bind, "starting worker");
    Ok(agent.run(cancel).await?)
}

/// `--coordinator`/`HG_COORDINATOR` (already folded into `config.coordinator`
/// by `hybridgrid-config`'s layering) takes precedence; otherwise browse
/// mDNS for a coordinator advertisement.
async fn resolve_coordinator_address(config: &hybridgrid_config::HybridGridConfig) -> Option<String> {
    if let Some(address) = &config.coordinator {
        return Some(address.clone());
    }

    let browser = Browser::new(hybridgrid_discovery::COORD_SERVICE_TYPE, config.discovery_ttl).ok()?;
    browser.discover_with_fallback(config.discovery_timeout, None).await.ok()
}
