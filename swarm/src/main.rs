//! proxmox-swarm - Entry Point
//!
//! Thin command surface over the local daemon: client commands talk to the
//! daemon socket, `daemon` commands run or supervise it.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use colored::Colorize;
use tracing::{error, info};

use proxmox_swarm::app::options::{DaemonOptions, SupervisorOptions};
use proxmox_swarm::app::run::run;
use proxmox_swarm::app::settings::Settings;
use proxmox_swarm::app::supervise::{
    daemon_status, start_daemon, stop_daemon, DaemonStatus, StartOutcome, StopOutcome,
};
use proxmox_swarm::backend::Credentials;
use proxmox_swarm::client::{ClientOptions, DaemonClient};
use proxmox_swarm::errors::SwarmError;
use proxmox_swarm::logs::{init_logging, LogOptions};
use proxmox_swarm::runtime::RuntimeLayout;
use proxmox_swarm::utils::version_info;
use swarm_api::{DeployRequest, ParseRequest, UnitRequest};

/// `EX_UNAVAILABLE` from sysexits.h
const EXIT_UNAVAILABLE: i32 = 69;

#[derive(Debug, Parser)]
#[command(name = "proxmox-swarm", about = "Deploy compose descriptors onto Proxmox")]
#[command(disable_version_flag = true)]
struct Cli {
    /// Print version information as JSON
    #[arg(long)]
    version: bool,

    #[arg(long, global = true)]
    host: Option<String>,

    #[arg(long, global = true)]
    user: Option<String>,

    #[arg(long, global = true)]
    password: Option<String>,

    /// SDN network every deployed service is attached to
    #[arg(long, global = true)]
    sdn_network: Option<String>,

    /// Create the SDN network before deploying
    #[arg(long, global = true)]
    create_sdn: bool,

    /// Override the runtime directory holding the pid file and socket
    #[arg(long, global = true)]
    runtime_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Deploy a compose descriptor
    Deploy { compose: PathBuf },
    /// Parse a compose descriptor and print the normalized model
    Parse { compose: PathBuf },
    /// Start a unit
    Start { vmid: String },
    /// Stop a unit
    Stop { vmid: String },
    /// Run or supervise the daemon
    Daemon {
        #[command(subcommand)]
        action: DaemonAction,
    },
}

#[derive(Debug, Subcommand)]
enum DaemonAction {
    /// Run the daemon in the foreground
    Run,
    /// Start the daemon in the background
    Start,
    /// Stop the background daemon
    Stop,
    /// Report whether the daemon is running
    Status,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.version {
        match serde_json::to_string_pretty(&version_info()) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("{} {}", "error:".red().bold(), e),
        }
        return;
    }

    let code = match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            exit_code_for(&e)
        }
    };
    std::process::exit(code);
}

async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    let layout = RuntimeLayout::from_override(cli.runtime_dir.as_deref());
    let settings = Settings::load(&layout.settings_file())
        .await
        .context("failed to load settings")?;

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(1);
    };

    if !matches!(command, Command::Daemon { .. }) {
        init_stderr_logging(&settings);
    }
    let credentials = Credentials::new(cli.host, cli.user, cli.password);
    let client = DaemonClient::for_layout(&layout, ClientOptions::from_settings(&settings));

    match command {
        Command::Deploy { compose } => {
            let request = DeployRequest {
                compose: absolute(&compose)?,
                auth: credentials,
                sdn_network: cli.sdn_network,
                create_sdn: cli.create_sdn,
            };
            let response = client.deploy(&request).await?;
            report_status("deploy", response.status);
            Ok(response.status)
        }
        Command::Parse { compose } => {
            let request = ParseRequest {
                file: absolute(&compose)?,
            };
            let model = client.parse(&request).await?;
            println!("{}", serde_json::to_string_pretty(&model)?);
            Ok(0)
        }
        Command::Start { vmid } => {
            let response = client.start(&UnitRequest { vmid, auth: credentials }).await?;
            report_status("start", response.status);
            Ok(response.status)
        }
        Command::Stop { vmid } => {
            let response = client.stop(&UnitRequest { vmid, auth: credentials }).await?;
            report_status("stop", response.status);
            Ok(response.status)
        }
        Command::Daemon { action } => daemon(action, layout, &settings).await,
    }
}

/// Client and supervisor commands only log to stderr
fn init_stderr_logging(settings: &Settings) {
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        json_format: settings.log_json,
        ..Default::default()
    };
    if let Err(e) = init_logging(log_options) {
        eprintln!("Failed to initialize logging: {e}");
    }
}

async fn run_daemon(layout: RuntimeLayout, settings: &Settings) -> anyhow::Result<i32> {
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        json_format: settings.log_json,
        log_dir: Some(layout.logs_dir().path().to_path_buf()),
        ..Default::default()
    };
    // Held until the daemon exits so buffered file logs are flushed
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };

    let version = version_info();
    info!(version = %version.version, git_hash = %version.git_hash, "Starting proxmox-swarm daemon");

    let options = DaemonOptions::from_settings(layout, settings);
    info!("Running daemon with options: {:?}", options);
    if let Err(e) = run(options, await_shutdown_signal()).await {
        error!("Daemon failed: {}", e);
        return Err(e.into());
    }
    Ok(0)
}

async fn daemon(
    action: DaemonAction,
    layout: RuntimeLayout,
    settings: &Settings,
) -> anyhow::Result<i32> {
    if !matches!(action, DaemonAction::Run) {
        init_stderr_logging(settings);
    }
    let options = SupervisorOptions::from_settings(settings);

    match action {
        DaemonAction::Run => return run_daemon(layout, settings).await,
        DaemonAction::Start => match start_daemon(&layout, &options).await? {
            StartOutcome::Started(pid) => println!("Daemon started (pid {})", pid),
            StartOutcome::AlreadyRunning(pid) => println!("Daemon already running (pid {})", pid),
        },
        DaemonAction::Stop => match stop_daemon(&layout, &options).await? {
            StopOutcome::Stopped(pid) => println!("Daemon stopped (pid {})", pid),
            StopOutcome::NotRunning => println!("Daemon is not running"),
        },
        DaemonAction::Status => match daemon_status(&layout).await {
            DaemonStatus::Running(pid) => println!("Daemon running (pid {})", pid),
            DaemonStatus::NotRunning => println!("Daemon is not running"),
        },
    }
    Ok(0)
}

fn report_status(operation: &str, status: i32) {
    if status == 0 {
        println!("{} {}", operation, "succeeded".green());
    } else {
        eprintln!("{} {} (status {})", operation, "failed".red(), status);
    }
}

/// Paths are resolved by the daemon, which may run in another directory
fn absolute(path: &Path) -> anyhow::Result<String> {
    let path = std::path::absolute(path)
        .with_context(|| format!("failed to resolve {}", path.display()))?;
    Ok(path.to_string_lossy().into_owned())
}

fn exit_code_for(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<SwarmError>() {
        Some(SwarmError::Transport(_)) => EXIT_UNAVAILABLE,
        _ => 1,
    }
}

async fn await_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
        _ => {
            error!("Failed to install signal handlers, falling back to Ctrl+C");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => {
            info!("SIGTERM received, shutting down...");
        }
        _ = sigint.recv() => {
            info!("SIGINT received, shutting down...");
        }
    }
}
