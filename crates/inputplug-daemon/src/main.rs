//! inputplug daemon
//!
//! Watches the X server's input device hierarchy and runs a command for
//! every change.

mod event_loop;
mod pidfile;
mod signals;
mod xinput;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use inputplug_config::{LogLevel, Overrides, ResolvedConfig};
use inputplug_core::{open_sink, DispatchOptions, Dispatcher, NoAnnounce, NotificationDecoder};
use tracing_subscriber::EnvFilter;

use crate::event_loop::{EventLoop, StopReason};
use crate::pidfile::Pidfile;
use crate::xinput::XInputSource;

#[derive(Parser, Debug)]
#[command(name = "inputplug")]
#[command(about = "XInput event monitor")]
#[command(version)]
struct Args {
    /// Print the command line of every change
    #[arg(short, long)]
    verbose: bool,

    /// Print debugging messages (implies --verbose)
    #[arg(long)]
    debug: bool,

    /// Don't run any commands, only print them (implies --foreground)
    #[arg(short = 'n', long)]
    no_act: bool,

    /// Run in foreground (don't daemonize)
    #[arg(short = 'd', long)]
    foreground: bool,

    /// Run the command for devices already present at startup
    #[arg(short = '0', long)]
    bootstrap: bool,

    /// Command to run on each hierarchy change
    #[arg(short, long, value_name = "PATH")]
    command: Option<PathBuf>,

    /// Socket to announce changes on (`unix!/path`, empty for the default)
    #[arg(short = 'a', long, value_name = "ADDR")]
    announce_address: Option<String>,

    /// File or FIFO to append one line per change to
    #[arg(short = 'f', long, value_name = "PATH")]
    announce_path: Option<PathBuf>,

    /// Write the daemon's PID to this file and refuse to start twice
    #[arg(short, long, value_name = "PATH")]
    pidfile: Option<PathBuf>,

    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            command: self
                .command
                .as_deref()
                .map(|path| shellexpand::tilde(&path.to_string_lossy()).into_owned().into()),
            bootstrap: self.bootstrap,
            announce_address: self.announce_address.clone(),
            announce_path: self.announce_path.clone(),
            pidfile: self.pidfile.clone(),
            verbose: self.verbose,
            debug: self.debug,
            no_act: self.no_act,
            foreground: self.foreground,
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let config = match load_settings(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{:?}", miette::Report::new(e));
            return ExitCode::FAILURE;
        }
    };

    init_tracing(config.log_level);

    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_settings(args: &Args) -> Result<ResolvedConfig, inputplug_config::ConfigError> {
    let file = inputplug_config::load_config(args.config.as_deref())?;
    let env_address = std::env::var(inputplug_core::ADDRESS_ENV).ok();
    inputplug_config::resolve(file, args.overrides(), env_address)
}

/// `RUST_LOG` wins over the configured level
fn init_tracing(level: LogLevel) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter())),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn run(config: ResolvedConfig) -> Result<()> {
    // Fail early on a missing display, and don't carry the connection
    // across the fork
    drop(XInputSource::connect(None).context("Can't start without X Input 2")?);

    let mut pidfile = config
        .pidfile
        .as_deref()
        .map(Pidfile::open)
        .transpose()
        .context("Can't acquire pidfile")?;

    if !config.foreground {
        tracing::debug!("Daemonizing");
        nix::unistd::daemon(false, config.verbose).context("Failed to daemonize")?;
    }

    if let Some(pidfile) = pidfile.as_mut() {
        pidfile.write()?;
        tracing::info!("Pid {} recorded in {}", std::process::id(), pidfile.path().display());
    }

    signals::reap_children_automatically().context("Failed to set up child reaping")?;

    let sink = match open_sink(
        config.announce.address.as_deref(),
        config.announce.path.as_deref(),
    ) {
        Ok(sink) => sink,
        Err(e) => {
            tracing::info!("Announcing disabled: {}", e);
            Box::new(NoAnnounce)
        }
    };

    let dispatcher = Dispatcher::with_sink(
        &config.command,
        DispatchOptions {
            verbose: config.verbose,
            dry_run: config.no_act,
            name_prefix: config.name_prefix.clone(),
        },
        sink,
    );

    tracing::info!("Running {} on hierarchy changes", config.command.display());

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start runtime")?;

    let reason = runtime.block_on(async {
        let shutdown = signals::listen_for_shutdown().context("Failed to install signal handlers")?;
        let mut event_loop = EventLoop::new(NotificationDecoder::new(dispatcher), shutdown)
            .with_bootstrap(config.bootstrap);
        event_loop
            .run(|| XInputSource::connect(None))
            .await
            .context("Can't connect to the display")
    })?;

    match reason {
        StopReason::Shutdown => tracing::info!("Shut down"),
        StopReason::ConnectionLost => tracing::info!("Display went away, exiting"),
    }

    drop(pidfile);
    Ok(())
}
