use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use tracing::{info, warn};
use vanishcap::{logging, Config, Controller, StopHandle};

/// Vision-guided drone following pipeline
#[derive(Parser, Debug)]
#[command(name = "vanishcap", version, about)]
struct Args {
    /// Path to the JSON configuration file
    config: PathBuf,
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let config = Config::load(&args.config)?;
    logging::init(&config.controller.log_level, config.controller.log_file.as_deref())?;
    info!(config = %args.config.display(), offline = config.controller.offline, "starting vanishcap");

    let controller = Controller::new(config)?;
    spawn_signal_listener(controller.stop_handle())?;
    controller.run()?;

    info!("vanishcap stopped");
    Ok(())
}

/// Stop the controller on SIGINT or SIGTERM.
fn spawn_signal_listener(handle: StopHandle) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    thread::Builder::new().name("signals".to_string()).spawn(move || {
        if runtime.block_on(wait_for_signal()) {
            info!("shutdown signal received");
            handle.stop();
        }
    })?;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() -> bool {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            warn!("cannot listen for SIGTERM: {}", e);
            return tokio::signal::ctrl_c().await.is_ok();
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => result.is_ok(),
        _ = terminate.recv() => true,
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> bool {
    tokio::signal::ctrl_c().await.is_ok()
}
