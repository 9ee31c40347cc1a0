//! Echo kernel entry point.
//!
//! Loads the kernel's TOML config and the launcher's connection profile,
//! binds the five channel sockets and serves until a `shutdown_request` or
//! Ctrl-C.
//!
//! ```text
//! echo-kernel -f /path/to/connection.json [--config kernel.toml]
//! echo-kernel --print-kernel-spec        # kernel.json for launcher discovery
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use nbkernel_core::{KernelSpec, Profile, Session};
use tracing::info;
use tracing_subscriber::EnvFilter;

use nbkernel_server::application::echo::EchoHandler;
use nbkernel_server::infrastructure::config::load_config;
use nbkernel_server::infrastructure::transport::zmq;
use nbkernel_server::KernelServer;

#[derive(Parser)]
#[command(name = "echo-kernel")]
#[command(about = "Notebook kernel that evaluates every cell to its own source", long_about = None)]
struct Args {
    /// Path to the connection file written by the launcher
    #[arg(short = 'f', long = "connection-file", required_unless_present = "print_kernel_spec")]
    connection_file: Option<PathBuf>,

    /// Path to the kernel's TOML config (defaults apply when absent)
    #[arg(long, env = "ECHO_KERNEL_CONFIG", default_value = "echo-kernel.toml")]
    config: PathBuf,

    /// Print the kernel.json descriptor and exit
    #[arg(long)]
    print_kernel_spec: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args.config)
        .with_context(|| format!("failed to load config {}", args.config.display()))?;

    // Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.kernel.log_level)),
        )
        .init();

    if args.print_kernel_spec {
        let spec = KernelSpec::for_program(
            config.kernel.implementation.clone(),
            config.kernel.implementation.clone(),
            config.language.name.clone(),
        );
        println!("{}", spec.to_json_pretty()?);
        return Ok(());
    }

    let connection_file = args
        .connection_file
        .context("connection file is required (use -f or --connection-file)")?;
    info!("loading connection file {}", connection_file.display());
    let profile = Profile::from_file(&connection_file).with_context(|| {
        format!("invalid connection file {}", connection_file.display())
    })?;
    let signer = profile.signer().context("invalid signing key")?;

    let sockets = zmq::bind_all(&profile)
        .await
        .context("failed to bind kernel sockets")?;

    let session = Session::new(config.kernel.username.clone());
    let server = KernelServer::new(EchoHandler::new(config), signer, session);

    let shutdown = server.shutdown_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            shutdown.trigger();
        }
    });

    info!("echo kernel ready");
    server.run(sockets).await.context("kernel stopped with an error")?;
    info!("echo kernel stopped");
    Ok(())
}
