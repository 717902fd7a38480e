//! checkgridd — the checkgrid daemon.
//!
//! Single binary that assembles the dispatcher:
//! - Cluster store (in memory)
//! - Dispatcher + periodic expiration sweep
//! - REST API for worker nodes and the config source
//!
//! # Usage
//!
//! ```text
//! checkgridd run --config /etc/checkgrid/checkgrid.toml --port 5005
//! checkgridd validate --config /etc/checkgrid/checkgrid.toml
//! ```

mod server;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;

use checkgrid_core::CheckgridConfig;

#[derive(Parser)]
#[command(name = "checkgridd", about = "Cluster check dispatcher daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the dispatcher and serve the API.
    Run {
        /// Path to checkgrid.toml. Defaults apply when the file is missing.
        #[arg(long, default_value = "/etc/checkgrid/checkgrid.toml")]
        config: PathBuf,

        /// Port to listen on (overrides `api.port`).
        #[arg(long)]
        port: Option<u16>,
    },
    /// Parse a config file and print the digest of every static check.
    Validate {
        #[arg(long, default_value = "/etc/checkgrid/checkgrid.toml")]
        config: PathBuf,
    },
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,checkgridd=debug,checkgrid=debug".into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Run { config, port } => {
            let mut settings = CheckgridConfig::load_or_default(&config)?;
            if let Some(port) = port {
                settings.api.port = port;
            }
            info!(path = ?config, "configuration loaded");
            server::run(settings).await
        }
        Command::Validate { config } => {
            let settings = CheckgridConfig::from_file(&config)?;
            for check in &settings.checks {
                let scope = if check.is_cluster_check() { "cluster" } else { "node" };
                println!("{}\t{}\t{}", check.digest(), scope, check.name);
            }
            println!(
                "ok: {} checks, expiration timeout {}s, sweep every {}s",
                settings.checks.len(),
                settings.dispatcher.node_expiration_timeout_secs,
                settings.dispatcher.sweep_interval_secs
            );
            Ok(())
        }
    }
}
