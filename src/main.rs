//! Edge API gateway
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌────────────────────────────────────────────────────┐
//!                      │                     GATEWAY                        │
//!                      │                                                    │
//!   Client Request     │  ┌─────────┐   ┌──────────┐   ┌──────────┐         │
//!   ───────────────────┼─▶│  http   │──▶│ throttle │──▶│  token   │         │
//!                      │  │ server  │   │  guard   │   │  guard   │         │
//!                      │  └─────────┘   └──────────┘   └────┬─────┘         │
//!                      │                                    ▼               │
//!                      │                             ┌──────────────┐       │
//!                      │                             │ route table  │       │
//!                      │                             └──────┬───────┘       │
//!                      │                                    ▼               │
//!   Client Response    │  ┌─────────┐                ┌──────────────┐       │
//!   ◀──────────────────┼──│ relay   │◀───────────────│  forwarder   │◀──────┼── Backend
//!                      │  └─────────┘                └──────────────┘       │   Service
//!                      │                                                    │
//!                      │  config · observability · lifecycle (shutdown)     │
//!                      └────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use edge_gateway::config::load_config;
use edge_gateway::lifecycle::startup;
use edge_gateway::observability::logging;
use edge_gateway::Shutdown;

#[derive(Debug, Parser)]
#[command(name = "edge-gateway", version, about = "Authenticating, rate-limiting API gateway")]
struct Args {
    /// TOML configuration file. Environment variables override it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the effective configuration as TOML and exit.
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let mut config = load_config(args.config.as_deref())?;

    if args.print_config {
        config.routes = config.effective_routes();
        config.auth.jwt_secret = "<redacted>".to_string();
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    logging::init_logging(&config.observability);
    tracing::info!("edge-gateway v{} starting", env!("CARGO_PKG_VERSION"));

    let shutdown = Shutdown::new();
    shutdown.trigger_on_signal();

    startup::start(config, &shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
