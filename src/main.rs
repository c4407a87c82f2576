use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use homelink::agent::{self, LoggingActions};
use homelink::config::{AgentConfig, ServerConfig, DEFAULT_PORT};

/// Homelink - relay gateway for controlling remote machines from a voice assistant
#[derive(Parser)]
#[command(name = "homelink", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the gateway: webhook endpoint plus device connections
    Serve {
        /// Port to listen on
        #[arg(long, env = "HOMELINK_PORT", default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Path to the config file (defaults to the platform config dir)
        #[arg(long, env = "HOMELINK_CONFIG")]
        config: Option<PathBuf>,
    },
    /// Run the device-side agent on this machine
    Agent {
        /// Gateway WebSocket endpoint, e.g. wss://example.net:42770/ws
        #[arg(long, env = "HOMELINK_SERVER")]
        server: String,

        /// Owner identity this device belongs to
        #[arg(long, env = "HOMELINK_ID")]
        id: String,

        /// This device's connection token
        #[arg(long, env = "HOMELINK_TOKEN")]
        token: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,homelink=info",
        1 => "info,homelink=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve { port, config } => {
            let config = ServerConfig::load(config.as_deref())?;
            tracing::info!(port, users = config.users.len(), "starting gateway");

            let state = homelink::api::ApiState::from_config(&config);
            homelink::api::serve(state, port).await?;
        }
        Command::Agent { server, id, token } => {
            let config = AgentConfig::new(&server, &id, &token);
            tracing::info!(server = %config.server_url, id = %config.owner_id, "starting agent");

            agent::run(config, Arc::new(LoggingActions)).await?;
        }
    }
    Ok(())
}
