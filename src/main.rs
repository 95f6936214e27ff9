use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use edge_agent::db::{self, DeviceRepo, MicroserviceRepo};
use edge_agent::microservice::OutputAggregator;
use edge_agent::node::NodeModeProvider;
use edge_agent::{Config, Daemon};

/// Edge agent - microservice configuration API for edge nodes
#[derive(Parser)]
#[command(name = "edge-agent", version, about)]
struct Cli {
    /// Port to listen on (overrides config)
    #[arg(long, env = "EDGE_AGENT_PORT")]
    port: Option<u16>,

    /// Data directory holding the agent database (overrides config)
    #[arg(long, env = "EDGE_AGENT_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the management API (default)
    Serve,
    /// Print configured microservices
    List,
    /// Print synthesized policy documents
    Policies,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,edge_agent=info",
        1 => "info,edge_agent=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(port) = cli.port {
        config.api_server.port = port;
    }
    if let Some(data_dir) = cli.data_dir {
        std::fs::create_dir_all(&data_dir)?;
        config.data_dir = data_dir;
    }
    tracing::debug!(
        port = config.api_server.port,
        data_dir = %config.data_dir.display(),
        catalog_url = ?config.catalog.url.as_ref().map(url::Url::as_str),
        "loaded configuration"
    );

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let daemon = Daemon::new(config)?;
            tracing::info!("edge agent ready");
            daemon.run().await?;
        }
        Command::List => {
            let (output, mode) = open_output(&config)?;
            let listing = output.list_microservices(mode)?;
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
        Command::Policies => {
            let (output, mode) = open_output(&config)?;
            let policies = output.list_policies(mode)?;
            println!("{}", serde_json::to_string_pretty(&policies)?);
        }
    }

    Ok(())
}

/// Open the database read side and resolve the node mode
fn open_output(config: &Config) -> anyhow::Result<(OutputAggregator, edge_agent::node::NodeMode)> {
    let pool = db::init(config.db_path())?;
    let mode = DeviceRepo::new(pool.clone()).current_mode()?;
    let output = OutputAggregator::new(Arc::new(MicroserviceRepo::new(pool)));
    Ok((output, mode))
}
