use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use vaultkeep::config::Config;

/// Personal secret vault backend.
#[derive(Parser, Debug)]
#[command(name = "vaultkeep", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the gateway.
    Serve {
        /// Address to bind (overrides gateway.host).
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides gateway.port).
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print the effective configuration with secrets masked.
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.gateway.host = host;
            }
            if let Some(port) = port {
                config.gateway.port = port;
            }
            config.validate()?;
            vaultkeep::logging::init(&config.log_level);

            let host = config.gateway.host.clone();
            let port = config.gateway.port;
            vaultkeep::gateway::run_gateway(&host, port, config).await
        }
        Commands::Config => {
            print!("{}", config.redacted().to_toml()?);
            Ok(())
        }
    }
}
