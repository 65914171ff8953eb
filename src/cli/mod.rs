pub mod migrate;
pub mod serve;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "mctrack-ingest")]
#[command(about = "Session telemetry ingestion service")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the ingestion HTTP service (default)")]
    Serve {
        #[arg(long, help = "Listen port, overrides PORT")]
        port: Option<u16>,
    },

    #[command(about = "Create the analytics database and session tables")]
    Migrate {
        #[arg(long, help = "Print the DDL instead of executing it")]
        print: bool,
    },
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = crate::config::config();

    match cli.command.unwrap_or(Commands::Serve { port: None }) {
        Commands::Serve { port } => serve::run(config, port).await,
        Commands::Migrate { print } => migrate::run(config, print).await,
    }
}
