//! amtctl - Out-of-band management for Intel AMT / DASH hosts

use clap::Parser;

mod amt;
mod cli;
mod config;
mod error;
mod monitor;
mod output;
mod scheduler;
mod storage;

use cli::{Cli, Commands};
use error::Result;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    match &cli.command {
        Commands::Info { hosts } => {
            let options = cli::build_optionset(&cli)?;
            cli::info::run(hosts, &options, cli.json).await
        }
        Commands::Control(control) => {
            let options = cli::build_optionset(&cli)?;
            let (cmd, hosts) = control.parts();
            cli::control::run(cmd, hosts, &options, cli.delay_duration()).await
        }
        Commands::Modify(modify) => {
            let options = cli::build_optionset(&cli)?;
            let (cmd, hosts) = modify.parts();
            cli::control::run(cmd, hosts, &options, cli.delay_duration()).await
        }
        Commands::Server { db } => cli::server::run(db).await,
    }
}
