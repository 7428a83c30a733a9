use anyhow::Result;
use clap::{Parser, Subcommand};
use std::{error::Error, path::PathBuf};
use tracing::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::DirectoryBuilder;

mod add;
mod config;
mod dump;
mod search;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(short, long, value_name = "FILE")]
    path: Option<String>,
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    Add(add::Command),
    Search(search::Command),
    Dump(dump::Command),
}

fn get_rust_log(verbose: u8) -> String {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    std::env::var("RUST_LOG").unwrap_or_else(|_| {
        format!(
            "autoids={0},overlays_posix_ids={0},engine={0},sqlite={0}",
            level
        )
    })
}

impl Cli {
    fn builder(&self) -> Result<DirectoryBuilder> {
        let config = match &self.config {
            Some(path) => config::Config::load(path)?,
            None => config::Config::default(),
        };

        Ok(DirectoryBuilder::new(config).with_path(self.path.clone()))
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    color_backtrace::install();

    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(get_rust_log(cli.verbose)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    debug!("initialized, ready");

    let builder = cli.builder()?;

    match &cli.command {
        Some(Commands::Add(cmd)) => Ok(add::execute_command(&builder, cmd)?),
        Some(Commands::Search(cmd)) => Ok(search::execute_command(&builder, cmd)?),
        Some(Commands::Dump(cmd)) => Ok(dump::execute_command(&builder, cmd)?),
        None => Ok(()),
    }
}
