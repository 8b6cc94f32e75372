//! `ombus`: a command-line driver exercising the event bus end to end.
//! One binary, one subcommand per role, rather than one binary per role.
//! The library crates (`ombus-shm`, `ombus-net`, `ombus-relay`) stay free
//! of CLI/config concerns; this crate is the only place `anyhow` and
//! `clap` appear in the workspace.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ombus")]
#[command(about = "Inter-process WAL event bus: SHM ring + TCP fan-out")]
#[command(version)]
struct Args {
    /// Optional TOML config file providing defaults for any subcommand.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a SHM stream and publish records read from stdin, one per line.
    Produce {
        #[arg(long)]
        stream: String,
        #[arg(long, default_value_t = 4096)]
        capacity: u32,
        #[arg(long, default_value_t = 256)]
        slot_size: u32,
        #[arg(long, default_value_t = 8)]
        max_consumers: u32,
        #[arg(long)]
        crc: bool,
        #[arg(long)]
        reject_reorder: bool,
    },
    /// Attach to an existing SHM stream and print delivered records.
    Consume {
        #[arg(long)]
        stream: String,
        #[arg(long, default_value_t = 0)]
        consumer_index: u32,
    },
    /// Run a TCP broadcast server.
    Serve {
        #[arg(long)]
        bind: Option<String>,
        #[arg(long, default_value_t = 0)]
        port: u16,
        #[arg(long, default_value_t = 64)]
        max_clients: usize,
    },
    /// Relay one SHM endpoint to one TCP server in this same process.
    Relay {
        #[arg(long)]
        stream: String,
        #[arg(long, default_value_t = 0)]
        consumer_index: u32,
        #[arg(long)]
        bind: Option<String>,
        #[arg(long, default_value_t = 0)]
        port: u16,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli_config = match &args.config {
        Some(path) => config::CliConfig::from_file(path)?,
        None => config::CliConfig::default(),
    };

    match args.command {
        Commands::Produce {
            stream,
            capacity,
            slot_size,
            max_consumers,
            crc,
            reject_reorder,
        } => commands::produce::run(
            &cli_config,
            commands::produce::ProduceArgs {
                stream,
                capacity,
                slot_size,
                max_consumers,
                crc,
                reject_reorder,
            },
        ),
        Commands::Consume {
            stream,
            consumer_index,
        } => commands::consume::run(&cli_config, &stream, consumer_index),
        Commands::Serve {
            bind,
            port,
            max_clients,
        } => commands::serve::run(&cli_config, bind, port, max_clients),
        Commands::Relay {
            stream,
            consumer_index,
            bind,
            port,
        } => commands::relay::run(&cli_config, &stream, consumer_index, bind, port),
    }
}
