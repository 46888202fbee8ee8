// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;
mod wiring;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("adytum={default},warn")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match &cli.command {
        Commands::Init { reset } => wiring::cmd_init(&cli, *reset),
        Commands::Start { no_browser } => wiring::cmd_start(&cli, *no_browser).await,
        Commands::Update => wiring::cmd_update(),
        Commands::Status => wiring::cmd_status(&cli),
        Commands::Reset { yes } => wiring::cmd_reset(&cli, *yes),
        Commands::Skill { command } => wiring::cmd_skill(&cli, command).await,
        Commands::Models { command } => wiring::cmd_models(&cli, command).await,
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
