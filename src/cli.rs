// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "adytum",
    about = "Self-hosted gateway for a hierarchy of autonomous LLM agents",
    version,
    long_about = None,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to config file (overrides auto-discovery)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v = debug, -vv = trace)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Bootstrap the workspace: data directories, soul file, root agent.
    Init {
        /// Wipe existing data before bootstrapping.
        #[arg(long)]
        reset: bool,
    },

    /// Start the gateway, scheduler, and skill loader.
    Start {
        /// Do not open the dashboard in a browser.
        #[arg(long)]
        no_browser: bool,
    },

    /// Update the adytum binary to the latest release.
    Update,

    /// Show workspace status: agents, jobs, skills, ports.
    Status,

    /// Delete all persisted state (requires --yes).
    Reset {
        /// Confirm the wipe.
        #[arg(long)]
        yes: bool,
    },

    /// Manage skills.
    Skill {
        #[command(subcommand)]
        command: SkillCommands,
    },

    /// Manage the model catalog.
    Models {
        #[command(subcommand)]
        command: ModelsCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum SkillCommands {
    /// List discovered skill packages.
    List,
    /// Check whether a skill's requirements are satisfied.
    Check { id: String },
    /// Run a skill's install steps.
    Install { id: String },
    /// Remove a skill package from the skills directory.
    Remove { id: String },
}

#[derive(Subcommand, Debug)]
pub enum ModelsCommands {
    /// List the merged model catalog.
    List,
    /// Probe local providers (ollama, lmstudio, vllm) for availability.
    Scan,
    /// Add a user catalog entry as `provider/model`.
    Add { model: String },
    /// Remove a user catalog entry by qualified id.
    Remove { id: String },
}
