// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! CLI argument definitions using Clap
//!
//! Defines all command-line arguments and subcommands for Banter.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

/// Banter - streaming chat sessions for your terminal
#[derive(Parser, Debug)]
#[command(name = "banter")]
#[command(version, about = "Streaming chat sessions for your terminal")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start an interactive chat session (default when no command given)
    Chat(ChatArgs),

    /// List stored sessions, most recently updated first
    Sessions,

    /// Export a session transcript as markdown
    Export(ExportArgs),

    /// Delete a session
    Delete(DeleteArgs),
}

/// Arguments for the chat subcommand
#[derive(clap::Args, Debug, Default)]
pub struct ChatArgs {
    /// Resume a specific session instead of the current one
    #[arg(long)]
    pub session: Option<Uuid>,

    /// Request the reasoning model for every send
    #[arg(long)]
    pub reasoning: bool,

    /// System prompt override for this session's sends
    #[arg(long)]
    pub system: Option<String>,
}

/// Arguments for the export subcommand
#[derive(clap::Args, Debug)]
pub struct ExportArgs {
    /// Session id to export
    pub id: Uuid,
}

/// Arguments for the delete subcommand
#[derive(clap::Args, Debug)]
pub struct DeleteArgs {
    /// Session id to delete
    pub id: Uuid,
}
