//! CLI module - Command-line interface for Cloud Valet
//!
//! This module provides a structured CLI using clap for argument parsing.

mod commands;

use clap::{Parser, Subcommand};

/// Cloud Valet - self-service VM power management for Azure
#[derive(Parser)]
#[command(name = "cloudvalet")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API server (default)
    #[command(alias = "web")]
    Serve,

    /// Create default config file
    Init,

    /// Manage user accounts
    User {
        #[command(subcommand)]
        command: UserCommands,
    },

    /// Create `count` Read accounts named user1..userN (password userN123)
    SeedUsers {
        #[arg(default_value = "30")]
        count: u32,
    },

    /// Delete the accounts created by seed-users
    UnseedUsers {
        #[arg(default_value = "30")]
        count: u32,
    },
}

#[derive(Subcommand)]
pub enum UserCommands {
    /// Create an account
    Create {
        username: String,
        /// Password; prompted for when omitted
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        email: Option<String>,
        /// Read, Write or Admin
        #[arg(long, default_value = "Read")]
        permission: String,
    },

    /// List all accounts
    #[command(alias = "ls")]
    List,

    /// Delete an account
    #[command(alias = "rm")]
    Delete {
        username: String,
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },

    /// Change an account's permission level
    SetPermission { username: String, permission: String },
}

pub use commands::*;
