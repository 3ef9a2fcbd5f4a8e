//! CLI module - Command-line interface for Silor
//!
//! This module provides a structured CLI using clap for argument parsing.

mod commands;

use clap::{Args, Parser, Subcommand};

/// Silor - identity and credential administration
#[derive(Parser)]
#[command(name = "silor")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API server
    #[command(alias = "web")]
    Serve,

    /// Create default config file
    Init,

    /// Provision a new identity
    CreateUser(CreateUserArgs),

    /// Issue a password reset token for an active identity
    ResetToken {
        /// Email of the identity
        email: String,
    },

    /// Set a new password using a reset token.
    /// The password is read from `SILOR_PASSWORD` or prompted on stdin.
    ResetPassword {
        /// Token printed by `reset-token`
        token: String,
    },

    /// List roles
    Roles,

    /// List statuses
    Statuses,
}

#[derive(Args)]
pub struct CreateUserArgs {
    #[arg(long)]
    pub full_name: String,

    #[arg(long)]
    pub national_id: String,

    #[arg(long)]
    pub phone: String,

    #[arg(long)]
    pub email: String,

    /// Read an explicit password from `SILOR_PASSWORD` or stdin instead of
    /// deriving it from name and national id
    #[arg(long)]
    pub set_password: bool,

    #[arg(long)]
    pub role: Option<i32>,

    #[arg(long)]
    pub status: Option<i32>,
}

pub use commands::*;
