//! CLI definition using clap derive.
//!
//! Most configuration is environment-driven (see `config`); the CLI only
//! selects what to do and a couple of ad-hoc switches.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "keepauth",
    about = "Sidecar daemon keeping a browser-login-only API gateway authenticated"
)]
pub struct Cli {
    /// Verbose (debug-level) logging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the maintenance daemon (default)
    Daemon,
    /// Run one authentication pass against the existing gateway
    Authenticate,
    /// Report whether the current session is authenticated
    Check,
    /// Poll the gateway's status endpoint once
    Tickle,
    /// Validate the current session
    Validate,
    /// Start the gateway process
    Start,
    /// Kill the gateway process
    Kill,
}
