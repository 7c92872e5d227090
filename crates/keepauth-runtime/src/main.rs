//! keepauth: sidecar authentication daemon binary.
//! Single-process binary embedding the poller, strategy engine,
//! maintenance scheduler and health endpoint in-process.

use clap::Parser;

use keepauth_client::GatewayApi;
use keepauth_core::ParsedStatus;

mod cli;
mod config;
mod daemon;
mod health;
mod process;
mod strategy;
mod webdriver;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    let filter = std::env::var("KEEPAUTH_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| if args.verbose { "debug" } else { "info" }.to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();

    let config = config::Config::from_env()?;
    let command = args.command.unwrap_or(cli::Command::Daemon);

    match command {
        cli::Command::Daemon => {
            tracing::info!("keepauth daemon starting");
            let exit_code = daemon::run_daemon(config).await?;
            if exit_code != 0 {
                std::process::exit(exit_code);
            }
        }
        cli::Command::Authenticate => {
            let credentials = config::Config::credentials()?;
            let gateway = daemon::build_gateway(&config)?;
            let mut strategy = daemon::build_strategy(&config, gateway, credentials)?;
            let outcome = tokio::task::spawn_blocking(move || strategy.try_authenticating()).await?;
            tracing::info!(
                "gateway {}authenticated",
                if outcome.success { "" } else { "not " }
            );
            if !outcome.success {
                std::process::exit(1);
            }
        }
        cli::Command::Check => {
            let gateway = daemon::build_gateway(&config)?;
            let retries = config.request_retries;
            let status =
                tokio::task::spawn_blocking(move || gateway.get_status(retries)).await?;
            match status.parsed() {
                ParsedStatus::NoSession | ParsedStatus::NotRunning => {
                    tracing::info!("no active gateway session")
                }
                label => tracing::info!("gateway session: {label}"),
            }
        }
        cli::Command::Tickle => {
            let gateway = daemon::build_gateway(&config)?;
            let status = tokio::task::spawn_blocking(move || gateway.get_status(1)).await?;
            tracing::info!("gateway {}running", if status.running { "" } else { "not " });
        }
        cli::Command::Validate => {
            let gateway = daemon::build_gateway(&config)?;
            let valid = tokio::task::spawn_blocking(move || gateway.validate()).await??;
            tracing::info!("session {}valid", if valid { "" } else { "not " });
        }
        cli::Command::Start => {
            let process = daemon::build_process(&config);
            let pids = tokio::task::spawn_blocking(move || {
                use crate::process::ProcessControl;
                process.ensure_running()
            })
            .await??;
            if pids.is_empty() {
                tracing::info!("gateway not running");
            } else {
                tracing::info!("gateway running with pids: {pids:?}");
            }
        }
        cli::Command::Kill => {
            let process = daemon::build_process(&config);
            let killed = tokio::task::spawn_blocking(move || {
                use crate::process::ProcessControl;
                process.kill_gateway()
            })
            .await??;
            tracing::info!("gateway {}killed", if killed { "" } else { "not " });
        }
    }

    Ok(())
}
