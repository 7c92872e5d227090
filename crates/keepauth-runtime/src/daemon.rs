//! Maintenance scheduler: wires gateway client → strategy engine → health
//! server and runs the periodic authentication cycle.
//!
//! One cycle at a time by construction: the loop awaits each cycle before
//! the next tick, so logins never race each other. An internal shutdown
//! request stops the cadence and exits with a distinguishable code; an
//! external signal lets the in-flight cycle finish first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use keepauth_browser::BrowserOptions;
use keepauth_client::GatewayClient;
use keepauth_core::{AuthOutcome, Credentials, LoginOutcome, Status};
use keepauth_login::{LoginEngine, TwoFaHandler, select_handler};

use crate::config::Config;
use crate::health::{self, HealthState};
use crate::process::{GatewayProcess, ProcessControl};
use crate::strategy::{LoginRunner, StrategyEngine};
use crate::webdriver::WebDriverFactory;

/// The login capability bound to one engine, driver and credential set.
pub struct EngineLoginRunner {
    engine: LoginEngine,
    factory: WebDriverFactory,
    credentials: Credentials,
    two_fa: Option<Box<dyn TwoFaHandler>>,
}

impl LoginRunner for EngineLoginRunner {
    fn login(&mut self) -> LoginOutcome {
        self.engine
            .login(&self.factory, &self.credentials, self.two_fa.as_deref())
    }
}

pub type DaemonStrategy = StrategyEngine<Arc<GatewayClient>, EngineLoginRunner, GatewayProcess>;

pub fn build_gateway(config: &Config) -> anyhow::Result<Arc<GatewayClient>> {
    Ok(Arc::new(GatewayClient::new(
        &config.base_url,
        config.routes.clone(),
        config.request_timeout,
        config.verify_certificates,
    )?))
}

pub fn build_process(config: &Config) -> GatewayProcess {
    GatewayProcess::new(
        config.gateway_dir.clone(),
        &config.gateway_process_match,
        config.gateway_startup,
        config.spawn_new_processes,
    )
}

pub fn build_strategy(
    config: &Config,
    gateway: Arc<GatewayClient>,
    credentials: Credentials,
) -> anyhow::Result<DaemonStrategy> {
    let two_fa = select_handler(&config.two_fa)
        .map_err(|err| anyhow::anyhow!("cannot set up the 2FA handler: {err}"))?;

    let factory = WebDriverFactory::new(
        &config.webdriver_url,
        BrowserOptions {
            headless: config.headless,
            incognito: config.incognito,
            ui_scaling: config.ui_scaling,
            page_load_timeout: config.login.page_load_timeout,
            user_data_dir: None,
        },
    );

    let login = EngineLoginRunner {
        engine: LoginEngine::new(config.login.clone()),
        factory,
        credentials,
        two_fa,
    };

    Ok(StrategyEngine::new(
        gateway,
        login,
        build_process(config),
        config.strategy.clone(),
    ))
}

/// Run the daemon until a signal or an internal shutdown request.
/// Returns the process exit code.
pub async fn run_daemon(config: Config) -> anyhow::Result<i32> {
    let credentials = Config::credentials()?;
    let gateway = build_gateway(&config)?;
    let strategy = Arc::new(Mutex::new(build_strategy(
        &config,
        Arc::clone(&gateway),
        credentials,
    )?));
    let process = Arc::new(build_process(&config));

    let shutdown_requested = Arc::new(AtomicBool::new(false));
    let (stop_tx, stop_rx) = watch::channel(false);

    let listener = TcpListener::bind(("0.0.0.0", config.health_server_port)).await?;
    let health_gateway: Arc<dyn keepauth_client::GatewayApi + Send + Sync> = gateway.clone();
    let health_state = HealthState {
        shutdown_requested: Arc::clone(&shutdown_requested),
        gateway: health_gateway,
    };
    let server = tokio::spawn(health::serve(listener, health_state, stop_rx));

    tracing::info!(
        "starting maintenance with an interval of {:?}",
        config.maintenance_interval
    );

    let mut exit_code = 0;

    // the scheduler waits a full interval before the first invocation,
    // so an active start runs one cycle up front
    if config.start_active {
        let outcome = run_cycle(Arc::clone(&strategy), Arc::clone(&process)).await;
        if handle_outcome(&outcome, &shutdown_requested) {
            exit_code = 1;
        }
    } else {
        tracing::info!("initialised in an inactive state, starting the maintenance loop");
    }

    if exit_code == 0 {
        let mut ticker = tokio::time::interval(config.maintenance_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately; the start-active cycle
        // already covered it
        ticker.tick().await;

        // registered once so a signal arriving mid-cycle is not lost;
        // the in-flight cycle still finishes before the loop observes it
        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tracing::debug!("maintenance");
                    let outcome = run_cycle(Arc::clone(&strategy), Arc::clone(&process)).await;
                    if handle_outcome(&outcome, &shutdown_requested) {
                        exit_code = 1;
                        break;
                    }
                }
                () = &mut shutdown => {
                    break;
                }
            }
        }
    }

    let _ = stop_tx.send(true);
    if let Err(err) = server.await {
        tracing::warn!("health server task failed: {err}");
    }
    tracing::info!("daemon stopped");
    Ok(exit_code)
}

/// One maintenance cycle: ensure the gateway runs, then authenticate.
async fn run_cycle(strategy: Arc<Mutex<DaemonStrategy>>, process: Arc<GatewayProcess>) -> AuthOutcome {
    let result = tokio::task::spawn_blocking(move || {
        if let Err(err) = process.ensure_running() {
            tracing::error!("failed to ensure the gateway is running: {err}");
        }
        let mut strategy = strategy.lock().unwrap_or_else(PoisonError::into_inner);
        strategy.try_authenticating()
    })
    .await;

    result.unwrap_or_else(|err| {
        tracing::error!("maintenance cycle task failed: {err}");
        AuthOutcome::failure(Status::not_running())
    })
}

/// Log the cycle result; returns true when the daemon must shut down.
fn handle_outcome(outcome: &AuthOutcome, shutdown_requested: &AtomicBool) -> bool {
    if outcome.shutdown {
        shutdown_requested.store(true, Ordering::SeqCst);
        tracing::warn!("shutting down due to a critical authentication error");
        return true;
    }
    if outcome.success {
        tracing::info!(
            "gateway running and authenticated, session id: {}, server name: {}",
            outcome.status.session_id.as_deref().unwrap_or("-"),
            outcome.status.server_name.as_deref().unwrap_or("-"),
        );
    }
    false
}

/// Resolve on ctrl-c or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
            _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        tracing::info!("received ctrl-c, shutting down");
    }
}
