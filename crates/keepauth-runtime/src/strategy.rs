//! Authentication strategies over the status poller and the login engine.
//!
//! Two deliberately distinct policies are selectable at runtime:
//!
//! - **Strategy A**, full relogin, optimistic: always drive the login
//!   form, reauthenticate in place if a competing session shows up late.
//! - **Strategy B**, reauthenticate-first: prefer the gateway's silent
//!   reauthentication, log out competing sessions first, and kill the
//!   gateway process once the bounded reauthenticate loop is exhausted
//!   so the next cycle starts clean.
//!
//! Which one a deployment needs is operator policy; the behavioral
//! difference in competing-session handling is intentional.

use std::time::Duration;

use keepauth_client::GatewayApi;
use keepauth_core::{AuthOutcome, LoginOutcome, Status, StatusCondition};

use crate::process::ProcessControl;

/// Pause between polls in the repeated status-check loop.
const STATUS_CHECK_PAUSE: Duration = Duration::from_secs(1);

/// Settle buffer after a login before re-checking authentication.
const SESSION_SETTLE: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct StrategyConfig {
    /// `"A"` or `"B"`; anything else falls back to A with an error log.
    pub strategy: String,
    pub request_retries: u32,
    /// Wait after triggering reauthentication in strategy A.
    pub reauthenticate_wait: Duration,
    /// Whether strategy A logs out and re-runs once on a failed session.
    pub restart_failed_sessions: bool,
    /// Wait after reauthenticating a late-detected competing session.
    pub restart_wait: Duration,
    pub max_reauthenticate_retries: u32,
    pub max_status_check_retries: u32,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            strategy: "A".to_string(),
            request_retries: 1,
            reauthenticate_wait: Duration::ZERO,
            restart_failed_sessions: true,
            restart_wait: Duration::from_secs(15),
            max_reauthenticate_retries: 3,
            max_status_check_retries: 15,
        }
    }
}

/// The login capability as the strategy layer sees it: one call, one
/// outcome, adaptive state hidden inside. Enables mock injection.
pub trait LoginRunner: Send {
    fn login(&mut self) -> LoginOutcome;
}

/// Outcome of one strategy A pass: finished, or re-run the whole
/// strategy once after a failed-session logout.
enum PassOutcome {
    Done(AuthOutcome),
    Rerun,
}

/// Chooses and executes an authentication strategy for one cycle.
pub struct StrategyEngine<G, L, P> {
    gateway: G,
    login: L,
    process: P,
    config: StrategyConfig,
    sleep: fn(Duration),
}

impl<G: GatewayApi, L: LoginRunner, P: ProcessControl> StrategyEngine<G, L, P> {
    pub fn new(gateway: G, login: L, process: P, config: StrategyConfig) -> Self {
        Self {
            gateway,
            login,
            process,
            config,
            sleep: std::thread::sleep,
        }
    }

    #[cfg(test)]
    fn with_sleeper(
        gateway: G,
        login: L,
        process: P,
        config: StrategyConfig,
        sleep: fn(Duration),
    ) -> Self {
        Self {
            gateway,
            login,
            process,
            config,
            sleep,
        }
    }

    /// One authentication pass: poll, decide, act.
    ///
    /// Healthy sessions return immediately with no side effects; an
    /// unreachable gateway returns failure without attempting a login.
    pub fn try_authenticating(&mut self) -> AuthOutcome {
        let status = self.gateway.get_status(self.config.request_retries);
        if status.authenticated && !status.competing {
            return AuthOutcome::success(status);
        }

        tracing::info!("{status}");

        if !status.running {
            tracing::error!(
                "cannot communicate with the gateway. Consider increasing KEEPAUTH_GATEWAY_STARTUP."
            );
            return AuthOutcome::failure(status);
        }

        tracing::info!("authentication strategy: \"{}\"", self.config.strategy);
        match self.config.strategy.as_str() {
            "A" => self.strategy_a(status),
            "B" => self.strategy_b(status),
            other => {
                tracing::error!(
                    "unknown authentication strategy: \"{other}\". Defaulting to strategy A."
                );
                self.strategy_a(status)
            }
        }
    }

    // ─── Strategy A ──────────────────────────────────────────────

    fn strategy_a(&mut self, status: Status) -> AuthOutcome {
        let mut status = status;
        // one bounded re-run replaces open-ended retrying: a second
        // failure means this cycle reports failure and the next cycle
        // starts over
        for _ in 0..2 {
            match self.strategy_a_pass(status) {
                PassOutcome::Done(outcome) => return outcome,
                PassOutcome::Rerun => {}
            }

            status = self.gateway.get_status(self.config.request_retries);
            if status.authenticated && !status.competing {
                return AuthOutcome::success(status);
            }
            tracing::info!("{status}");
            if !status.running {
                tracing::error!("cannot communicate with the gateway after restarting the session");
                return AuthOutcome::failure(status);
            }
        }
        AuthOutcome::failure(status)
    }

    fn strategy_a_pass(&mut self, status: Status) -> PassOutcome {
        if status.session {
            if !status.connected || status.competing {
                tracing::info!("competing or disconnected gateway session found, logging out first...");
                self.logout();
            }
            tracing::info!("gateway session found but not authenticated, logging in...");
        } else {
            tracing::info!("no active sessions, logging in...");
        }

        let login = self.login.login();
        tracing::info!(
            "logging in {}",
            if login.success { "succeeded" } else { "failed" }
        );
        if login.shutdown {
            return PassOutcome::Done(AuthOutcome::shutdown(status));
        }
        if !login.success {
            return PassOutcome::Done(AuthOutcome::failure(status));
        }

        (self.sleep)(SESSION_SETTLE);

        // double check that the session actually authenticated
        let status = self.gateway.get_status(self.config.request_retries.max(2));
        if !status.authenticated {
            if status.session {
                tracing::error!("logging in succeeded, but the active session is still not authenticated");
                self.reauthenticate();

                if !self.config.reauthenticate_wait.is_zero() {
                    tracing::info!(
                        "waiting {:?} for reauthentication before restarting",
                        self.config.reauthenticate_wait
                    );
                    (self.sleep)(self.config.reauthenticate_wait);
                }

                if self.config.restart_failed_sessions {
                    tracing::info!("logging out and reattempting full authentication");
                    self.logout();
                    return PassOutcome::Rerun;
                }
            } else if status.running {
                tracing::error!("logging in succeeded but there are still no active sessions");
            } else {
                tracing::error!("logging in succeeded but now cannot communicate with the gateway");
            }
            return PassOutcome::Done(AuthOutcome::failure(status));
        }

        if !status.connected || status.competing {
            tracing::info!(
                "logging in succeeded, session is authenticated but competing or disconnected, reauthenticating..."
            );
            self.reauthenticate();
            (self.sleep)(self.config.restart_wait);
            // the next scheduled cycle re-polls and picks it up
            return PassOutcome::Done(AuthOutcome::failure(status));
        }

        PassOutcome::Done(AuthOutcome::success(status))
    }

    // ─── Strategy B ──────────────────────────────────────────────

    fn strategy_b(&mut self, status: Status) -> AuthOutcome {
        if !status.session {
            tracing::info!("no active sessions, logging in...");
            let login = self.login.login();
            tracing::info!(
                "logging in {}",
                if login.success { "succeeded" } else { "failed" }
            );
            if login.shutdown {
                return AuthOutcome::shutdown(status);
            }
            if !login.success {
                return AuthOutcome::failure(status);
            }
        } else if !status.connected || status.competing {
            tracing::info!(
                "competing or disconnected gateway session found, logging out and reauthenticating..."
            );
            self.logout();
            self.reauthenticate();
        } else {
            tracing::info!("active session found but not authenticated, reauthenticating...");
            self.reauthenticate();
        }

        self.post_authentication()
    }

    /// Verify that authentication took hold, reauthenticating repeatedly
    /// if not, and escalate to a gateway kill once retries are spent.
    fn post_authentication(&mut self) -> AuthOutcome {
        let status = self.repeatedly_reauthenticate(
            self.config.max_reauthenticate_retries,
            StatusCondition::AuthenticatedTrue,
        );

        if !status.running || !status.session {
            return AuthOutcome::failure(status);
        }

        if !status.connected || status.competing || !status.authenticated {
            tracing::error!(
                "repeated reauthentication failed {} times. Killing the gateway; the next cycle restarts the authentication process from scratch.",
                self.config.max_reauthenticate_retries
            );
            match self.process.kill_gateway() {
                Ok(true) => {}
                Ok(false) => tracing::error!("killing the gateway process failed"),
                Err(err) => tracing::error!("error killing the gateway: {err}"),
            }
            return AuthOutcome::failure(status);
        }

        AuthOutcome::success(status)
    }

    // ─── Retry loops ─────────────────────────────────────────────

    fn repeatedly_check_status(&mut self, max_attempts: u32, condition: StatusCondition) -> Status {
        let max_attempts = max_attempts.max(1);
        let mut status = Status::not_running();

        for attempt in 0..max_attempts {
            status = self.gateway.get_status(1);
            if condition.is_met(&status) {
                return status;
            }
            if attempt + 1 < max_attempts {
                if attempt == 0 {
                    tracing::info!(
                        "repeating the status check up to another {} times",
                        max_attempts - 1
                    );
                }
                (self.sleep)(STATUS_CHECK_PAUSE);
            }
        }

        tracing::info!(
            "max status check retries reached after {max_attempts} attempts. Consider increasing KEEPAUTH_MAX_STATUS_CHECK_RETRIES."
        );
        status
    }

    fn repeatedly_reauthenticate(&mut self, max_attempts: u32, condition: StatusCondition) -> Status {
        let max_attempts = max_attempts.max(1);
        let mut status = Status::not_running();

        for attempt in 0..max_attempts {
            status = self.repeatedly_check_status(self.config.max_status_check_retries, condition);
            tracing::info!("{status}");

            if condition.is_met(&status) {
                return status;
            }
            if attempt + 1 < max_attempts {
                self.reauthenticate();
                tracing::info!("repeated reauthentication attempt number {}", attempt + 2);
            }
        }

        tracing::info!(
            "max reauthenticate retries reached after {max_attempts} attempts. Consider increasing KEEPAUTH_MAX_REAUTHENTICATE_RETRIES."
        );
        status
    }

    // ─── Gateway call helpers ────────────────────────────────────

    /// Logout keeps the session alive upstream, so a follow-up
    /// reauthenticate can adopt it.
    fn logout(&mut self) {
        match self.gateway.logout() {
            Ok(confirmed) => tracing::info!(
                "gateway logout {}",
                if confirmed { "successful" } else { "unsuccessful" }
            ),
            Err(err) => tracing::error!("error logging out: {err}"),
        }
    }

    fn reauthenticate(&mut self) {
        if let Err(err) = self.gateway.reauthenticate() {
            tracing::error!("error reauthenticating: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::collections::VecDeque;

    use keepauth_client::ClientError;

    use crate::process::ProcessError;

    fn no_sleep(_: Duration) {}

    #[derive(Default)]
    struct Calls {
        status_polls: u32,
        logins: u32,
        logouts: u32,
        reauthenticates: u32,
        kills: u32,
    }

    type SharedCalls = Arc<Mutex<Calls>>;

    struct MockGateway {
        statuses: Mutex<VecDeque<Status>>,
        calls: SharedCalls,
    }

    impl MockGateway {
        /// Replays the given statuses; the last one repeats forever.
        fn new(statuses: Vec<Status>, calls: SharedCalls) -> Self {
            Self {
                statuses: Mutex::new(statuses.into()),
                calls,
            }
        }
    }

    impl GatewayApi for MockGateway {
        fn get_status(&self, _max_attempts: u32) -> Status {
            self.calls.lock().expect("calls lock").status_polls += 1;
            let mut statuses = self.statuses.lock().expect("statuses lock");
            if statuses.len() > 1 {
                statuses.pop_front().expect("nonempty")
            } else {
                statuses.front().cloned().unwrap_or_else(Status::not_running)
            }
        }

        fn reauthenticate(&self) -> Result<(), ClientError> {
            self.calls.lock().expect("calls lock").reauthenticates += 1;
            Ok(())
        }

        fn logout(&self) -> Result<bool, ClientError> {
            self.calls.lock().expect("calls lock").logouts += 1;
            Ok(true)
        }
    }

    struct MockLogin {
        outcome: LoginOutcome,
        calls: SharedCalls,
    }

    impl LoginRunner for MockLogin {
        fn login(&mut self) -> LoginOutcome {
            self.calls.lock().expect("calls lock").logins += 1;
            self.outcome
        }
    }

    struct MockProcess {
        calls: SharedCalls,
    }

    impl ProcessControl for MockProcess {
        fn ensure_running(&self) -> Result<Vec<u32>, ProcessError> {
            Ok(vec![42])
        }

        fn kill_gateway(&self) -> Result<bool, ProcessError> {
            self.calls.lock().expect("calls lock").kills += 1;
            Ok(true)
        }
    }

    fn healthy() -> Status {
        Status {
            running: true,
            session: true,
            connected: true,
            authenticated: true,
            ..Status::default()
        }
    }

    fn unauthenticated() -> Status {
        Status {
            running: true,
            session: true,
            connected: true,
            ..Status::default()
        }
    }

    fn engine(
        statuses: Vec<Status>,
        login_outcome: LoginOutcome,
        config: StrategyConfig,
    ) -> (
        StrategyEngine<MockGateway, MockLogin, MockProcess>,
        SharedCalls,
    ) {
        let calls: SharedCalls = Arc::default();
        let gateway = MockGateway::new(statuses, Arc::clone(&calls));
        let login = MockLogin {
            outcome: login_outcome,
            calls: Arc::clone(&calls),
        };
        let process = MockProcess {
            calls: Arc::clone(&calls),
        };
        (
            StrategyEngine::with_sleeper(gateway, login, process, config, no_sleep),
            calls,
        )
    }

    #[test]
    fn healthy_session_short_circuits_without_login() {
        let (mut engine, calls) = engine(
            vec![healthy()],
            LoginOutcome::success(),
            StrategyConfig::default(),
        );
        let outcome = engine.try_authenticating();

        assert!(outcome.success);
        assert!(!outcome.shutdown);
        let calls = calls.lock().expect("calls lock");
        assert_eq!(calls.logins, 0);
        assert_eq!(calls.reauthenticates, 0);
        assert_eq!(calls.status_polls, 1);
    }

    #[test]
    fn unreachable_gateway_fails_without_login() {
        let (mut engine, calls) = engine(
            vec![Status::not_running()],
            LoginOutcome::success(),
            StrategyConfig::default(),
        );
        let outcome = engine.try_authenticating();

        assert!(!outcome.success);
        assert!(!outcome.shutdown);
        assert_eq!(calls.lock().expect("calls lock").logins, 0);
    }

    #[test]
    fn strategy_a_login_then_authenticated() {
        let (mut engine, calls) = engine(
            vec![unauthenticated(), healthy()],
            LoginOutcome::success(),
            StrategyConfig::default(),
        );
        let outcome = engine.try_authenticating();

        assert!(outcome.success);
        let calls = calls.lock().expect("calls lock");
        assert_eq!(calls.logins, 1);
        assert_eq!(calls.logouts, 0);
    }

    #[test]
    fn strategy_a_logs_out_competing_session_first() {
        let competing = Status {
            competing: true,
            ..healthy()
        };
        let (mut engine, calls) = engine(
            vec![competing, healthy()],
            LoginOutcome::success(),
            StrategyConfig::default(),
        );
        let outcome = engine.try_authenticating();

        assert!(outcome.success);
        let calls = calls.lock().expect("calls lock");
        assert_eq!(calls.logouts, 1);
        assert_eq!(calls.logins, 1);
    }

    #[test]
    fn strategy_a_propagates_login_shutdown() {
        let (mut engine, calls) = engine(
            vec![unauthenticated()],
            LoginOutcome::shutdown(),
            StrategyConfig::default(),
        );
        let outcome = engine.try_authenticating();

        assert!(!outcome.success);
        assert!(outcome.shutdown);
        assert_eq!(calls.lock().expect("calls lock").logins, 1);
    }

    #[test]
    fn strategy_a_restarts_failed_session_once() {
        // login "succeeds" but the session never authenticates: the
        // engine reauthenticates, logs out and re-runs exactly once
        let (mut engine, calls) = engine(
            vec![unauthenticated()],
            LoginOutcome::success(),
            StrategyConfig {
                restart_failed_sessions: true,
                ..StrategyConfig::default()
            },
        );
        let outcome = engine.try_authenticating();

        assert!(!outcome.success);
        assert!(!outcome.shutdown);
        let calls = calls.lock().expect("calls lock");
        assert_eq!(calls.logins, 2);
        assert!(calls.reauthenticates >= 1);
        assert!(calls.logouts >= 1);
    }

    #[test]
    fn strategy_b_fresh_login_invoked_once_before_reauth_loop() {
        let (mut engine, calls) = engine(
            vec![Status::no_session(), healthy()],
            LoginOutcome::success(),
            StrategyConfig {
                strategy: "B".to_string(),
                ..StrategyConfig::default()
            },
        );
        let outcome = engine.try_authenticating();

        assert!(outcome.success);
        let calls = calls.lock().expect("calls lock");
        assert_eq!(calls.logins, 1);
        assert_eq!(calls.reauthenticates, 0);
    }

    #[test]
    fn strategy_b_reauthenticates_existing_session() {
        let (mut engine, calls) = engine(
            vec![unauthenticated(), healthy()],
            LoginOutcome::success(),
            StrategyConfig {
                strategy: "B".to_string(),
                ..StrategyConfig::default()
            },
        );
        let outcome = engine.try_authenticating();

        assert!(outcome.success);
        let calls = calls.lock().expect("calls lock");
        assert_eq!(calls.logins, 0);
        assert_eq!(calls.reauthenticates, 1);
    }

    #[test]
    fn strategy_b_kills_gateway_on_exhaustion() {
        // session stays unauthenticated through every retry
        let (mut engine, calls) = engine(
            vec![unauthenticated()],
            LoginOutcome::success(),
            StrategyConfig {
                strategy: "B".to_string(),
                max_reauthenticate_retries: 2,
                max_status_check_retries: 2,
                ..StrategyConfig::default()
            },
        );
        let outcome = engine.try_authenticating();

        assert!(!outcome.success);
        assert!(!outcome.shutdown);
        let calls = calls.lock().expect("calls lock");
        assert_eq!(calls.kills, 1);
        // initial reauthenticate + one per exhausted retry round
        assert!(calls.reauthenticates >= 2);
    }

    #[test]
    fn strategy_b_logs_out_competing_session() {
        let competing = Status {
            competing: true,
            ..healthy()
        };
        let (mut engine, calls) = engine(
            vec![competing, healthy()],
            LoginOutcome::success(),
            StrategyConfig {
                strategy: "B".to_string(),
                ..StrategyConfig::default()
            },
        );
        let outcome = engine.try_authenticating();

        assert!(outcome.success);
        let calls = calls.lock().expect("calls lock");
        assert_eq!(calls.logouts, 1);
        assert_eq!(calls.reauthenticates, 1);
        assert_eq!(calls.logins, 0);
    }

    #[test]
    fn unknown_strategy_falls_back_to_a() {
        let (mut engine, calls) = engine(
            vec![unauthenticated(), healthy()],
            LoginOutcome::success(),
            StrategyConfig {
                strategy: "Z".to_string(),
                ..StrategyConfig::default()
            },
        );
        let outcome = engine.try_authenticating();

        assert!(outcome.success);
        assert_eq!(calls.lock().expect("calls lock").logins, 1);
    }
}
