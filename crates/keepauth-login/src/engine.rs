//! The login engine: a bounded-attempt credential submission loop.
//!
//! Flow per attempt: fill the form, wait the adaptive presubmit buffer,
//! submit, then wait for the first of several trigger conditions
//! (success text, 2FA code field, 2FA method select, 2FA notification,
//! error banner, promotional interstitial) and branch on which fired.
//! Each step reports an [`AttemptOutcome`] by value; the loop switches on
//! it, so no error type doubles as control flow.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use keepauth_core::{Credentials, LoginOutcome, SubmissionPolicy, SubmissionState};
use keepauth_core::submission::classify_error_text;
use keepauth_browser::{
    BrowserError, ElementSnapshot, Key, Locator, LocatorKind, PageSession, SessionFactory,
    TargetRole, Targets, WaitSpec, WebsiteVersion,
};

use crate::secret;
use crate::two_fa::{TwoFaHandler, TwoFaOutcome, is_valid_strict_code};

/// Pause between failed attempts.
const ATTEMPT_RETRY_PAUSE: Duration = Duration::from_secs(1);

/// Settle pause after the success text appears, letting the session
/// finish establishing server-side.
const SUCCESS_SETTLE: Duration = Duration::from_secs(2);

/// Shorter wait after clicking through the promotional interstitial.
const PROMO_WAIT: Duration = Duration::from_secs(10);

/// Marker probed to distinguish "page never loaded" from "page loaded but
/// elements are missing" in timeout diagnostics.
const PAGE_MARKER_PROBE: Duration = Duration::from_secs(5);

/// Tunables for one [`LoginEngine`].
#[derive(Debug, Clone)]
pub struct LoginConfig {
    /// Full URL of the auth webpage.
    pub auth_url: String,
    /// Visible text of the 2FA method to choose when a select appears.
    pub two_fa_select_target: String,
    /// Reject challenge codes that are not exactly six digits.
    pub strict_two_fa_code: bool,
    /// Attempts per login call; clamped to at least 1.
    pub max_immediate_attempts: u32,
    /// Bound for each trigger wait.
    pub element_wait_timeout: Duration,
    /// Bound for the initial page load.
    pub page_load_timeout: Duration,
    /// Bound per version when probing for the website layout.
    pub version_probe_timeout: Duration,
    pub policy: SubmissionPolicy,
    /// Where diagnostic screenshots land.
    pub outputs_dir: PathBuf,
    pub error_screenshots: bool,
    /// Explicit per-role locator overrides.
    pub target_overrides: BTreeMap<TargetRole, Locator>,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            auth_url: "https://localhost:5000/sso/Login?forwardTo=22&RL=1&ip2loc=on".to_string(),
            two_fa_select_target: "IB Key".to_string(),
            strict_two_fa_code: true,
            max_immediate_attempts: 1,
            element_wait_timeout: Duration::from_secs(15),
            page_load_timeout: Duration::from_secs(15),
            version_probe_timeout: Duration::from_secs(5),
            policy: SubmissionPolicy::default(),
            outputs_dir: PathBuf::from("outputs"),
            error_screenshots: true,
            target_overrides: BTreeMap::new(),
        }
    }
}

/// Verdict of one step or one whole attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttemptOutcome {
    Success,
    Retry,
    Shutdown,
}

/// Drives login attempts and owns the adaptive submission state, which
/// persists across calls for the process lifetime.
pub struct LoginEngine {
    config: LoginConfig,
    state: SubmissionState,
    sleep: fn(Duration),
}

impl LoginEngine {
    #[must_use]
    pub fn new(config: LoginConfig) -> Self {
        let state = SubmissionState::new(&config.policy);
        Self {
            config,
            state,
            sleep: std::thread::sleep,
        }
    }

    #[cfg(test)]
    fn with_sleeper(config: LoginConfig, sleep: fn(Duration)) -> Self {
        let state = SubmissionState::new(&config.policy);
        Self {
            config,
            state,
            sleep,
        }
    }

    /// Current adaptive submission counters.
    #[must_use]
    pub fn submission_state(&self) -> &SubmissionState {
        &self.state
    }

    /// Run one bounded batch of login attempts.
    ///
    /// The browser session is opened and released inside this call on
    /// every path. Failures never escape as errors; they become a
    /// `(success=false, shutdown=false)` outcome, and `shutdown=true` is
    /// reserved for the lockout guard and missing-2FA-handler cases.
    pub fn login(
        &mut self,
        factory: &dyn SessionFactory,
        credentials: &Credentials,
        two_fa: Option<&dyn TwoFaHandler>,
    ) -> LoginOutcome {
        let mut session = match factory.open() {
            Ok(session) => session,
            Err(err) => {
                tracing::error!("failed to open a browser session: {err}");
                return LoginOutcome::failure();
            }
        };

        let mut detected: Option<(WebsiteVersion, Targets)> = None;
        let outcome = match self.drive(session.as_mut(), credentials, two_fa, &mut detected) {
            Ok(outcome) => outcome,
            Err(err) if err.is_timeout() => {
                self.report_timeout(session.as_mut(), &err, detected.as_ref());
                self.save_diagnostic(session.as_mut(), "__timeout-exception");
                LoginOutcome::failure()
            }
            Err(err) => {
                tracing::error!("error encountered during authentication: {err}");
                self.save_diagnostic(session.as_mut(), "__generic-exception");
                LoginOutcome::failure()
            }
        };

        tracing::info!("releasing the browser session");
        session.close();
        outcome
    }

    fn drive(
        &mut self,
        session: &mut dyn PageSession,
        credentials: &Credentials,
        two_fa: Option<&dyn TwoFaHandler>,
        detected: &mut Option<(WebsiteVersion, Targets)>,
    ) -> Result<LoginOutcome, BrowserError> {
        tracing::info!("loading auth webpage at {}", self.config.auth_url);
        if let Err(err) = session.navigate(&self.config.auth_url) {
            match err {
                BrowserError::ConnectionRefused(_) => {
                    tracing::error!(
                        "connection to the gateway refused; it may not be serving yet. Consider increasing KEEPAUTH_GATEWAY_STARTUP. {err}"
                    );
                    return Ok(LoginOutcome::failure());
                }
                BrowserError::ConnectionClosed(_) => {
                    tracing::error!(
                        "connection to the gateway closed; it may not be running correctly or its port may be occupied. {err}"
                    );
                    return Ok(LoginOutcome::failure());
                }
                other => return Err(other),
            }
        }

        let version = self.detect_version(session);
        let targets = Targets::resolve(version, &self.config.target_overrides);
        tracing::debug!("website version {version}, targets: {targets}");
        *detected = Some((version, targets.clone()));

        session.wait_present(
            targets.get(TargetRole::UserName),
            self.config.element_wait_timeout,
        )?;
        tracing::info!("gateway auth webpage loaded");

        let password = match &credentials.key {
            Some(key) => match secret::decrypt_password(&credentials.password, key) {
                Ok(password) => password,
                Err(err) => {
                    tracing::error!("failed to decrypt the configured password: {err}");
                    return Ok(LoginOutcome::failure());
                }
            },
            None => credentials.password.clone(),
        };

        let max_attempts = self.config.max_immediate_attempts.max(1);
        for attempt in 1..=max_attempts {
            tracing::info!("login attempt number {attempt}");

            match self.attempt(session, &credentials.account, &password, two_fa, &targets)? {
                AttemptOutcome::Success => {
                    (self.sleep)(SUCCESS_SETTLE);
                    return Ok(LoginOutcome::success());
                }
                AttemptOutcome::Shutdown => return Ok(LoginOutcome::shutdown()),
                AttemptOutcome::Retry => {}
            }
        }

        Ok(LoginOutcome::failure())
    }

    /// One pass through the form, ending on a resolved trigger.
    fn attempt(
        &mut self,
        session: &mut dyn PageSession,
        account: &str,
        password: &str,
        two_fa: Option<&dyn TwoFaHandler>,
        targets: &Targets,
    ) -> Result<AttemptOutcome, BrowserError> {
        let timeout = self.config.element_wait_timeout;

        session.clear_and_type(targets.get(TargetRole::UserName), account)?;
        let password_field = targets.get(TargetRole::Password);
        session.clear_and_type(password_field, password)?;
        session.press(password_field, Key::Tab)?;

        // buffer against the client-side race between field validation
        // and form submission
        let buffer = self.state.presubmit_buffer();
        if !buffer.is_zero() {
            tracing::debug!("waiting {buffer:?} before submitting the form");
        }
        (self.sleep)(buffer);

        tracing::info!("submitting the form");
        session.click(targets.get(TargetRole::Submit))?;

        let (mut role, mut element) = await_trigger(
            session,
            targets,
            &[
                TargetRole::Success,
                TargetRole::TwoFa,
                TargetRole::TwoFaSelect,
                TargetRole::TwoFaNotification,
                TargetRole::Error,
                TargetRole::IbkeyPromo,
            ],
            timeout,
        )?;

        if role == TargetRole::TwoFaSelect {
            tracing::info!("required to select a 2FA method");
            session.select_by_visible_text(
                targets.get(TargetRole::TwoFaSelect),
                &self.config.two_fa_select_target,
            )?;
            tracing::info!(
                "2FA method \"{}\" selected",
                self.config.two_fa_select_target
            );
            (role, element) = await_trigger(
                session,
                targets,
                &[
                    TargetRole::Success,
                    TargetRole::TwoFa,
                    TargetRole::TwoFaNotification,
                    TargetRole::Error,
                    TargetRole::IbkeyPromo,
                ],
                timeout,
            )?;
        }

        if role == TargetRole::TwoFaNotification {
            tracing::info!(
                "credentials correct, but the gateway requires an out-of-band 2FA confirmation"
            );
            if let Some(handler) = two_fa {
                let confirmed = match handler.acquire(session) {
                    Ok(TwoFaOutcome::Notified(confirmed)) => confirmed,
                    Ok(TwoFaOutcome::Code(code)) => !code.is_empty(),
                    Err(err) => {
                        tracing::error!("2FA notification handling failed: {err}");
                        false
                    }
                };
                if !confirmed {
                    session.refresh()?;
                    return Ok(AttemptOutcome::Retry);
                }
            }
            (role, element) = await_trigger(
                session,
                targets,
                &[TargetRole::Success, TargetRole::IbkeyPromo, TargetRole::Error],
                timeout,
            )?;
        }

        if role == TargetRole::TwoFa {
            tracing::info!("credentials correct, but the gateway requires a two-factor code");
            let Some(handler) = two_fa else {
                tracing::error!(
                    "######## ATTENTION! ######## The gateway requires two-factor authentication but no 2FA handler is configured. Configure one via KEEPAUTH_TWO_FA_HANDLER; shutting down to avoid accumulating failed attempts."
                );
                return Ok(AttemptOutcome::Shutdown);
            };

            match self.acquire_code(handler, session) {
                None => {
                    tracing::warn!("no usable 2FA code returned, aborting this attempt");
                    // role stays TwoFa; resolved as unresolved-2FA below
                }
                Some(code) => {
                    let input = targets.get(TargetRole::TwoFaInput);
                    session.wait_any(&[WaitSpec::clickable(input.clone())], timeout)?;
                    session.clear_and_type(input, &code)?;
                    tracing::info!("submitting the 2FA form");
                    session.press(input, Key::Enter)?;
                    (role, element) = await_trigger(
                        session,
                        targets,
                        &[TargetRole::Success, TargetRole::IbkeyPromo, TargetRole::Error],
                        timeout,
                    )?;
                }
            }
        }

        if role == TargetRole::IbkeyPromo {
            tracing::info!("skipping the promotional interstitial");
            session.click(targets.get(TargetRole::IbkeyPromo))?;
            (role, element) = await_trigger(
                session,
                targets,
                &[TargetRole::Success, TargetRole::Error],
                PROMO_WAIT,
            )?;
        }

        match role {
            TargetRole::Error => {
                let text = element.text.clone();
                tracing::error!("error displayed by the login webpage: {text}");
                self.save_diagnostic(session, "__failed_attempt");

                let update = self
                    .state
                    .record_error(classify_error_text(&text), &self.config.policy);
                if update.buffer_grown {
                    if update.buffer_at_max {
                        tracing::warn!(
                            "presubmit buffer pinned at its maximum: {:?}",
                            self.state.presubmit_buffer()
                        );
                    } else {
                        tracing::warn!(
                            "increased presubmit buffer to {:?}",
                            self.state.presubmit_buffer()
                        );
                    }
                }
                if update.lockout {
                    tracing::error!(
                        "######## ATTENTION! ######## Maximum number of failed authentication attempts ({}) reached. Shutting down to prevent an account lock-out; authenticate manually to reset the upstream counter.",
                        self.config.policy.max_failed_auth
                    );
                    return Ok(AttemptOutcome::Shutdown);
                }

                (self.sleep)(ATTEMPT_RETRY_PAUSE);
                Ok(AttemptOutcome::Retry)
            }
            // trigger unchanged after the 2FA step: no code was entered
            TargetRole::TwoFa => {
                (self.sleep)(ATTEMPT_RETRY_PAUSE);
                session.refresh()?;
                Ok(AttemptOutcome::Retry)
            }
            TargetRole::Success => {
                tracing::info!("webpage displayed the success text");
                self.state.record_success(&self.config.policy);
                Ok(AttemptOutcome::Success)
            }
            other => {
                tracing::warn!("attempt ended on an unexpected trigger: {other}");
                (self.sleep)(ATTEMPT_RETRY_PAUSE);
                Ok(AttemptOutcome::Retry)
            }
        }
    }

    /// Probe for version-specific username fields, defaulting to V1.
    fn detect_version(&self, session: &mut dyn PageSession) -> WebsiteVersion {
        for version in [WebsiteVersion::V1, WebsiteVersion::V2] {
            if session
                .wait_present(&version.user_name_locator(), self.config.version_probe_timeout)
                .is_ok()
            {
                return version;
            }
        }
        tracing::warn!("cannot determine the auth website version, assuming version 1");
        WebsiteVersion::V1
    }

    /// Obtain a challenge code from the handler, applying the strict
    /// shape check when enabled. `None` means "no usable code".
    fn acquire_code(
        &self,
        handler: &dyn TwoFaHandler,
        session: &mut dyn PageSession,
    ) -> Option<String> {
        tracing::info!("attempting to acquire a 2FA code from: {}", handler.name());

        let code = match handler.acquire(session) {
            Ok(TwoFaOutcome::Code(code)) if !code.is_empty() => code,
            Ok(TwoFaOutcome::Code(_)) => return None,
            Ok(TwoFaOutcome::Notified(_)) => {
                tracing::warn!(
                    "2FA handler {} produced a notification outcome where a code was required",
                    handler.name()
                );
                return None;
            }
            Err(err) => {
                tracing::error!("error while acquiring a 2FA code: {err}");
                return None;
            }
        };

        if self.config.strict_two_fa_code && !is_valid_strict_code(&code) {
            tracing::error!(
                "illegal 2FA code returned: {code}. Ensure the code contains exactly 6 digits, or disable KEEPAUTH_STRICT_TWO_FA_CODE."
            );
            return None;
        }

        Some(code)
    }

    /// Distinguish "page never loaded" from "elements missing" after a
    /// timeout, for remote diagnosis.
    fn report_timeout(
        &self,
        session: &mut dyn PageSession,
        err: &BrowserError,
        detected: Option<&(WebsiteVersion, Targets)>,
    ) {
        let marker = Locator::new(LocatorKind::Class, "login");
        let page_loaded = session.wait_present(&marker, PAGE_MARKER_PROBE).is_ok();

        match detected {
            Some((version, targets)) if page_loaded => {
                tracing::error!(
                    "timeout searching for page elements, but the page appears loaded — the website layout may have changed. Website version: {version}, targets in use: {targets}. {err}"
                );
            }
            _ => {
                tracing::error!(
                    "timeout waiting for authentication and the page does not appear loaded. Consider increasing KEEPAUTH_PAGE_LOAD_TIMEOUT. URL: {}, page load timeout: {:?}. {err}",
                    self.config.auth_url,
                    self.config.page_load_timeout
                );
            }
        }
    }

    /// Best-effort diagnostic screenshot; never blocks progress.
    fn save_diagnostic(&self, session: &mut dyn PageSession, postfix: &str) {
        if !self.config.error_screenshots {
            return;
        }

        let stamp = chrono::Local::now().format("%Y-%m-%d_%H-%M-%S");
        let name = format!("keepauth__{}__{stamp}{postfix}.png", env!("CARGO_PKG_VERSION"));
        let path = self.config.outputs_dir.join(name);

        if let Err(err) = std::fs::create_dir_all(&self.config.outputs_dir) {
            tracing::warn!("cannot create outputs directory for screenshots: {err}");
            return;
        }
        tracing::info!(
            "saving screenshot to {}. Cover your credentials before sharing it.",
            path.display()
        );
        if let Err(err) = session.save_screenshot(&path) {
            tracing::warn!("failed to save screenshot: {err}");
        }
    }
}

/// Wait for the first of several role triggers and identify which fired.
fn await_trigger(
    session: &mut dyn PageSession,
    targets: &Targets,
    roles: &[TargetRole],
    timeout: Duration,
) -> Result<(TargetRole, ElementSnapshot), BrowserError> {
    let specs: Vec<WaitSpec> = roles
        .iter()
        .map(|role| {
            let locator = targets.get(*role).clone();
            match role {
                TargetRole::Success => {
                    let text = locator.identifier.clone();
                    WaitSpec::has_text(locator, text)
                }
                TargetRole::IbkeyPromo => WaitSpec::clickable(locator),
                _ => WaitSpec::visible(locator),
            }
        })
        .collect();

    let matched = session.wait_any(&specs, timeout)?;
    let role = targets
        .identify(&matched.element)
        .ok_or_else(|| BrowserError::UnidentifiedTrigger(format!("{:?}", matched.element)))?;
    tracing::debug!("trigger: {role}");
    Ok((role, matched.element))
}
