//! Environment-driven runtime configuration.
//!
//! Every knob is a `KEEPAUTH_*` variable with a default; locator
//! overrides are validated at load time so a typo fails startup instead
//! of a login attempt.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

use keepauth_browser::{Locator, TargetRole};
use keepauth_client::GatewayRoutes;
use keepauth_core::{Credentials, SubmissionPolicy};
use keepauth_login::{LoginConfig, TwoFaSettings};

use crate::strategy::StrategyConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub routes: GatewayRoutes,
    pub request_timeout: Duration,
    pub request_retries: u32,
    pub verify_certificates: bool,

    pub gateway_dir: Option<PathBuf>,
    pub gateway_process_match: String,
    pub gateway_startup: Duration,
    pub spawn_new_processes: bool,

    pub maintenance_interval: Duration,
    pub start_active: bool,
    pub health_server_port: u16,

    pub strategy: StrategyConfig,
    pub login: LoginConfig,
    pub two_fa: TwoFaSettings,

    pub webdriver_url: String,
    pub headless: bool,
    pub incognito: bool,
    pub ui_scaling: f64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let base_url = env_str("KEEPAUTH_GATEWAY_BASE_URL", "https://localhost:5000");
        let route_auth = env_str("KEEPAUTH_ROUTE_AUTH", "/sso/Login?forwardTo=22&RL=1&ip2loc=on");

        let routes = GatewayRoutes {
            tickle: env_str("KEEPAUTH_ROUTE_TICKLE", "/v1/api/tickle"),
            validate: env_str("KEEPAUTH_ROUTE_VALIDATE", "/v1/portal/sso/validate"),
            logout: env_str("KEEPAUTH_ROUTE_LOGOUT", "/v1/api/logout"),
            reauthenticate: env_str(
                "KEEPAUTH_ROUTE_REAUTHENTICATE",
                "/v1/portal/iserver/reauthenticate?force=true",
            ),
            initialise: env_str("KEEPAUTH_ROUTE_INITIALISE", "/v1/api/iserver/auth/ssodh/init"),
        };

        let strategy = StrategyConfig {
            strategy: env_str("KEEPAUTH_AUTHENTICATION_STRATEGY", "A"),
            request_retries: env_u32("KEEPAUTH_REQUEST_RETRIES", 1)?,
            reauthenticate_wait: env_secs("KEEPAUTH_REAUTHENTICATE_WAIT", 0)?,
            restart_failed_sessions: env_bool("KEEPAUTH_RESTART_FAILED_SESSIONS", true)?,
            restart_wait: env_secs("KEEPAUTH_RESTART_WAIT", 15)?,
            max_reauthenticate_retries: env_u32("KEEPAUTH_MAX_REAUTHENTICATE_RETRIES", 3)?,
            max_status_check_retries: env_u32("KEEPAUTH_MAX_STATUS_CHECK_RETRIES", 15)?,
        };

        let policy = SubmissionPolicy {
            min_presubmit_buffer: env_secs("KEEPAUTH_MIN_PRESUBMIT_BUFFER", 0)?,
            max_presubmit_buffer: env_secs("KEEPAUTH_MAX_PRESUBMIT_BUFFER", 30)?,
            presubmit_step: env_secs("KEEPAUTH_PRESUBMIT_STEP", 5)?,
            max_failed_auth: env_u32("KEEPAUTH_MAX_FAILED_AUTH", 8)?,
        };

        let login = LoginConfig {
            auth_url: format!("{base_url}{route_auth}"),
            two_fa_select_target: env_str("KEEPAUTH_TWO_FA_SELECT_TARGET", "IB Key"),
            strict_two_fa_code: env_bool("KEEPAUTH_STRICT_TWO_FA_CODE", true)?,
            max_immediate_attempts: env_u32("KEEPAUTH_MAX_IMMEDIATE_ATTEMPTS", 1)?,
            element_wait_timeout: env_secs("KEEPAUTH_ELEMENT_WAIT_TIMEOUT", 15)?,
            page_load_timeout: env_secs("KEEPAUTH_PAGE_LOAD_TIMEOUT", 15)?,
            version_probe_timeout: env_secs("KEEPAUTH_VERSION_PROBE_TIMEOUT", 5)?,
            policy,
            outputs_dir: PathBuf::from(env_str("KEEPAUTH_OUTPUTS_DIR", "outputs")),
            error_screenshots: env_bool("KEEPAUTH_ERROR_SCREENSHOTS", true)?,
            target_overrides: target_overrides_from_env()?,
        };

        let two_fa = TwoFaSettings {
            handler: env_str("KEEPAUTH_TWO_FA_HANDLER", ""),
            external_request_method: env_str("KEEPAUTH_EXTERNAL_REQUEST_METHOD", "GET"),
            external_request_url: env_str("KEEPAUTH_EXTERNAL_REQUEST_URL", ""),
            external_request_timeout: env_secs("KEEPAUTH_EXTERNAL_REQUEST_TIMEOUT", 300)?,
        };

        Ok(Self {
            base_url,
            routes,
            request_timeout: env_secs("KEEPAUTH_REQUEST_TIMEOUT", 15)?,
            request_retries: strategy.request_retries,
            verify_certificates: env_bool("KEEPAUTH_VERIFY_CERTIFICATES", false)?,

            gateway_dir: std::env::var("KEEPAUTH_GATEWAY_DIR").ok().map(PathBuf::from),
            gateway_process_match: env_str(
                "KEEPAUTH_GATEWAY_PROCESS_MATCH",
                "ibgroup.web.core.clientportal.gw.GatewayStart",
            ),
            gateway_startup: env_secs("KEEPAUTH_GATEWAY_STARTUP", 3)?,
            spawn_new_processes: env_bool("KEEPAUTH_SPAWN_NEW_PROCESSES", true)?,

            maintenance_interval: env_secs("KEEPAUTH_MAINTENANCE_INTERVAL", 60)?,
            start_active: env_bool("KEEPAUTH_START_ACTIVE", true)?,
            health_server_port: env_u32("KEEPAUTH_HEALTH_SERVER_PORT", 5001)? as u16,

            strategy,
            login,
            two_fa,

            webdriver_url: env_str("KEEPAUTH_WEBDRIVER_URL", "http://localhost:9515"),
            headless: env_bool("KEEPAUTH_HEADLESS", true)?,
            incognito: env_bool("KEEPAUTH_INCOGNITO", true)?,
            ui_scaling: env_str("KEEPAUTH_UI_SCALING", "1.0")
                .parse::<f64>()
                .context("KEEPAUTH_UI_SCALING must be a number")?,
        })
    }

    /// Credentials are loaded once and held for the process lifetime.
    pub fn credentials() -> anyhow::Result<Credentials> {
        let account =
            std::env::var("KEEPAUTH_ACCOUNT").context("KEEPAUTH_ACCOUNT must be set")?;
        let password =
            std::env::var("KEEPAUTH_PASSWORD").context("KEEPAUTH_PASSWORD must be set")?;
        let key = std::env::var("KEEPAUTH_KEY").ok().filter(|k| !k.is_empty());
        Ok(Credentials::new(account, password, key))
    }
}

/// Per-role locator override variables, e.g.
/// `KEEPAUTH_TARGET_USER_NAME=NAME@@login_field`.
fn target_overrides_from_env() -> anyhow::Result<BTreeMap<TargetRole, Locator>> {
    const ROLES: [(TargetRole, &str); 10] = [
        (TargetRole::UserName, "KEEPAUTH_TARGET_USER_NAME"),
        (TargetRole::Password, "KEEPAUTH_TARGET_PASSWORD"),
        (TargetRole::Submit, "KEEPAUTH_TARGET_SUBMIT"),
        (TargetRole::Error, "KEEPAUTH_TARGET_ERROR"),
        (TargetRole::Success, "KEEPAUTH_TARGET_SUCCESS"),
        (TargetRole::TwoFa, "KEEPAUTH_TARGET_TWO_FA"),
        (TargetRole::TwoFaSelect, "KEEPAUTH_TARGET_TWO_FA_SELECT"),
        (
            TargetRole::TwoFaNotification,
            "KEEPAUTH_TARGET_TWO_FA_NOTIFICATION",
        ),
        (TargetRole::TwoFaInput, "KEEPAUTH_TARGET_TWO_FA_INPUT"),
        (TargetRole::IbkeyPromo, "KEEPAUTH_TARGET_IBKEY_PROMO"),
    ];

    let mut overrides = BTreeMap::new();
    for (role, var) in ROLES {
        if let Ok(raw) = std::env::var(var)
            && !raw.is_empty()
        {
            let locator = raw
                .parse::<Locator>()
                .with_context(|| format!("invalid locator in {var}"))?;
            overrides.insert(role, locator);
        }
    }
    Ok(overrides)
}

fn env_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u32(key: &str, default: u32) -> anyhow::Result<u32> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<u32>()
            .with_context(|| format!("{key} must be a non-negative integer")),
        Err(_) => Ok(default),
    }
}

fn env_secs(key: &str, default: u64) -> anyhow::Result<Duration> {
    match std::env::var(key) {
        Ok(raw) => {
            let secs = raw
                .parse::<u64>()
                .with_context(|| format!("{key} must be a number of seconds"))?;
            Ok(Duration::from_secs(secs))
        }
        Err(_) => Ok(Duration::from_secs(default)),
    }
}

fn env_bool(key: &str, default: bool) -> anyhow::Result<bool> {
    match std::env::var(key) {
        Ok(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            _ => anyhow::bail!("{key} must be a boolean, got: {raw}"),
        },
        Err(_) => Ok(default),
    }
}
