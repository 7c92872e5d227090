//! Two-factor capability seam.
//!
//! A handler owns one way of acquiring an out-of-band factor: producing a
//! code to type into the challenge field, or confirming that a push
//! notification was approved. Handlers are selected by configuration name
//! through [`select_handler`]; user-supplied mechanisms slot in behind
//! the same trait.

use std::time::Duration;

use thiserror::Error;

use keepauth_browser::PageSession;

#[derive(Debug, Error)]
pub enum TwoFaError {
    #[error("external 2FA request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("2FA handler misconfigured: {0}")]
    Config(String),
}

/// What a handler produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TwoFaOutcome {
    /// A challenge code to type into the 2FA input field.
    Code(String),
    /// Whether an out-of-band notification was confirmed.
    Notified(bool),
}

/// One pluggable way of completing a two-factor challenge.
///
/// The handler receives the live page session so notification-style
/// mechanisms can interact with the challenge screen directly.
pub trait TwoFaHandler: Send + Sync {
    fn name(&self) -> &str;

    fn acquire(&self, session: &mut dyn PageSession) -> Result<TwoFaOutcome, TwoFaError>;
}

/// Configuration for [`select_handler`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TwoFaSettings {
    /// Handler name; empty means no handler configured.
    pub handler: String,
    pub external_request_method: String,
    pub external_request_url: String,
    pub external_request_timeout: Duration,
}

/// Resolve a configured handler name to an implementation.
///
/// Unknown names are reported and treated as "no handler" — the login
/// engine escalates on its own if a challenge then appears.
pub fn select_handler(
    settings: &TwoFaSettings,
) -> Result<Option<Box<dyn TwoFaHandler>>, TwoFaError> {
    match settings.handler.as_str() {
        "" => Ok(None),
        "EXTERNAL_REQUEST" => Ok(Some(Box::new(ExternalRequestHandler::new(settings)?))),
        other => {
            tracing::error!("unknown 2FA handler name: \"{other}\", no handler will be used");
            Ok(None)
        }
    }
}

/// Fetches the challenge code from an operator-run HTTP endpoint that
/// relays it from the out-of-band channel.
pub struct ExternalRequestHandler {
    method: reqwest::Method,
    url: String,
    http: reqwest::blocking::Client,
}

impl ExternalRequestHandler {
    pub fn new(settings: &TwoFaSettings) -> Result<Self, TwoFaError> {
        if settings.external_request_url.is_empty() {
            return Err(TwoFaError::Config(
                "EXTERNAL_REQUEST handler requires KEEPAUTH_EXTERNAL_REQUEST_URL".to_string(),
            ));
        }
        let method = settings
            .external_request_method
            .parse::<reqwest::Method>()
            .map_err(|_| {
                TwoFaError::Config(format!(
                    "invalid external request method: {}",
                    settings.external_request_method
                ))
            })?;
        let http = reqwest::blocking::Client::builder()
            .timeout(settings.external_request_timeout)
            .build()?;
        Ok(Self {
            method,
            url: settings.external_request_url.clone(),
            http,
        })
    }
}

impl TwoFaHandler for ExternalRequestHandler {
    fn name(&self) -> &str {
        "EXTERNAL_REQUEST"
    }

    fn acquire(&self, _session: &mut dyn PageSession) -> Result<TwoFaOutcome, TwoFaError> {
        let response = self
            .http
            .request(self.method.clone(), &self.url)
            .send()?
            .error_for_status()?;
        let code = response.text()?.trim().to_string();
        Ok(TwoFaOutcome::Code(code))
    }
}

/// Strict challenge-code shape: exactly six ASCII digits.
#[must_use]
pub fn is_valid_strict_code(code: &str) -> bool {
    code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_code_shape() {
        assert!(is_valid_strict_code("123456"));
        assert!(!is_valid_strict_code("12345"));
        assert!(!is_valid_strict_code("1234567"));
        assert!(!is_valid_strict_code("12a456"));
        assert!(!is_valid_strict_code(""));
    }

    #[test]
    fn empty_name_selects_no_handler() {
        let handler = select_handler(&TwoFaSettings::default()).expect("selects");
        assert!(handler.is_none());
    }

    #[test]
    fn unknown_name_selects_no_handler() {
        let settings = TwoFaSettings {
            handler: "CARRIER_PIGEON".to_string(),
            ..TwoFaSettings::default()
        };
        assert!(select_handler(&settings).expect("selects").is_none());
    }

    #[test]
    fn external_request_requires_url() {
        let settings = TwoFaSettings {
            handler: "EXTERNAL_REQUEST".to_string(),
            external_request_method: "GET".to_string(),
            external_request_timeout: Duration::from_secs(300),
            ..TwoFaSettings::default()
        };
        assert!(matches!(
            select_handler(&settings),
            Err(TwoFaError::Config(_))
        ));
    }
}
