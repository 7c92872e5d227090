//! Gateway HTTP operations: tickle, validate, logout, reauthenticate.

use std::time::Duration;

use thiserror::Error;

use keepauth_core::Status;

use crate::classify::{status_from_http_code, status_from_transport_error};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("gateway request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("gateway returned unexpected HTTP status: {0}")]
    UnexpectedStatus(u16),

    #[error("failed to build the gateway HTTP client: {0}")]
    Build(reqwest::Error),
}

/// Route set of the gateway HTTP surface, all relative to the base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayRoutes {
    pub tickle: String,
    pub validate: String,
    pub logout: String,
    pub reauthenticate: String,
    pub initialise: String,
}

impl Default for GatewayRoutes {
    fn default() -> Self {
        Self {
            tickle: "/v1/api/tickle".to_string(),
            validate: "/v1/portal/sso/validate".to_string(),
            logout: "/v1/api/logout".to_string(),
            reauthenticate: "/v1/portal/iserver/reauthenticate?force=true".to_string(),
            initialise: "/v1/api/iserver/auth/ssodh/init".to_string(),
        }
    }
}

/// Operations the strategy layer needs from the gateway. Enables mock
/// injection for testing.
pub trait GatewayApi: Send {
    /// Poll the session-status endpoint, retrying failures up to
    /// `max_attempts`. Never fails; failures become partial snapshots.
    fn get_status(&self, max_attempts: u32) -> Status;

    /// Ask the gateway to silently reauthenticate the existing session.
    /// Fire-and-forget: the server completes it asynchronously.
    fn reauthenticate(&self) -> Result<(), ClientError>;

    /// Log the user out while keeping the session. Returns whether the
    /// gateway confirmed the logout.
    fn logout(&self) -> Result<bool, ClientError>;
}

impl<T: GatewayApi + ?Sized + Sync> GatewayApi for &T {
    fn get_status(&self, max_attempts: u32) -> Status {
        (**self).get_status(max_attempts)
    }

    fn reauthenticate(&self) -> Result<(), ClientError> {
        (**self).reauthenticate()
    }

    fn logout(&self) -> Result<bool, ClientError> {
        (**self).logout()
    }
}

impl<T: GatewayApi + ?Sized + Sync> GatewayApi for std::sync::Arc<T> {
    fn get_status(&self, max_attempts: u32) -> Status {
        (**self).get_status(max_attempts)
    }

    fn reauthenticate(&self) -> Result<(), ClientError> {
        (**self).reauthenticate()
    }

    fn logout(&self) -> Result<bool, ClientError> {
        (**self).logout()
    }
}

/// Blocking HTTP client for the gateway.
///
/// The gateway serves over self-signed localhost TLS; certificate
/// verification is toggled rather than wiring a custom trust store.
pub struct GatewayClient {
    base_url: String,
    routes: GatewayRoutes,
    request_timeout: Duration,
    http: reqwest::blocking::Client,
}

impl GatewayClient {
    pub fn new(
        base_url: impl Into<String>,
        routes: GatewayRoutes,
        request_timeout: Duration,
        verify_certificates: bool,
    ) -> Result<Self, ClientError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(request_timeout)
            .danger_accept_invalid_certs(!verify_certificates)
            .build()
            .map_err(ClientError::Build)?;

        Ok(Self {
            base_url: base_url.into(),
            routes,
            request_timeout,
            http,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, route: &str) -> String {
        format!("{}{}", self.base_url, route)
    }

    /// One attempt against the status endpoint, classified into a Status.
    fn tickle_once(&self) -> Status {
        let url = self.url(&self.routes.tickle);
        tracing::debug!("POST {url}");

        let response = match self.http.post(&url).send() {
            Ok(response) => response,
            Err(err) => return status_from_transport_error(&err, self.request_timeout),
        };

        let code = response.status().as_u16();
        let body = response.text().unwrap_or_default();

        if (200..300).contains(&code) {
            let status = Status::from_tickle_body(&body);
            if !status.session {
                tracing::error!("status endpoint reports no active session");
            }
            status
        } else {
            status_from_http_code(code, body.trim())
        }
    }

    /// Whether the current session validates. Works also after logout.
    pub fn validate(&self) -> Result<bool, ClientError> {
        let url = self.url(&self.routes.validate);
        tracing::debug!("GET {url}");
        let response = self.http.get(&url).send()?;
        if !response.status().is_success() {
            return Ok(false);
        }
        let body: serde_json::Value = response.json()?;
        Ok(body
            .get("RESULT")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false))
    }

    /// Initialise a brokerage session after authentication.
    pub fn initialise(&self) -> Result<(), ClientError> {
        let url = self.url(&self.routes.initialise);
        tracing::debug!("POST {url}");
        let response = self.http.post(&url).send()?;
        if !response.status().is_success() {
            return Err(ClientError::UnexpectedStatus(response.status().as_u16()));
        }
        Ok(())
    }
}

impl GatewayApi for GatewayClient {
    fn get_status(&self, max_attempts: u32) -> Status {
        let max_attempts = max_attempts.max(1);
        let mut status = Status::not_running();

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                tracing::info!("status request attempt number {attempt}");
            }
            status = self.tickle_once();
            // a 2xx body, session or not, is a definitive answer
            if status.raw.is_some() {
                return status;
            }
        }

        if max_attempts > 1 {
            tracing::info!(
                "max request retries reached after {max_attempts} attempts. Consider increasing KEEPAUTH_REQUEST_RETRIES."
            );
        }
        status
    }

    fn reauthenticate(&self) -> Result<(), ClientError> {
        let url = self.url(&self.routes.reauthenticate);
        tracing::debug!("POST {url}");
        let response = self.http.post(&url).send()?;
        if !response.status().is_success() {
            return Err(ClientError::UnexpectedStatus(response.status().as_u16()));
        }
        Ok(())
    }

    fn logout(&self) -> Result<bool, ClientError> {
        let url = self.url(&self.routes.logout);
        tracing::debug!("POST {url}");
        let response = self.http.post(&url).send()?;
        let body = response.text()?;
        Ok(body.trim() == r#"{"status":true}"#)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_routes_cover_the_full_surface() {
        let routes = GatewayRoutes::default();
        assert!(routes.tickle.starts_with('/'));
        assert!(routes.reauthenticate.contains("force=true"));
        assert!(routes.validate.contains("validate"));
    }

    #[test]
    fn url_joins_base_and_route() {
        let client = GatewayClient::new(
            "https://localhost:5000",
            GatewayRoutes::default(),
            Duration::from_secs(1),
            false,
        )
        .expect("client builds");
        assert_eq!(
            client.url("/v1/api/tickle"),
            "https://localhost:5000/v1/api/tickle"
        );
    }
}
