//! Poll failure classification.
//!
//! Turns HTTP response codes and transport errors into partial status
//! snapshots. Classification is deliberately conservative: anything
//! unrecognised is reported as "running but unhealthy" so the strategy
//! layer retries next cycle instead of the process crashing.

use std::time::Duration;

use keepauth_core::Status;

/// Interpret a non-2xx HTTP code from the status endpoint.
#[must_use]
pub fn status_from_http_code(code: u16, body: &str) -> Status {
    match code {
        // expected while no session exists, not worth logging
        401 => Status::no_session(),
        500 => {
            tracing::error!(
                "upstream server error ({code}): \"{body}\". One known cause is an upstream server restart."
            );
            Status::no_session()
        }
        503 => {
            tracing::error!(
                "upstream service unavailable ({code}): \"{body}\". The servers may not be ready to handle requests yet."
            );
            Status::no_session()
        }
        _ => {
            tracing::warn!("unrecognised HTTP error from the status endpoint: {code} \"{body}\"");
            Status::no_session()
        }
    }
}

/// Interpret a transport-level failure of the status request.
#[must_use]
pub fn status_from_transport_error(err: &reqwest::Error, request_timeout: Duration) -> Status {
    if err.is_timeout() {
        tracing::error!(
            "connection timeout after {request_timeout:?}. Consider increasing KEEPAUTH_REQUEST_TIMEOUT. Error: {err}"
        );
        return Status {
            running: true,
            ..Status::default()
        };
    }

    match io_error_kind(err) {
        Some(std::io::ErrorKind::ConnectionRefused | std::io::ErrorKind::AddrNotAvailable) => {
            // the port is simply not open yet, expected during startup
            Status::not_running()
        }
        Some(std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::ConnectionAborted) => {
            tracing::error!(
                "connection to the gateway was forcibly closed by the remote host. Something is closing the gateway process."
            );
            Status::not_running()
        }
        _ if err.is_connect() => {
            // connect-phase failure without a recognisable io kind
            Status::not_running()
        }
        _ => {
            tracing::warn!("unrecognised transport error from the status endpoint: {err}");
            Status {
                running: true,
                ..Status::default()
            }
        }
    }
}

/// Walk the error's source chain looking for the underlying io kind.
fn io_error_kind(err: &(dyn std::error::Error + 'static)) -> Option<std::io::ErrorKind> {
    let mut source = err.source();
    while let Some(inner) = source {
        if let Some(io) = inner.downcast_ref::<std::io::Error>() {
            return Some(io.kind());
        }
        source = inner.source();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use keepauth_core::ParsedStatus;

    #[test]
    fn http_401_is_running_without_session() {
        let status = status_from_http_code(401, "");
        assert!(status.running);
        assert!(!status.session);
        assert_eq!(status.parsed(), ParsedStatus::NoSession);
    }

    #[test]
    fn http_500_and_503_force_no_session() {
        for code in [500, 503] {
            let status = status_from_http_code(code, "Internal Server Error");
            assert!(status.running);
            assert!(!status.session);
        }
    }

    #[test]
    fn unknown_http_code_is_conservative() {
        let status = status_from_http_code(418, "teapot");
        assert!(status.running);
        assert!(!status.session);
        assert!(!status.authenticated);
    }
}
