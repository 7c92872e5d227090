//! Liveness/readiness endpoint for an external process supervisor.
//!
//! `GET /livez` answers 500 once an internal shutdown was requested, and
//! `GET /readyz` answers 503 unless the gateway session is authenticated.
//! The readiness check is an independent read-only poll against the same
//! remote endpoint the scheduler polls; interleaving is safe because a
//! status snapshot is immutable.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::watch;

use keepauth_client::GatewayApi;

#[derive(Clone)]
pub struct HealthState {
    pub shutdown_requested: Arc<AtomicBool>,
    pub gateway: Arc<dyn GatewayApi + Send + Sync>,
}

pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/livez", get(livez))
        .route("/readyz", get(readyz))
        .with_state(state)
}

/// Serve the health endpoint until the shutdown channel fires.
pub async fn serve(
    listener: TcpListener,
    state: HealthState,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let app = router(state);
    tracing::info!("health server listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await?;
    Ok(())
}

async fn livez(State(state): State<HealthState>) -> (StatusCode, &'static str) {
    if state.shutdown_requested.load(Ordering::SeqCst) {
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Error")
    } else {
        (StatusCode::OK, "OK")
    }
}

async fn readyz(State(state): State<HealthState>) -> (StatusCode, &'static str) {
    let gateway = Arc::clone(&state.gateway);
    let status = tokio::task::spawn_blocking(move || gateway.get_status(1)).await;

    match status {
        Ok(status) if status.authenticated => (StatusCode::OK, "OK"),
        Ok(_) => (StatusCode::SERVICE_UNAVAILABLE, "Not Ready"),
        Err(err) => {
            tracing::warn!("readiness poll task failed: {err}");
            (StatusCode::SERVICE_UNAVAILABLE, "Not Ready")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use keepauth_client::ClientError;
    use keepauth_core::Status;

    struct FixedGateway {
        status: Status,
    }

    impl GatewayApi for FixedGateway {
        fn get_status(&self, _max_attempts: u32) -> Status {
            self.status.clone()
        }

        fn reauthenticate(&self) -> Result<(), ClientError> {
            Ok(())
        }

        fn logout(&self) -> Result<bool, ClientError> {
            Ok(true)
        }
    }

    fn state(status: Status, shutdown: bool) -> HealthState {
        HealthState {
            shutdown_requested: Arc::new(AtomicBool::new(shutdown)),
            gateway: Arc::new(FixedGateway { status }),
        }
    }

    #[tokio::test]
    async fn livez_flips_to_500_on_shutdown() {
        let (code, _) = livez(State(state(Status::not_running(), false))).await;
        assert_eq!(code, StatusCode::OK);

        let (code, _) = livez(State(state(Status::not_running(), true))).await;
        assert_eq!(code, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn readyz_tracks_authentication() {
        let authenticated = Status {
            running: true,
            session: true,
            connected: true,
            authenticated: true,
            ..Status::default()
        };
        let (code, _) = readyz(State(state(authenticated, false))).await;
        assert_eq!(code, StatusCode::OK);

        let (code, _) = readyz(State(state(Status::no_session(), false))).await;
        assert_eq!(code, StatusCode::SERVICE_UNAVAILABLE);
    }
}
