//! Outcome contract shared by every layer above the login engine.

use crate::status::Status;

/// Result of a single login-engine invocation.
///
/// `shutdown` is terminal: once true it must propagate unmodified to the
/// top of the call chain, where it ends the maintenance cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginOutcome {
    pub success: bool,
    pub shutdown: bool,
}

impl LoginOutcome {
    #[must_use]
    pub fn success() -> Self {
        Self {
            success: true,
            shutdown: false,
        }
    }

    #[must_use]
    pub fn failure() -> Self {
        Self {
            success: false,
            shutdown: false,
        }
    }

    #[must_use]
    pub fn shutdown() -> Self {
        Self {
            success: false,
            shutdown: true,
        }
    }
}

/// Result of one authentication pass, carrying the last observed status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOutcome {
    pub success: bool,
    pub shutdown: bool,
    pub status: Status,
}

impl AuthOutcome {
    #[must_use]
    pub fn success(status: Status) -> Self {
        Self {
            success: true,
            shutdown: false,
            status,
        }
    }

    #[must_use]
    pub fn failure(status: Status) -> Self {
        Self {
            success: false,
            shutdown: false,
            status,
        }
    }

    #[must_use]
    pub fn shutdown(status: Status) -> Self {
        Self {
            success: false,
            shutdown: true,
            status,
        }
    }
}
