//! Exit conditions for repeated status-check loops.
//!
//! Each condition answers one question: given this snapshot, is there any
//! point in polling again? Both the happy case (target reached) and the
//! unhappy cases (gateway gone, session gone) are terminal; retrying a
//! poll cannot fix either.

use crate::status::Status;

/// Condition a repeated status-check loop polls towards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCondition {
    /// Stop once the session is authenticated.
    AuthenticatedTrue,
    /// Stop once the session is fully logged out.
    LoggedOut,
    /// Stop once the session is authenticated, connected and not competing.
    NotCompeting,
}

impl StatusCondition {
    /// Whether the loop should stop polling on this snapshot.
    #[must_use]
    pub fn is_met(&self, status: &Status) -> bool {
        match self {
            StatusCondition::AuthenticatedTrue => {
                if !status.running || !status.session {
                    return true;
                }
                status.authenticated
            }
            StatusCondition::LoggedOut => {
                if !status.running || !status.session || status.competing {
                    return true;
                }
                !status.connected && !status.authenticated
            }
            StatusCondition::NotCompeting => {
                if !status.running || !status.session {
                    return true;
                }
                !status.competing && status.connected && status.authenticated
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healthy() -> Status {
        Status {
            running: true,
            session: true,
            connected: true,
            authenticated: true,
            ..Status::default()
        }
    }

    #[test]
    fn authenticated_true_terminal_cases() {
        let cond = StatusCondition::AuthenticatedTrue;
        assert!(cond.is_met(&Status::not_running()));
        assert!(cond.is_met(&Status::no_session()));
        assert!(cond.is_met(&healthy()));

        let pending = Status {
            running: true,
            session: true,
            connected: true,
            ..Status::default()
        };
        assert!(!cond.is_met(&pending));
    }

    #[test]
    fn logged_out_terminal_cases() {
        let cond = StatusCondition::LoggedOut;
        assert!(cond.is_met(&Status::not_running()));
        assert!(cond.is_met(&Status::no_session()));

        let competing = Status {
            competing: true,
            ..healthy()
        };
        assert!(cond.is_met(&competing));

        let logged_out = Status {
            running: true,
            session: true,
            ..Status::default()
        };
        assert!(cond.is_met(&logged_out));

        // still connected, keep polling
        let draining = Status {
            running: true,
            session: true,
            connected: true,
            ..Status::default()
        };
        assert!(!cond.is_met(&draining));
    }

    #[test]
    fn not_competing_terminal_cases() {
        let cond = StatusCondition::NotCompeting;
        assert!(cond.is_met(&Status::not_running()));
        assert!(cond.is_met(&Status::no_session()));
        assert!(cond.is_met(&healthy()));

        let competing = Status {
            competing: true,
            ..healthy()
        };
        assert!(!cond.is_met(&competing));
    }
}
