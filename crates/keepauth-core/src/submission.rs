//! Adaptive submission state for the login engine.
//!
//! Two counters survive across login attempts and maintenance cycles:
//!
//! - **Presubmit buffer**: a delay inserted before submitting the login
//!   form, bounded to `[min, max]`. Grows by a fixed step on the
//!   wrong-credentials error and resets to the minimum on success.
//! - **Failed-attempt counter**: increments on credential-rejection
//!   errors, resets on success. Reaching the configured ceiling requests
//!   a daemon shutdown, trading availability against an upstream account
//!   lockout.
//!
//! Pure state machine: the engine owns an instance and applies updates;
//! no ambient globals.

use std::time::Duration;

/// The exact banner text the upstream shows on rejected credentials.
pub const WRONG_CREDENTIALS_TEXT: &str = "Invalid username password combination";

/// Bounds and thresholds for [`SubmissionState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionPolicy {
    /// Lower bound (and reset value) of the presubmit buffer.
    pub min_presubmit_buffer: Duration,
    /// Upper bound of the presubmit buffer.
    pub max_presubmit_buffer: Duration,
    /// Step the buffer grows by on a wrong-credentials error.
    pub presubmit_step: Duration,
    /// Failed-attempt ceiling. Zero disables the lockout guard.
    pub max_failed_auth: u32,
}

impl Default for SubmissionPolicy {
    fn default() -> Self {
        Self {
            min_presubmit_buffer: Duration::ZERO,
            max_presubmit_buffer: Duration::from_secs(30),
            presubmit_step: Duration::from_secs(5),
            max_failed_auth: 8,
        }
    }
}

/// Classification of a login error banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The wrong-credentials banner. Grows the buffer and counts towards
    /// the lockout guard.
    WrongCredentials,
    /// The bare "failed" banner. Counts towards the lockout guard.
    Failed,
    /// Any other banner text.
    Other,
}

/// Classify a displayed error banner by its exact text.
#[must_use]
pub fn classify_error_text(text: &str) -> ErrorClass {
    if text == WRONG_CREDENTIALS_TEXT {
        ErrorClass::WrongCredentials
    } else if text == "failed" {
        ErrorClass::Failed
    } else {
        ErrorClass::Other
    }
}

/// Result of applying one error observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionUpdate {
    /// The buffer grew in this update.
    pub buffer_grown: bool,
    /// The buffer is pinned at the configured maximum.
    pub buffer_at_max: bool,
    /// The failed-attempt ceiling was reached; the caller must shut down.
    pub lockout: bool,
}

/// Counters owned by a single login engine instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionState {
    presubmit_buffer: Duration,
    failed_attempts: u32,
}

impl SubmissionState {
    #[must_use]
    pub fn new(policy: &SubmissionPolicy) -> Self {
        Self {
            presubmit_buffer: policy.min_presubmit_buffer,
            failed_attempts: 0,
        }
    }

    /// Current presubmit delay.
    #[must_use]
    pub fn presubmit_buffer(&self) -> Duration {
        self.presubmit_buffer
    }

    /// Current failed-attempt count.
    #[must_use]
    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    /// Apply one observed error banner.
    #[must_use]
    pub fn record_error(&mut self, class: ErrorClass, policy: &SubmissionPolicy) -> SubmissionUpdate {
        let mut update = SubmissionUpdate {
            buffer_grown: false,
            buffer_at_max: false,
            lockout: false,
        };

        if class == ErrorClass::WrongCredentials && self.presubmit_buffer < policy.max_presubmit_buffer
        {
            self.presubmit_buffer = (self.presubmit_buffer + policy.presubmit_step)
                .min(policy.max_presubmit_buffer);
            update.buffer_grown = true;
            update.buffer_at_max = self.presubmit_buffer >= policy.max_presubmit_buffer;
        }

        if matches!(class, ErrorClass::WrongCredentials | ErrorClass::Failed)
            && policy.max_failed_auth > 0
        {
            self.failed_attempts = self.failed_attempts.saturating_add(1);
            if self.failed_attempts >= policy.max_failed_auth {
                update.lockout = true;
            }
        }

        update
    }

    /// Reset both counters after a successful login.
    pub fn record_success(&mut self, policy: &SubmissionPolicy) {
        self.failed_attempts = 0;
        self.presubmit_buffer = policy.min_presubmit_buffer;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> SubmissionPolicy {
        SubmissionPolicy {
            min_presubmit_buffer: Duration::from_secs(5),
            max_presubmit_buffer: Duration::from_secs(30),
            presubmit_step: Duration::from_secs(5),
            max_failed_auth: 3,
        }
    }

    #[test]
    fn buffer_grows_by_step_on_wrong_credentials() {
        let policy = policy();
        let mut state = SubmissionState::new(&policy);
        assert_eq!(state.presubmit_buffer(), Duration::from_secs(5));

        let update = state.record_error(ErrorClass::WrongCredentials, &policy);
        assert!(update.buffer_grown);
        assert!(!update.buffer_at_max);
        assert_eq!(state.presubmit_buffer(), Duration::from_secs(10));
    }

    #[test]
    fn buffer_never_exceeds_max() {
        let policy = policy();
        let mut state = SubmissionState::new(&policy);
        for _ in 0..10 {
            let _ = state.record_error(ErrorClass::WrongCredentials, &policy);
        }
        assert_eq!(state.presubmit_buffer(), policy.max_presubmit_buffer);
    }

    #[test]
    fn buffer_only_grows_on_wrong_credentials() {
        let policy = policy();
        let mut state = SubmissionState::new(&policy);
        let _ = state.record_error(ErrorClass::Failed, &policy);
        let _ = state.record_error(ErrorClass::Other, &policy);
        assert_eq!(state.presubmit_buffer(), policy.min_presubmit_buffer);
    }

    #[test]
    fn success_resets_to_minimum() {
        let policy = policy();
        let mut state = SubmissionState::new(&policy);
        let _ = state.record_error(ErrorClass::WrongCredentials, &policy);
        let _ = state.record_error(ErrorClass::WrongCredentials, &policy);
        state.record_success(&policy);
        assert_eq!(state.presubmit_buffer(), policy.min_presubmit_buffer);
        assert_eq!(state.failed_attempts(), 0);
    }

    #[test]
    fn lockout_fires_exactly_at_ceiling() {
        let policy = policy();
        let mut state = SubmissionState::new(&policy);
        assert!(!state.record_error(ErrorClass::Failed, &policy).lockout);
        assert!(!state.record_error(ErrorClass::WrongCredentials, &policy).lockout);
        assert!(state.record_error(ErrorClass::Failed, &policy).lockout);
    }

    #[test]
    fn other_errors_do_not_count_towards_lockout() {
        let policy = policy();
        let mut state = SubmissionState::new(&policy);
        for _ in 0..10 {
            assert!(!state.record_error(ErrorClass::Other, &policy).lockout);
        }
        assert_eq!(state.failed_attempts(), 0);
    }

    #[test]
    fn zero_ceiling_disables_lockout_guard() {
        let policy = SubmissionPolicy {
            max_failed_auth: 0,
            ..policy()
        };
        let mut state = SubmissionState::new(&policy);
        for _ in 0..10 {
            assert!(!state.record_error(ErrorClass::Failed, &policy).lockout);
        }
    }

    #[test]
    fn classifies_exact_banner_texts() {
        assert_eq!(
            classify_error_text("Invalid username password combination"),
            ErrorClass::WrongCredentials
        );
        assert_eq!(classify_error_text("failed"), ErrorClass::Failed);
        assert_eq!(classify_error_text("Server error"), ErrorClass::Other);
    }
}
