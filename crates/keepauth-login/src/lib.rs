//! Credential-submission state machine for the gateway's auth webpage.
//!
//! [`LoginEngine::login`] drives one bounded batch of login attempts
//! through a [`PageSession`], including two-factor sub-flows, the
//! adaptive presubmit delay and the lockout-prevention counter.
//!
//! [`PageSession`]: keepauth_browser::PageSession

pub mod engine;
pub mod secret;
pub mod two_fa;

pub use engine::{LoginConfig, LoginEngine};
pub use two_fa::{TwoFaError, TwoFaHandler, TwoFaOutcome, TwoFaSettings, select_handler};
