//! Browser-driver seam for the login engine.
//!
//! The real WebDriver plumbing lives outside this workspace; the engine
//! only needs a small capability surface: open a page, wait for one of
//! several locators to match, fill fields, click, read text, screenshot.
//! [`PageSession`] captures that surface as a mock-injectable trait, and
//! [`Locator`]/[`Targets`] give DOM references a closed, parse-time
//! validated shape.

pub mod error;
pub mod locator;
pub mod session;
pub mod targets;

pub use error::BrowserError;
pub use locator::{Locator, LocatorKind};
pub use session::{
    BrowserOptions, ElementSnapshot, Key, PageSession, SessionFactory, WaitCondition, WaitMatch,
    WaitSpec,
};
pub use targets::{TargetRole, Targets, WebsiteVersion};
