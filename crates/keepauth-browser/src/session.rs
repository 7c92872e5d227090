//! The browser session capability trait.
//!
//! Modeled as a synchronous trait driven from a blocking task: every wait
//! carries an explicit timeout, and the session is opened and released
//! within the scope of a single login call.

use std::path::Path;
use std::time::Duration;

use crate::error::BrowserError;
use crate::locator::Locator;

/// Attribute snapshot of a matched element, taken at match time so the
/// engine can identify and log triggers without further driver calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementSnapshot {
    pub id: Option<String>,
    pub class: Option<String>,
    pub name: Option<String>,
    pub text: String,
}

/// Condition a [`WaitSpec`] polls for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitCondition {
    Visible,
    Clickable,
    /// The locator's element contains this text.
    HasText(String),
}

/// One branch of a multi-condition wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitSpec {
    pub locator: Locator,
    pub condition: WaitCondition,
}

impl WaitSpec {
    #[must_use]
    pub fn visible(locator: Locator) -> Self {
        Self {
            locator,
            condition: WaitCondition::Visible,
        }
    }

    #[must_use]
    pub fn clickable(locator: Locator) -> Self {
        Self {
            locator,
            condition: WaitCondition::Clickable,
        }
    }

    #[must_use]
    pub fn has_text(locator: Locator, text: impl Into<String>) -> Self {
        Self {
            locator,
            condition: WaitCondition::HasText(text.into()),
        }
    }
}

/// First spec to become true during a [`PageSession::wait_any`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitMatch {
    /// Index into the spec slice that fired.
    pub index: usize,
    pub element: ElementSnapshot,
}

/// Keys the login flow sends beyond plain text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Tab,
    Enter,
}

/// One live browser page. Enables mock injection for testing.
pub trait PageSession: Send {
    fn navigate(&mut self, url: &str) -> Result<(), BrowserError>;

    fn refresh(&mut self) -> Result<(), BrowserError>;

    /// Block until the first of `specs` becomes true, up to `timeout`.
    fn wait_any(&mut self, specs: &[WaitSpec], timeout: Duration)
    -> Result<WaitMatch, BrowserError>;

    /// Block until the locator's element is present in the DOM.
    fn wait_present(&mut self, locator: &Locator, timeout: Duration) -> Result<(), BrowserError>;

    fn clear_and_type(&mut self, locator: &Locator, text: &str) -> Result<(), BrowserError>;

    fn press(&mut self, locator: &Locator, key: Key) -> Result<(), BrowserError>;

    fn click(&mut self, locator: &Locator) -> Result<(), BrowserError>;

    fn select_by_visible_text(&mut self, locator: &Locator, text: &str)
    -> Result<(), BrowserError>;

    fn read_text(&mut self, locator: &Locator) -> Result<String, BrowserError>;

    fn save_screenshot(&mut self, path: &Path) -> Result<(), BrowserError>;

    /// Release the session and any virtual display. Must be infallible;
    /// called on every exit path.
    fn close(&mut self);
}

/// Options for opening a new session.
#[derive(Debug, Clone, PartialEq)]
pub struct BrowserOptions {
    pub headless: bool,
    /// Incognito lets the 2FA method be selected fresh on every login.
    pub incognito: bool,
    pub ui_scaling: f64,
    pub page_load_timeout: Duration,
    pub user_data_dir: Option<String>,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: true,
            incognito: true,
            ui_scaling: 1.0,
            page_load_timeout: Duration::from_secs(15),
            user_data_dir: None,
        }
    }
}

/// Creates sessions. The production factory wraps the external WebDriver
/// collaborator; tests provide scripted sessions.
pub trait SessionFactory: Send + Sync {
    fn open(&self) -> Result<Box<dyn PageSession>, BrowserError>;
}
