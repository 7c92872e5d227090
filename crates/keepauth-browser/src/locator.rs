//! Typed DOM locators.
//!
//! Locators arrive from configuration as `KIND@@identifier` strings and
//! are validated at parse time into a closed tagged union — a bad kind is
//! a startup error, not a runtime lookup surprise.

use std::str::FromStr;

use thiserror::Error;

use crate::session::ElementSnapshot;

/// How an element is looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocatorKind {
    Id,
    Css,
    Class,
    Name,
    /// Visible text matched across a few well-known container tags.
    TagText,
}

impl LocatorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocatorKind::Id => "ID",
            LocatorKind::Css => "CSS_SELECTOR",
            LocatorKind::Class => "CLASS_NAME",
            LocatorKind::Name => "NAME",
            LocatorKind::TagText => "TAG_NAME",
        }
    }
}

/// A single DOM reference: lookup kind plus identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator {
    pub kind: LocatorKind,
    pub identifier: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LocatorParseError {
    #[error("locator must be KIND@@identifier, got: {0}")]
    MissingSeparator(String),

    #[error("unknown locator kind: {0}")]
    UnknownKind(String),

    #[error("empty locator identifier in: {0}")]
    EmptyIdentifier(String),
}

impl Locator {
    #[must_use]
    pub fn new(kind: LocatorKind, identifier: impl Into<String>) -> Self {
        Self {
            kind,
            identifier: identifier.into(),
        }
    }

    /// Whether a matched element snapshot belongs to this locator.
    ///
    /// Used to identify which of several simultaneously-awaited locators
    /// actually fired.
    #[must_use]
    pub fn matches(&self, element: &ElementSnapshot) -> bool {
        match self.kind {
            LocatorKind::Id => element
                .id
                .as_deref()
                .is_some_and(|id| id.contains(&self.identifier)),
            LocatorKind::Name => element
                .name
                .as_deref()
                .is_some_and(|name| name.contains(&self.identifier)),
            LocatorKind::Class => element
                .class
                .as_deref()
                .is_some_and(|class| class.contains(&self.identifier)),
            LocatorKind::Css => {
                // a class-list selector like `.btn.btn-lg` matched against
                // the element's space-separated class attribute
                let wanted = self.identifier.replace('.', " ");
                let wanted = wanted.trim();
                element
                    .class
                    .as_deref()
                    .is_some_and(|class| class.contains(wanted))
            }
            LocatorKind::TagText => element.text.contains(&self.identifier),
        }
    }
}

impl FromStr for Locator {
    type Err = LocatorParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (kind, identifier) = raw
            .split_once("@@")
            .ok_or_else(|| LocatorParseError::MissingSeparator(raw.to_string()))?;
        let kind = match kind {
            "ID" => LocatorKind::Id,
            "CSS_SELECTOR" => LocatorKind::Css,
            "CLASS_NAME" => LocatorKind::Class,
            "NAME" => LocatorKind::Name,
            "TAG_NAME" => LocatorKind::TagText,
            other => return Err(LocatorParseError::UnknownKind(other.to_string())),
        };
        if identifier.is_empty() {
            return Err(LocatorParseError::EmptyIdentifier(raw.to_string()));
        }
        Ok(Locator::new(kind, identifier))
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@@{}", self.kind.as_str(), self.identifier)
    }
}
