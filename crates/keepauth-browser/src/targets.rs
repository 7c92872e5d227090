//! Role-to-locator resolution for the auth webpage.
//!
//! The upstream serves one of two website layouts; the username and error
//! locators differ between them. A resolved [`Targets`] set maps logical
//! roles to concrete locators for the detected version, with explicit
//! configuration overrides taking precedence (logged, since an override
//! that fights the detected layout is usually a stale config).

use std::collections::BTreeMap;

use crate::locator::{Locator, LocatorKind};
use crate::session::ElementSnapshot;

/// Logical roles the login flow interacts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TargetRole {
    UserName,
    Password,
    Submit,
    Error,
    Success,
    TwoFa,
    TwoFaSelect,
    TwoFaNotification,
    TwoFaInput,
    IbkeyPromo,
}

impl TargetRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetRole::UserName => "USER_NAME",
            TargetRole::Password => "PASSWORD",
            TargetRole::Submit => "SUBMIT",
            TargetRole::Error => "ERROR",
            TargetRole::Success => "SUCCESS",
            TargetRole::TwoFa => "TWO_FA",
            TargetRole::TwoFaSelect => "TWO_FA_SELECT",
            TargetRole::TwoFaNotification => "TWO_FA_NOTIFICATION",
            TargetRole::TwoFaInput => "TWO_FA_INPUT",
            TargetRole::IbkeyPromo => "IBKEY_PROMO",
        }
    }

    /// All roles, in trigger-identification priority order.
    ///
    /// More specific roles come first: the error banner and 2FA fields
    /// carry distinctive ids/classes, while the success role matches by
    /// text and would shadow nothing.
    pub const IDENTIFY_ORDER: [TargetRole; 6] = [
        TargetRole::TwoFa,
        TargetRole::TwoFaSelect,
        TargetRole::TwoFaNotification,
        TargetRole::Error,
        TargetRole::IbkeyPromo,
        TargetRole::Success,
    ];
}

impl std::fmt::Display for TargetRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detected auth webpage layout version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebsiteVersion {
    /// Layout served until March 2023.
    V1,
    /// Layout served from March 2023.
    V2,
}

impl WebsiteVersion {
    /// Username field probed for during version detection.
    #[must_use]
    pub fn user_name_locator(&self) -> Locator {
        match self {
            WebsiteVersion::V1 => Locator::new(LocatorKind::Name, "user_name"),
            WebsiteVersion::V2 => Locator::new(LocatorKind::Name, "username"),
        }
    }

    /// Error banner locator for this layout.
    #[must_use]
    pub fn error_locator(&self) -> Locator {
        match self {
            WebsiteVersion::V1 => {
                Locator::new(LocatorKind::Css, ".alert.alert-danger.margin-top-10")
            }
            WebsiteVersion::V2 => Locator::new(LocatorKind::Class, "xyz-errormessage"),
        }
    }
}

impl std::fmt::Display for WebsiteVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WebsiteVersion::V1 => f.write_str("1"),
            WebsiteVersion::V2 => f.write_str("2"),
        }
    }
}

/// Resolved role→locator set for one login run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Targets {
    map: BTreeMap<TargetRole, Locator>,
}

impl Targets {
    /// Version-independent defaults.
    fn defaults() -> BTreeMap<TargetRole, Locator> {
        let mut map = BTreeMap::new();
        map.insert(TargetRole::Password, Locator::new(LocatorKind::Name, "password"));
        map.insert(
            TargetRole::Submit,
            Locator::new(LocatorKind::Css, ".btn.btn-lg.btn-primary"),
        );
        map.insert(
            TargetRole::Success,
            Locator::new(LocatorKind::TagText, "Client login succeeds"),
        );
        map.insert(TargetRole::TwoFa, Locator::new(LocatorKind::Id, "twofactbase"));
        map.insert(
            TargetRole::TwoFaNotification,
            Locator::new(LocatorKind::Class, "login-step-notification"),
        );
        map.insert(TargetRole::TwoFaInput, Locator::new(LocatorKind::Id, "chlginput"));
        map.insert(TargetRole::TwoFaSelect, Locator::new(LocatorKind::Id, "sf_select"));
        map.insert(
            TargetRole::IbkeyPromo,
            Locator::new(LocatorKind::Class, "ibkey-promo-skip"),
        );
        map
    }

    /// Resolve the target set for a detected website version, applying
    /// explicit overrides on top. Overrides that disagree with the
    /// version-derived locator are kept but logged.
    #[must_use]
    pub fn resolve(version: WebsiteVersion, overrides: &BTreeMap<TargetRole, Locator>) -> Self {
        let mut map = Self::defaults();
        map.insert(TargetRole::UserName, version.user_name_locator());
        map.insert(TargetRole::Error, version.error_locator());

        for (role, locator) in overrides {
            if let Some(derived) = map.get(role)
                && derived != locator
            {
                tracing::warn!(
                    "{role} target forced to \"{locator}\", contrary to the element derived for website version {version}: \"{derived}\""
                );
            }
            map.insert(*role, locator.clone());
        }

        Self { map }
    }

    /// Locator for a role. Every role has a default, so resolution is
    /// total.
    #[must_use]
    pub fn get(&self, role: TargetRole) -> &Locator {
        self.map
            .get(&role)
            .unwrap_or_else(|| unreachable!("target set is total, missing {role}"))
    }

    /// Identify which role a matched trigger element belongs to.
    #[must_use]
    pub fn identify(&self, element: &ElementSnapshot) -> Option<TargetRole> {
        TargetRole::IDENTIFY_ORDER
            .into_iter()
            .find(|role| self.get(*role).matches(element))
    }
}

impl std::fmt::Display for Targets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (role, locator) in &self.map {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{role}={locator}")?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_sets_user_name_and_error() {
        let targets = Targets::resolve(WebsiteVersion::V1, &BTreeMap::new());
        assert_eq!(targets.get(TargetRole::UserName).identifier, "user_name");
        assert_eq!(targets.get(TargetRole::UserName).kind, LocatorKind::Name);

        let targets = Targets::resolve(WebsiteVersion::V2, &BTreeMap::new());
        assert_eq!(targets.get(TargetRole::UserName).identifier, "username");
        assert_eq!(targets.get(TargetRole::Error).identifier, "xyz-errormessage");
    }

    #[test]
    fn overrides_win_over_version_defaults() {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            TargetRole::UserName,
            Locator::new(LocatorKind::Id, "custom_user"),
        );
        let targets = Targets::resolve(WebsiteVersion::V2, &overrides);
        assert_eq!(targets.get(TargetRole::UserName).identifier, "custom_user");
        assert_eq!(targets.get(TargetRole::UserName).kind, LocatorKind::Id);
    }

    #[test]
    fn identifies_error_trigger() {
        let targets = Targets::resolve(WebsiteVersion::V2, &BTreeMap::new());
        let element = ElementSnapshot {
            class: Some("xyz-errormessage".to_string()),
            text: "Invalid username password combination".to_string(),
            ..ElementSnapshot::default()
        };
        assert_eq!(targets.identify(&element), Some(TargetRole::Error));
    }

    #[test]
    fn identifies_two_fa_before_success() {
        let targets = Targets::resolve(WebsiteVersion::V1, &BTreeMap::new());
        let element = ElementSnapshot {
            id: Some("twofactbase".to_string()),
            text: "Client login succeeds".to_string(),
            ..ElementSnapshot::default()
        };
        assert_eq!(targets.identify(&element), Some(TargetRole::TwoFa));
    }

    #[test]
    fn identifies_success_by_text() {
        let targets = Targets::resolve(WebsiteVersion::V1, &BTreeMap::new());
        let element = ElementSnapshot {
            text: "Client login succeeds".to_string(),
            ..ElementSnapshot::default()
        };
        assert_eq!(targets.identify(&element), Some(TargetRole::Success));
    }

    #[test]
    fn unidentifiable_trigger_yields_none() {
        let targets = Targets::resolve(WebsiteVersion::V1, &BTreeMap::new());
        let element = ElementSnapshot {
            id: Some("unrelated".to_string()),
            text: "something else".to_string(),
            ..ElementSnapshot::default()
        };
        assert_eq!(targets.identify(&element), None);
    }
}
