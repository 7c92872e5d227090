//! Account credentials held in memory for the process lifetime.

/// Login credentials for the gateway's auth webpage.
///
/// When `key` is present, `password` holds ciphertext that is decrypted
/// immediately before being typed into the form — never at rest.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub account: String,
    pub password: String,
    pub key: Option<String>,
}

impl Credentials {
    #[must_use]
    pub fn new(account: impl Into<String>, password: impl Into<String>, key: Option<String>) -> Self {
        Self {
            account: account.into(),
            password: password.into(),
            key,
        }
    }

    /// Whether the password requires decryption before use.
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.key.is_some()
    }
}

// Manual impl keeps the password and key out of logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("account", &self.account)
            .field("password", &"<redacted>")
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_secrets() {
        let creds = Credentials::new("user1", "hunter2", Some("k".to_string()));
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("user1"));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn encryption_flag_follows_key_presence() {
        assert!(!Credentials::new("u", "p", None).is_encrypted());
        assert!(Credentials::new("u", "p", Some("k".into())).is_encrypted());
    }
}
