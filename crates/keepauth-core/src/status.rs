//! Gateway session health snapshot.
//!
//! A [`Status`] is produced fresh on every poll and never mutated across
//! polls. The single-label [`ParsedStatus`] classification is derived in a
//! strict priority order which the strategy layer's branch conditions are
//! built on.

use serde::Deserialize;

/// Body returned by the session-status endpoint when no session exists.
pub const NO_SESSION_SENTINEL: &str = r#"{"error":"no session"}"#;

/// Snapshot of gateway and session health.
///
/// Field semantics are layered: `session`-dependent fields are only
/// meaningful once `session` is true, and everything is false/empty when
/// the gateway is not `running`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Status {
    /// Whether the gateway process answers at all.
    pub running: bool,
    /// Whether an active session exists.
    pub session: bool,
    /// Whether the upstream reports the session as connected.
    pub connected: bool,
    /// Whether the session is authenticated.
    pub authenticated: bool,
    /// Whether a competing session is registered upstream.
    pub competing: bool,
    /// Upstream collision flag. Surfaced for observability only.
    pub collision: bool,
    /// Identifier of the current session, if one exists.
    pub session_id: Option<String>,
    /// Session expiry in milliseconds.
    pub expires: Option<i64>,
    /// Upstream server name, absent while unauthenticated.
    pub server_name: Option<String>,
    /// Upstream server version, absent while unauthenticated.
    pub server_version: Option<String>,
    /// Raw response body the snapshot was parsed from.
    pub raw: Option<String>,
}

/// Single-label classification of a [`Status`].
///
/// Evaluated in strict priority order, first match wins. The ordering is
/// load-bearing: an inconsistent snapshot (e.g. `running=false` but
/// `authenticated=true`) still classifies by the highest-priority field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParsedStatus {
    NotRunning,
    NoSession,
    NotConnected,
    Competing,
    Collision,
    Authenticated,
    NotAuthenticated,
}

impl ParsedStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParsedStatus::NotRunning => "NOT RUNNING",
            ParsedStatus::NoSession => "NO SESSION",
            ParsedStatus::NotConnected => "NOT CONNECTED",
            ParsedStatus::Competing => "COMPETING",
            ParsedStatus::Collision => "COLLISION",
            ParsedStatus::Authenticated => "AUTHENTICATED",
            ParsedStatus::NotAuthenticated => "NOT AUTHENTICATED",
        }
    }
}

impl std::fmt::Display for ParsedStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire shape of the tickle response. Fields the upstream omits while
/// unauthenticated are optional.
#[derive(Debug, Deserialize)]
struct TickleBody {
    iserver: Option<IserverBlock>,
    // upstream misspells this field
    #[serde(rename = "collission", default)]
    collision: bool,
    session: Option<String>,
    #[serde(rename = "ssoExpires")]
    sso_expires: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct IserverBlock {
    #[serde(rename = "authStatus")]
    auth_status: Option<AuthStatusBlock>,
}

#[derive(Debug, Deserialize, Default)]
struct AuthStatusBlock {
    #[serde(default)]
    authenticated: bool,
    #[serde(default)]
    competing: bool,
    #[serde(default)]
    connected: bool,
    #[serde(rename = "serverInfo", default)]
    server_info: Option<ServerInfoBlock>,
}

#[derive(Debug, Deserialize, Default)]
struct ServerInfoBlock {
    #[serde(rename = "serverName")]
    server_name: Option<String>,
    #[serde(rename = "serverVersion")]
    server_version: Option<String>,
}

impl Status {
    /// Gateway unreachable. Every other field is false/empty.
    #[must_use]
    pub fn not_running() -> Self {
        Self::default()
    }

    /// Gateway reachable, no active session.
    #[must_use]
    pub fn no_session() -> Self {
        Self {
            running: true,
            ..Self::default()
        }
    }

    /// Classify this snapshot into a single label.
    #[must_use]
    pub fn parsed(&self) -> ParsedStatus {
        if !self.running {
            return ParsedStatus::NotRunning;
        }
        if !self.session {
            return ParsedStatus::NoSession;
        }
        if !self.connected {
            return ParsedStatus::NotConnected;
        }
        if self.competing {
            return ParsedStatus::Competing;
        }
        if self.collision {
            return ParsedStatus::Collision;
        }
        if self.authenticated {
            return ParsedStatus::Authenticated;
        }
        ParsedStatus::NotAuthenticated
    }

    /// Session expiry rendered as whole seconds, when known.
    #[must_use]
    pub fn expiration_time(&self) -> Option<String> {
        self.expires.map(|ms| format!("{} seconds", ms / 1000))
    }

    /// Interpret a 200-level tickle body.
    ///
    /// A body equal to the "no session" sentinel yields a running gateway
    /// with no session; anything else is parsed for the session fields.
    /// A session body that fails to parse is reported as a running
    /// gateway with a session but no parsed fields, so the strategy layer
    /// treats it as unauthenticated rather than crashing the poll.
    #[must_use]
    pub fn from_tickle_body(body: &str) -> Self {
        let mut status = Status {
            running: true,
            raw: Some(body.to_string()),
            ..Status::default()
        };

        if body == NO_SESSION_SENTINEL {
            return status;
        }
        status.session = true;

        let parsed: TickleBody = match serde_json::from_str(body) {
            Ok(parsed) => parsed,
            Err(_) => return status,
        };

        let auth = parsed
            .iserver
            .and_then(|block| block.auth_status)
            .unwrap_or_default();
        status.authenticated = auth.authenticated;
        status.competing = auth.competing;
        status.connected = auth.connected;
        if let Some(info) = auth.server_info {
            status.server_name = info.server_name;
            status.server_version = info.server_version;
        }
        status.collision = parsed.collision;
        status.session_id = parsed.session;
        status.expires = parsed.sso_expires;

        status
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} Status(running={}, session={}, connected={}, authenticated={}, competing={}, collision={}, session_id={:?}, expires={:?}, server_name={:?}, server_version={:?})",
            self.parsed(),
            self.running,
            self.session,
            self.connected,
            self.authenticated,
            self.competing,
            self.collision,
            self.session_id,
            self.expires,
            self.server_name,
            self.server_version,
        )
    }
}
