//! Table-driven scenarios: raw tickle bodies through classification.

use keepauth_core::status::NO_SESSION_SENTINEL;
use keepauth_core::{ParsedStatus, Status};

struct Scenario {
    name: &'static str,
    body: &'static str,
    expected: ParsedStatus,
}

const SCENARIOS: &[Scenario] = &[
    Scenario {
        name: "unauthenticated session",
        body: r#"{"iserver":{"authStatus":{"authenticated":false,"competing":false,"connected":true,"serverInfo":{}}},"session":"abc","ssoExpires":120000,"collission":false}"#,
        expected: ParsedStatus::NotAuthenticated,
    },
    Scenario {
        name: "authenticated session",
        body: r#"{"iserver":{"authStatus":{"authenticated":true,"competing":false,"connected":true,"serverInfo":{"serverName":"srv","serverVersion":"v10"}}},"session":"abc","ssoExpires":60000,"collission":false}"#,
        expected: ParsedStatus::Authenticated,
    },
    Scenario {
        name: "competing session",
        body: r#"{"iserver":{"authStatus":{"authenticated":true,"competing":true,"connected":true,"serverInfo":{}}},"session":"abc","ssoExpires":60000,"collission":false}"#,
        expected: ParsedStatus::Competing,
    },
    Scenario {
        name: "collision flag",
        body: r#"{"iserver":{"authStatus":{"authenticated":true,"competing":false,"connected":true,"serverInfo":{}}},"session":"abc","ssoExpires":60000,"collission":true}"#,
        expected: ParsedStatus::Collision,
    },
    Scenario {
        name: "disconnected session",
        body: r#"{"iserver":{"authStatus":{"authenticated":false,"competing":false,"connected":false,"serverInfo":{}}},"session":"abc","ssoExpires":60000,"collission":false}"#,
        expected: ParsedStatus::NotConnected,
    },
    Scenario {
        name: "no session sentinel",
        body: NO_SESSION_SENTINEL,
        expected: ParsedStatus::NoSession,
    },
];

#[test]
fn tickle_bodies_classify_as_expected() {
    for scenario in SCENARIOS {
        let status = Status::from_tickle_body(scenario.body);
        assert!(status.running, "{}: gateway must be running", scenario.name);
        assert_eq!(
            status.parsed(),
            scenario.expected,
            "{}: wrong classification for body {}",
            scenario.name,
            scenario.body
        );
    }
}

#[test]
fn session_fields_cleared_without_session() {
    let status = Status::from_tickle_body(NO_SESSION_SENTINEL);
    assert!(!status.session);
    assert!(!status.authenticated);
    assert!(!status.competing);
    assert!(!status.connected);
    assert!(status.session_id.is_none());
    assert!(status.expires.is_none());
}

#[test]
fn spec_fields_survive_the_round_trip() {
    let status = Status::from_tickle_body(SCENARIOS[0].body);
    assert_eq!(status.session_id.as_deref(), Some("abc"));
    assert_eq!(status.expires, Some(120_000));
    assert!(status.connected);
    assert!(!status.authenticated);
    assert!(!status.competing);
}
