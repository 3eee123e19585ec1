//! Integration tests for the session lifecycle manager.
//!
//! Time-sensitive tests run with `start_paused = true` and a fixed clock, so
//! the expiry timer's delay is computed exactly and `sleep` advances virtual
//! time deterministically.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};

use ticketdesk_core::auth::store::{TOKEN_KEY, USER_KEY};
use ticketdesk_core::auth::{
    Clock, ExpiryCause, Identity, KeyValueStore, MemoryStore, Role, SessionConfig, SessionError,
    SessionEvent, SessionManager, SessionState, SessionStore,
};

// =========================================================================
// Helpers
// =========================================================================

const NOW: i64 = 1_767_225_600; // 2026-01-01T00:00:00Z

struct FixedClock(DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

fn fixed_clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock(Utc.timestamp_opt(NOW, 0).unwrap()))
}

fn credential(payload: Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{}.{}.sig", header, body)
}

fn credential_expiring_at(exp: i64, role: &str) -> String {
    credential(json!({ "user_id": "u-1", "role": role, "exp": exp, "iat": NOW }))
}

fn identity(role: Role) -> Identity {
    Identity {
        id: "u-1".to_string(),
        email: "someone@example.com".to_string(),
        role,
    }
}

fn manager_with(backend: Arc<MemoryStore>) -> SessionManager {
    SessionManager::with_clock(
        SessionStore::new(backend),
        SessionConfig::default(),
        fixed_clock(),
    )
}

fn manager() -> (SessionManager, Arc<MemoryStore>) {
    let backend = Arc::new(MemoryStore::new());
    (manager_with(backend.clone()), backend)
}

fn persist(backend: &MemoryStore, token: &str, role: Role) {
    backend.set(TOKEN_KEY, token).unwrap();
    backend
        .set(USER_KEY, &serde_json::to_string(&identity(role)).unwrap())
        .unwrap();
}

fn is_empty(backend: &MemoryStore) -> bool {
    backend.get(TOKEN_KEY).unwrap().is_none() && backend.get(USER_KEY).unwrap().is_none()
}

// =========================================================================
// Login / logout
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_admin_login_then_logout() {
    let (manager, backend) = manager();
    manager.restore();
    let mut events = manager.subscribe();

    let token = credential_expiring_at(NOW + 3600, "admin");
    manager.login(token.clone(), identity(Role::Admin)).unwrap();

    assert!(manager.is_authenticated());
    assert!(manager.is_admin());
    assert_eq!(manager.credential().as_deref(), Some(token.as_str()));
    assert_eq!(manager.expires_at(), Some(NOW + 3600));
    assert_eq!(backend.get(TOKEN_KEY).unwrap().as_deref(), Some(token.as_str()));
    assert!(manager.expiry_timer_armed());
    assert_eq!(
        events.recv().await.unwrap(),
        SessionEvent::SignedIn(identity(Role::Admin))
    );

    manager.logout();

    assert!(!manager.is_authenticated());
    assert!(!manager.is_admin());
    assert!(!manager.expiry_timer_armed());
    assert!(is_empty(&backend));
    assert_eq!(events.recv().await.unwrap(), SessionEvent::SignedOut);
}

#[tokio::test(start_paused = true)]
async fn test_user_login_is_not_admin() {
    let (manager, _) = manager();
    manager.restore();
    manager
        .login(credential_expiring_at(NOW + 3600, "user"), identity(Role::User))
        .unwrap();

    assert!(manager.is_authenticated());
    assert!(!manager.is_admin());
}

#[tokio::test(start_paused = true)]
async fn test_login_with_expired_credential_is_rejected() {
    let (manager, backend) = manager();
    manager.restore();

    let result = manager.login(credential_expiring_at(NOW - 1, "admin"), identity(Role::Admin));

    assert!(matches!(result, Err(SessionError::CredentialExpired)));
    assert_eq!(manager.state(), SessionState::Anonymous);
    assert!(is_empty(&backend));
}

#[tokio::test(start_paused = true)]
async fn test_login_replaces_previous_identity_wholesale() {
    let (manager, backend) = manager();
    manager.restore();

    manager
        .login(credential_expiring_at(NOW + 3600, "admin"), identity(Role::Admin))
        .unwrap();
    let second = Identity {
        id: "u-2".to_string(),
        email: "other@example.com".to_string(),
        role: Role::User,
    };
    let token = credential(json!({ "user_id": "u-2", "role": "user", "exp": NOW + 7200 }));
    manager.login(token.clone(), second.clone()).unwrap();

    assert_eq!(manager.identity(), Some(second));
    assert!(!manager.is_admin());
    assert_eq!(backend.get(TOKEN_KEY).unwrap(), Some(token));
}

#[tokio::test(start_paused = true)]
async fn test_logout_when_anonymous_emits_nothing() {
    let (manager, backend) = manager();
    manager.restore();
    let mut events = manager.subscribe();

    manager.logout();

    assert!(is_empty(&backend));
    assert!(events.try_recv().is_err());
}

// =========================================================================
// Restore
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_restore_expired_session_yields_anonymous_and_clears_store() {
    let backend = Arc::new(MemoryStore::new());
    persist(&backend, &credential_expiring_at(NOW - 10, "user"), Role::User);
    let manager = manager_with(backend.clone());

    assert!(manager.is_initializing());
    assert_eq!(manager.restore(), SessionState::Anonymous);
    assert!(!manager.is_initializing());
    assert!(is_empty(&backend));
}

#[tokio::test(start_paused = true)]
async fn test_restore_valid_session() {
    let backend = Arc::new(MemoryStore::new());
    let token = credential_expiring_at(NOW + 600, "admin");
    persist(&backend, &token, Role::Admin);
    let manager = manager_with(backend);

    let state = manager.restore();

    assert!(state.is_authenticated());
    assert!(manager.is_admin());
    assert!(manager.expiry_timer_armed());
}

#[tokio::test(start_paused = true)]
async fn test_restore_with_corrupt_identity_clears_store() {
    let backend = Arc::new(MemoryStore::new());
    backend
        .set(TOKEN_KEY, &credential_expiring_at(NOW + 600, "user"))
        .unwrap();
    backend.set(USER_KEY, "{\"id\":").unwrap();
    let manager = manager_with(backend.clone());

    assert_eq!(manager.restore(), SessionState::Anonymous);
    assert!(is_empty(&backend));
}

#[tokio::test(start_paused = true)]
async fn test_restore_credential_without_expiry_defers_to_service() {
    let backend = Arc::new(MemoryStore::new());
    persist(&backend, "opaque-token-without-claims", Role::User);
    let manager = manager_with(backend);

    assert!(manager.restore().is_authenticated());
    assert!(!manager.expiry_timer_armed());
    assert_eq!(manager.expires_at(), None);
}

#[tokio::test(start_paused = true)]
async fn test_ready_resolves_once_restored() {
    let (manager, _) = manager();
    let waiter = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.ready().await })
    };

    tokio::task::yield_now().await;
    assert!(!waiter.is_finished());

    manager.restore();
    assert_eq!(waiter.await.unwrap(), SessionState::Anonymous);
}

// =========================================================================
// Expiry timer
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_timer_fires_thirty_seconds_before_expiry() {
    let (manager, backend) = manager();
    manager.restore();
    let mut events = manager.subscribe();
    manager
        .login(credential_expiring_at(NOW + 40, "user"), identity(Role::User))
        .unwrap();
    assert!(matches!(events.recv().await.unwrap(), SessionEvent::SignedIn(_)));

    tokio::time::sleep(Duration::from_secs(9)).await;
    assert!(manager.is_authenticated(), "timer fired too early");

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!manager.is_authenticated(), "timer did not fire");
    assert!(is_empty(&backend));
    assert!(!manager.expiry_timer_armed());

    let event = events.recv().await.unwrap();
    assert_eq!(
        event,
        SessionEvent::Expired {
            cause: ExpiryCause::Timer
        }
    );
    assert_eq!(event.redirect().unwrap().path(), "/login?session=expired");
}

#[tokio::test(start_paused = true)]
async fn test_shortened_lead_window() {
    let backend = Arc::new(MemoryStore::new());
    let manager = SessionManager::with_clock(
        SessionStore::new(backend),
        SessionConfig {
            expiry_lead: Duration::from_secs(5),
        },
        fixed_clock(),
    );
    manager.restore();
    manager
        .login(credential_expiring_at(NOW + 15, "user"), identity(Role::User))
        .unwrap();

    tokio::time::sleep(Duration::from_secs(9)).await;
    assert!(manager.is_authenticated());
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!manager.is_authenticated());
}

#[tokio::test(start_paused = true)]
async fn test_relogin_cancels_previous_timer() {
    let (manager, _) = manager();
    manager.restore();

    manager
        .login(credential_expiring_at(NOW + 40, "user"), identity(Role::User))
        .unwrap();
    manager
        .login(credential_expiring_at(NOW + 3600, "user"), identity(Role::User))
        .unwrap();

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(manager.is_authenticated());
    assert!(manager.expiry_timer_armed());
}

#[tokio::test(start_paused = true)]
async fn test_logout_disarms_timer() {
    let (manager, _) = manager();
    manager.restore();
    let mut events = manager.subscribe();

    manager
        .login(credential_expiring_at(NOW + 40, "user"), identity(Role::User))
        .unwrap();
    manager.logout();

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(
        events.recv().await.unwrap(),
        SessionEvent::SignedIn(identity(Role::User))
    );
    assert_eq!(events.recv().await.unwrap(), SessionEvent::SignedOut);
    assert!(events.try_recv().is_err(), "timer fired after logout");
}

#[tokio::test(start_paused = true)]
async fn test_credential_inside_lead_window_expires_immediately() {
    let (manager, _) = manager();
    manager.restore();

    // Still valid, but less than the 30s lead remains
    manager
        .login(credential_expiring_at(NOW + 10, "user"), identity(Role::User))
        .unwrap();
    assert!(manager.is_authenticated());

    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(!manager.is_authenticated());
}
