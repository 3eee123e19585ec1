//! The session lifecycle manager.
//!
//! `SessionManager` is the single source of truth for "is the caller
//! authenticated". It restores the persisted session at startup, owns the
//! proactive expiry timer, and reacts to the transport's expiry signal.
//!
//! ```text
//!                 restore()
//!  [Initializing] ─────────┬──────────────→ [Anonymous] ←──────────────┐
//!                          │                   │  ▲                    │
//!                          │          login()  │  │ logout()           │ timer / 401
//!                          ▼                   ▼  │                    │
//!                   [Authenticated(session)] ─────┴────────────────────┘
//! ```
//!
//! Transitions are serialized behind one mutex that also guards the expiry
//! timer, so at most one timer is ever live. Reads go through a `watch`
//! channel and never take that mutex.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::claims;
use super::session::{Identity, Session, SessionState};
use super::signal::ExpirySignal;
use super::store::SessionStore;
use super::SessionError;

/// Sign out this long before the credential's embedded expiry, so the
/// service never gets to reject it mid-request.
pub const DEFAULT_EXPIRY_LEAD: Duration = Duration::from_secs(30);

/// Buffer size for the session event channel.
/// Events are rare (login, logout, expiry); 16 leaves plenty of headroom.
const EVENT_BUFFER_SIZE: usize = 16;

/// Path of the sign-in entry point
pub const SIGN_IN_PATH: &str = "/login";

/// Source of "now" for expiry decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long before the credential's `exp` the session is dropped
    pub expiry_lead: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            expiry_lead: DEFAULT_EXPIRY_LEAD,
        }
    }
}

/// Why a session ended without the user asking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryCause {
    /// The proactive expiry timer fired
    Timer,
    /// A request was rejected with 401
    Unauthorized,
}

/// Navigation target after a session ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignInRedirect {
    /// Set when the session expired rather than being ended by the user
    pub session_expired: bool,
}

impl SignInRedirect {
    pub fn path(&self) -> String {
        if self.session_expired {
            format!("{}?session=expired", SIGN_IN_PATH)
        } else {
            SIGN_IN_PATH.to_string()
        }
    }
}

/// Notifications for the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A new identity replaced whatever was active before; session-scoped
    /// data fetched earlier must be discarded
    SignedIn(Identity),
    SignedOut,
    Expired { cause: ExpiryCause },
}

impl SessionEvent {
    /// Where the UI should navigate in response to this event, if anywhere
    pub fn redirect(&self) -> Option<SignInRedirect> {
        match self {
            SessionEvent::SignedIn(_) => None,
            SessionEvent::SignedOut => Some(SignInRedirect {
                session_expired: false,
            }),
            SessionEvent::Expired { .. } => Some(SignInRedirect {
                session_expired: true,
            }),
        }
    }
}

struct ArmedTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Lifecycle {
    timer: Option<ArmedTimer>,
    generation: u64,
}

enum Arming {
    Scheduled,
    NoExpiry,
    AlreadyExpired,
}

struct Inner {
    store: SessionStore,
    signal: ExpirySignal,
    state: watch::Sender<SessionState>,
    events: broadcast::Sender<SessionEvent>,
    lifecycle: Mutex<Lifecycle>,
    config: SessionConfig,
    clock: Arc<dyn Clock>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let lifecycle = self.lifecycle.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(timer) = lifecycle.timer.take() {
            timer.handle.abort();
        }
    }
}

/// Handle to the process-wide session state machine.
///
/// Clone is cheap; every clone refers to the same session. Must be created
/// inside a Tokio runtime.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(store: SessionStore, config: SessionConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(store: SessionStore, config: SessionConfig, clock: Arc<dyn Clock>) -> Self {
        let (state, _) = watch::channel(SessionState::Initializing);
        let (events, _) = broadcast::channel(EVENT_BUFFER_SIZE);

        let manager = Self {
            inner: Arc::new(Inner {
                store,
                signal: ExpirySignal::new(),
                state,
                events,
                lifecycle: Mutex::new(Lifecycle::default()),
                config,
                clock,
            }),
        };
        manager.spawn_signal_listener();
        manager
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Snapshot of the current state
    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    pub fn is_initializing(&self) -> bool {
        self.inner.state.borrow().is_initializing()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_authenticated()
    }

    pub fn is_admin(&self) -> bool {
        self.inner.state.borrow().is_admin()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.inner.state.borrow().session().map(|s| s.identity.clone())
    }

    /// The bearer credential to attach to outbound requests, if any
    pub fn credential(&self) -> Option<String> {
        self.inner.state.borrow().session().map(|s| s.credential.clone())
    }

    /// Embedded expiry (epoch seconds) of the current credential
    pub fn expires_at(&self) -> Option<i64> {
        self.inner.state.borrow().session().and_then(Session::expires_at)
    }

    /// Whether a proactive expiry timer is currently scheduled
    pub fn expiry_timer_armed(&self) -> bool {
        self.lifecycle().timer.is_some()
    }

    pub fn store(&self) -> &SessionStore {
        &self.inner.store
    }

    pub fn expiry_signal(&self) -> &ExpirySignal {
        &self.inner.signal
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Wait until the initial restore has completed.
    pub async fn ready(&self) -> SessionState {
        let mut rx = self.inner.state.subscribe();
        let result = rx.wait_for(|s| !s.is_initializing()).await.map(|s| s.clone());
        match result {
            Ok(state) => state,
            Err(_) => self.state(),
        }
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Restore the persisted session. Only the first call has any effect.
    pub fn restore(&self) -> SessionState {
        let mut lifecycle = self.lifecycle();
        if !self.inner.state.borrow().is_initializing() {
            return self.state();
        }

        let next = match self.inner.store.load() {
            None => {
                debug!("No persisted session");
                SessionState::Anonymous
            }
            Some(session) if claims::is_expired(&session.credential, self.now_secs()) => {
                info!(user = %session.identity.email, "Persisted session already expired");
                self.inner.store.clear_quietly();
                SessionState::Anonymous
            }
            Some(session) => match self.arm_expiry(&mut lifecycle, &session) {
                Arming::AlreadyExpired => {
                    self.inner.store.clear_quietly();
                    SessionState::Anonymous
                }
                _ => {
                    info!(user = %session.identity.email, role = %session.identity.role, "Session restored");
                    SessionState::Authenticated(session)
                }
            },
        };

        self.inner.state.send_replace(next.clone());
        next
    }

    /// Replace the current session wholesale with a freshly issued one.
    ///
    /// A credential that is already expired is rejected and leaves the
    /// manager anonymous.
    pub fn login(
        &self,
        credential: impl Into<String>,
        identity: Identity,
    ) -> Result<(), SessionError> {
        let session = Session::new(credential, identity);
        let mut lifecycle = self.lifecycle();

        let arming = if claims::is_expired(&session.credential, self.now_secs()) {
            Arming::AlreadyExpired
        } else {
            self.arm_expiry(&mut lifecycle, &session)
        };

        if let Arming::AlreadyExpired = arming {
            warn!(user = %session.identity.email, "Rejected login with expired credential");
            Self::disarm(&mut lifecycle);
            self.inner.store.clear_quietly();
            let previous = self.inner.state.send_replace(SessionState::Anonymous);
            if previous.is_authenticated() {
                let _ = self.inner.events.send(SessionEvent::SignedOut);
            }
            return Err(SessionError::CredentialExpired);
        }

        if let Err(e) = self.inner.store.save(&session) {
            warn!(error = %e, "Failed to persist session; it will not survive a restart");
        }

        let identity = session.identity.clone();
        info!(user = %identity.email, role = %identity.role, "Signed in");
        self.inner.state.send_replace(SessionState::Authenticated(session));
        let _ = self.inner.events.send(SessionEvent::SignedIn(identity));
        Ok(())
    }

    /// End the session locally. Does not contact the service.
    pub fn logout(&self) {
        let mut lifecycle = self.lifecycle();
        Self::disarm(&mut lifecycle);
        self.inner.store.clear_quietly();

        let previous = self.inner.state.send_replace(SessionState::Anonymous);
        if previous.is_authenticated() {
            info!("Signed out");
            let _ = self.inner.events.send(SessionEvent::SignedOut);
        }
    }

    /// Empty the persisted store after the service rejected the credential.
    ///
    /// Runs under the lifecycle lock so it never interleaves with the two
    /// writes `login` makes to the store.
    pub(crate) fn clear_rejected_store(&self) {
        let _lifecycle = self.lifecycle();
        self.inner.store.clear_quietly();
    }

    // =========================================================================
    // Expiry
    // =========================================================================

    fn spawn_signal_listener(&self) {
        // Subscribe before spawning so no signal raised after construction is missed
        let mut rx = self.inner.signal.subscribe();
        let weak = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
                let Some(inner) = weak.upgrade() else { break };
                SessionManager { inner }.on_expiry_signal();
            }
        });
    }

    fn on_expiry_signal(&self) {
        let mut lifecycle = self.lifecycle();

        // The transport clears the store before raising the signal. If the
        // store still holds the active credential, a newer login happened
        // after the rejected request and this signal is stale.
        let persisted = self.inner.store.credential();
        let stale = match self.inner.state.borrow().session() {
            Some(session) => persisted.as_deref() == Some(session.credential.as_str()),
            None => true,
        };
        if stale {
            debug!("Ignoring expiry signal: no matching active session");
            return;
        }

        self.expire(&mut lifecycle, ExpiryCause::Unauthorized);
    }

    fn on_timer_fired(&self, generation: u64) {
        let mut lifecycle = self.lifecycle();
        let current = lifecycle.timer.as_ref().map(|t| t.generation);
        if current != Some(generation) {
            debug!(generation, "Superseded expiry timer fired, ignoring");
            return;
        }
        // Dropping the handle detaches this (finishing) task
        lifecycle.timer = None;
        self.expire(&mut lifecycle, ExpiryCause::Timer);
    }

    fn expire(&self, lifecycle: &mut Lifecycle, cause: ExpiryCause) {
        Self::disarm(lifecycle);
        self.inner.store.clear_quietly();

        let previous = self.inner.state.send_replace(SessionState::Anonymous);
        if previous.is_authenticated() {
            info!(?cause, "Session expired");
            let _ = self.inner.events.send(SessionEvent::Expired { cause });
        }
    }

    /// Schedule the proactive expiry for `session`, replacing any earlier timer.
    fn arm_expiry(&self, lifecycle: &mut Lifecycle, session: &Session) -> Arming {
        Self::disarm(lifecycle);

        let Some(exp) = session.expires_at() else {
            debug!("Credential has no decodable expiry, deferring to the service");
            return Arming::NoExpiry;
        };

        let remaining_ms = exp
            .saturating_mul(1000)
            .saturating_sub(self.inner.clock.now().timestamp_millis());
        if remaining_ms <= 0 {
            return Arming::AlreadyExpired;
        }

        let lead_ms = i64::try_from(self.inner.config.expiry_lead.as_millis()).unwrap_or(i64::MAX);
        let delay = Duration::from_millis(remaining_ms.saturating_sub(lead_ms).max(0) as u64);

        lifecycle.generation += 1;
        let generation = lifecycle.generation;
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                SessionManager { inner }.on_timer_fired(generation);
            }
        });

        debug!(delay_secs = delay.as_secs(), generation, "Expiry timer armed");
        lifecycle.timer = Some(ArmedTimer { generation, handle });
        Arming::Scheduled
    }

    fn disarm(lifecycle: &mut Lifecycle) {
        if let Some(timer) = lifecycle.timer.take() {
            timer.handle.abort();
            debug!(generation = timer.generation, "Expiry timer disarmed");
        }
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.inner.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn now_secs(&self) -> i64 {
        self.inner.clock.now().timestamp()
    }
}
