//! Authentication module for managing the user session.
//!
//! This module provides:
//! - `claims`: unverified decoding of bearer credential claims
//! - `SessionStore`: the durable mirror of the current session, over a
//!   pluggable `KeyValueStore` (files, OS keychain, or memory)
//! - `SessionManager`: the state machine that owns the authenticated identity,
//!   restores it at startup and expires it ahead of the credential's `exp`
//! - `ExpirySignal`: the process-wide "session expired" notification raised by
//!   the transport on a 401

pub mod claims;
pub mod credentials;
pub mod manager;
pub mod session;
pub mod signal;
pub mod store;

use thiserror::Error;

pub use credentials::KeyringStore;
pub use manager::{
    Clock, ExpiryCause, SessionConfig, SessionEvent, SessionManager, SignInRedirect, SystemClock,
};
pub use session::{Identity, Role, Session, SessionState};
pub use signal::ExpirySignal;
pub use store::{FileStore, KeyValueStore, MemoryStore, SessionStore, StorageError};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Credential has already expired")]
    CredentialExpired,

    #[error("Invalid credential: {0}")]
    InvalidCredential(String),
}
