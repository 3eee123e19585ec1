//! Core library for ticketdesk.
//!
//! This crate contains everything a ticketdesk front end needs to talk to the
//! ticketing service:
//!
//! - `auth`: credential decoding, the persisted session store and the
//!   `SessionManager` that owns the authenticated identity
//! - `api`: the `ApiClient` transport, its error type, the response envelope,
//!   the retry policy and one typed method per remote endpoint
//! - `cache`: a small on-disk response cache scoped to the current session
//! - `config`: user configuration and directory locations
//! - `models`: request and response payloads

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod models;

pub use api::{ApiClient, ApiError, ApiResponse, RetryPolicy};
pub use auth::{
    Identity, Role, Session, SessionConfig, SessionError, SessionEvent, SessionManager,
    SessionState, SessionStore,
};
pub use config::Config;
