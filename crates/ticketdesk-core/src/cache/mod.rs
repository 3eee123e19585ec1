//! Local caching of session-scoped responses.
//!
//! This module provides the `CacheManager` for storing the last fetched event
//! listing and the signed-in user's registrations. Data is cached in JSON
//! format and considered stale after 30 seconds.
//!
//! The cache is cleared whenever the session changes hands: on sign-in,
//! sign-out and expiry.

pub mod manager;

pub use manager::{CacheManager, CachedData};
